//! `cakeday send`: walk today's birthdays, compose, confirm, record.

use anyhow::{Context, Result};
use cakeday_core::{
    BirthdayIndex, ComposeOutcome, ContactRecord, KeyValueStore, MessageLedger, MessageTone,
    OutreachDriver, OutreachEvent, OutreachSession, Phase, SendOutcome, WidgetSummary,
};
use chrono::NaiveDate;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::config::Config;
use crate::llm::ComposerChoice;
use crate::transport::build_transport;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ToneInput {
    Tone(MessageTone),
    Skip,
    Quit,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DraftInput {
    Send,
    Edit,
    Skip,
    Quit,
    Unknown,
}

fn parse_tone_input(s: &str) -> ToneInput {
    let s = s.trim();
    match s.to_ascii_lowercase().as_str() {
        "s" | "skip" => return ToneInput::Skip,
        "q" | "quit" => return ToneInput::Quit,
        _ => {}
    }
    if let Ok(n) = s.parse::<usize>() {
        return match MessageTone::ALL.get(n.wrapping_sub(1)) {
            Some(t) => ToneInput::Tone(*t),
            None => ToneInput::Unknown,
        };
    }
    s.parse().map(ToneInput::Tone).unwrap_or(ToneInput::Unknown)
}

fn parse_draft_input(s: &str) -> DraftInput {
    match s.trim().to_ascii_lowercase().as_str() {
        "" | "y" | "send" => DraftInput::Send,
        "e" | "edit" => DraftInput::Edit,
        "s" | "skip" => DraftInput::Skip,
        "q" | "quit" => DraftInput::Quit,
        _ => DraftInput::Unknown,
    }
}

/// Line input for the send loop. `None` means the input is closed.
trait Prompt {
    fn ask(&mut self, label: &str) -> Result<Option<String>>;
}

/// Reads stdin, locking it per line so the console transport can read too.
struct Terminal;

impl Prompt for Terminal {
    fn ask(&mut self, label: &str) -> Result<Option<String>> {
        print!("{}", label);
        io::stdout().flush().ok();
        read_reply(&mut io::stdin().lock())
    }
}

fn read_reply<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut s = String::new();
    if input.read_line(&mut s).context("read stdin")? == 0 {
        return Ok(None);
    }
    Ok(Some(s.trim_end_matches(['\r', '\n']).to_string()))
}

fn tone_menu() -> String {
    let tones: Vec<String> = MessageTone::ALL
        .iter()
        .enumerate()
        .map(|(i, t)| format!("[{}] {}", i + 1, t))
        .collect();
    format!("Tone {} / [s]kip / [q]uit: ", tones.join("  "))
}

async fn current_contact(driver: &OutreachDriver) -> Option<ContactRecord> {
    driver.session().lock().await.current().cloned()
}

pub async fn run(
    index: &BirthdayIndex,
    store: &mut dyn KeyValueStore,
    cfg: &Config,
    hint: Option<String>,
    today: NaiveDate,
) -> Result<()> {
    let candidates: Vec<ContactRecord> = index.birthdays_today(today).into_iter().cloned().collect();
    if candidates.is_empty() {
        println!("No birthdays today.");
        return Ok(());
    }

    let composer = ComposerChoice::from_env(&cfg.llm)?.into_composer();
    let transport = build_transport(cfg.outreach.transport)?;
    let ledger = Arc::new(Mutex::new(MessageLedger::load(store)?));
    let hint = hint.or_else(|| cfg.outreach.default_hint.clone());

    let (tx, mut rx) = mpsc::unbounded_channel::<OutreachEvent>();
    let events = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            debug!(?event, "outreach event");
        }
    });

    let driver = OutreachDriver::new(OutreachSession::new().with_events(tx), Arc::clone(&ledger), composer, transport);
    driver.start(candidates, today).await?;
    println!("🎂 {} birthday(s) today.\n", driver.session().lock().await.queue_ids().len());

    let outcome = drive(&driver, &ledger, store, &mut Terminal, hint, today).await;

    drop(driver);
    let _ = events.await;

    // persist whatever was sent, even when the loop bailed out
    let ledger = ledger.lock().await;
    let saved = ledger
        .save(store)
        .and_then(|()| WidgetSummary::build(index, &ledger, today).save(store));
    let sent = outcome?;
    saved?;
    println!("Sent {sent} message(s). {} total so far.", ledger.total());
    Ok(())
}

/// The prompt loop. Saves the ledger after every sent message and returns how
/// many went out. Closed input quits the run.
async fn drive(
    driver: &OutreachDriver,
    ledger: &Mutex<MessageLedger>,
    store: &mut dyn KeyValueStore,
    input: &mut dyn Prompt,
    hint: Option<String>,
    today: NaiveDate,
) -> Result<usize> {
    let mut sent = 0usize;
    loop {
        match driver.phase().await {
            Phase::AwaitingToneChoice => {
                let Some(contact) = current_contact(driver).await else { break };
                let age = contact.birth_date.and_then(|b| b.age_on(today));
                match age {
                    Some(age) => println!("── {} (turning {age})", contact.name),
                    None => println!("── {}", contact.name),
                }

                let Some(answer) = input.ask(&tone_menu())? else {
                    driver.cancel().await?;
                    break;
                };
                match parse_tone_input(&answer) {
                    ToneInput::Tone(tone) => match driver.choose_tone(tone, hint.clone()).await? {
                        ComposeOutcome::Ready(_) => {}
                        ComposeOutcome::Skipped(e) => println!("Skipping: {e}\n"),
                        ComposeOutcome::Discarded => {}
                    },
                    ToneInput::Skip => driver.advance().await?,
                    ToneInput::Quit => driver.cancel().await?,
                    ToneInput::Unknown => println!("Pick 1-4, a tone name, s or q."),
                }
            }
            Phase::AwaitingSend => {
                let draft = driver.session().lock().await.draft().unwrap_or_default().to_string();
                println!("\n  {draft}\n");

                let Some(answer) = input.ask("[Enter] send / [e]dit / [s]kip / [q]uit: ")? else {
                    driver.cancel().await?;
                    break;
                };
                match parse_draft_input(&answer) {
                    DraftInput::Send => match driver.confirm_send().await? {
                        Some(SendOutcome::Sent) => {
                            sent += 1;
                            ledger.lock().await.save(store)?;
                            println!("✓ Sent\n");
                        }
                        Some(SendOutcome::Cancelled) => println!("Not sent.\n"),
                        Some(SendOutcome::Failed) => println!("Sending failed.\n"),
                        None => {}
                    },
                    DraftInput::Edit => {
                        let Some(text) = input.ask("New message: ")? else {
                            driver.cancel().await?;
                            break;
                        };
                        if !text.trim().is_empty() {
                            driver.edit(text.trim()).await?;
                        }
                    }
                    DraftInput::Skip => driver.advance().await?,
                    DraftInput::Quit => driver.cancel().await?,
                    DraftInput::Unknown => println!("Press Enter to send, or e, s, q."),
                }
            }
            Phase::Done => break,
            // transient phases are only observable while a driver call is in flight
            Phase::Idle | Phase::AwaitingComposition | Phase::Delivering => break,
        }
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cakeday_core::ledger::TOTAL_COUNTER_KEY;
    use cakeday_core::{MemoryStore, MessageTransport, PartialBirthDate, TemplateComposer};
    use std::io::Cursor;

    struct Scripted(Cursor<&'static [u8]>);

    impl Prompt for Scripted {
        fn ask(&mut self, _label: &str) -> Result<Option<String>> {
            read_reply(&mut self.0)
        }
    }

    struct AlwaysSent;

    #[async_trait]
    impl MessageTransport for AlwaysSent {
        async fn send(&self, _phone: &str, _body: &str) -> SendOutcome {
            SendOutcome::Sent
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 12, 1).unwrap()
    }

    async fn started(ledger: &Arc<Mutex<MessageLedger>>) -> OutreachDriver {
        let roster = ["a", "b"]
            .iter()
            .map(|id| {
                ContactRecord::new(*id, id.to_uppercase())
                    .with_phone("5550100")
                    .with_birth_date(PartialBirthDate::new(12, 1, None).unwrap())
            })
            .collect();
        let driver = OutreachDriver::new(
            OutreachSession::new(),
            Arc::clone(ledger),
            Arc::new(TemplateComposer),
            Arc::new(AlwaysSent),
        );
        driver.start(roster, today()).await.unwrap();
        driver
    }

    async fn drive_script(script: &'static str) -> (usize, Phase, MemoryStore) {
        let ledger = Arc::new(Mutex::new(MessageLedger::new()));
        let driver = started(&ledger).await;
        let mut store = MemoryStore::new();
        let sent = drive(&driver, &ledger, &mut store, &mut Scripted(Cursor::new(script.as_bytes())), None, today())
            .await
            .unwrap();
        (sent, driver.phase().await, store)
    }

    #[test]
    fn reply_is_none_once_input_is_closed() {
        let mut input = Cursor::new("yes\r\n".as_bytes());
        assert_eq!(read_reply(&mut input).unwrap().as_deref(), Some("yes"));
        assert_eq!(read_reply(&mut input).unwrap(), None);
    }

    #[tokio::test]
    async fn closed_input_quits_and_keeps_what_was_sent() {
        let (sent, phase, store) = drive_script("1\n\n").await;
        assert_eq!(sent, 1);
        assert_eq!(phase, Phase::Done);
        assert_eq!(store.get(TOTAL_COUNTER_KEY).unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn closed_input_at_any_prompt_cancels() {
        for script in ["", "1\n", "1\ne\n"] {
            let (sent, phase, store) = drive_script(script).await;
            assert_eq!(sent, 0, "script {script:?}");
            assert_eq!(phase, Phase::Done, "script {script:?}");
            assert_eq!(store.get(TOTAL_COUNTER_KEY).unwrap(), None);
        }
    }

    #[test]
    fn tone_input_accepts_numbers_names_and_commands() {
        assert_eq!(parse_tone_input("1"), ToneInput::Tone(MessageTone::ALL[0]));
        assert_eq!(parse_tone_input("funny"), ToneInput::Tone(MessageTone::Funny));
        assert_eq!(parse_tone_input(" Romantic "), ToneInput::Tone(MessageTone::Romantic));
        assert_eq!(parse_tone_input("s"), ToneInput::Skip);
        assert_eq!(parse_tone_input("q"), ToneInput::Quit);
        assert_eq!(parse_tone_input("0"), ToneInput::Unknown);
        assert_eq!(parse_tone_input("9"), ToneInput::Unknown);
        assert_eq!(parse_tone_input("grumpy"), ToneInput::Unknown);
    }

    #[test]
    fn draft_input_defaults_to_send() {
        assert_eq!(parse_draft_input(""), DraftInput::Send);
        assert_eq!(parse_draft_input("E"), DraftInput::Edit);
        assert_eq!(parse_draft_input("skip"), DraftInput::Skip);
        assert_eq!(parse_draft_input("quit"), DraftInput::Quit);
        assert_eq!(parse_draft_input("maybe"), DraftInput::Unknown);
    }
}
