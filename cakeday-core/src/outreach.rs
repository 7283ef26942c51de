//! Outreach: send a birthday message to each of today's people, one at a time.
//!
//! ```text
//! Idle -> AwaitingToneChoice -> AwaitingComposition -> AwaitingSend -> Delivering
//!              ^                                                         |
//!              +-------------------- next contact -----------------------+
//!                                  (queue exhausted) -> Done
//! ```
//!
//! The session itself is synchronous. Each async boundary is split into a
//! `begin_*` call that hands out a ticket and a `finish_*` call that redeems
//! it. Tickets carry the session generation; `cancel()` bumps it, so results
//! that arrive afterwards are dropped instead of applied. `OutreachDriver`
//! wires the halves to a composer and transport behind a mutex.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::compose::{ComposeRequest, MessageComposer, MessageTone};
use crate::contact::ContactRecord;
use crate::error::{CakedayError, Result};
use crate::ledger::MessageLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    AwaitingToneChoice,
    AwaitingComposition,
    AwaitingSend,
    /// Transport has the message; waiting for sent/cancelled/failed.
    Delivering,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendOutcome {
    Sent,
    Cancelled,
    Failed,
}

/// Delivers a message (SMS/iMessage); resolves once the user sent or dismissed it.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, phone: &str, body: &str) -> SendOutcome;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutreachEvent {
    Started { queue_len: usize },
    Composed { contact_id: String },
    Skipped { contact_id: String, error: CakedayError },
    Sent { contact_id: String },
    NotSent { contact_id: String, outcome: SendOutcome },
    Advanced { position: usize },
    Finished,
    Cancelled { position: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeTicket {
    generation: u64,
    pub contact_id: String,
    pub request: ComposeRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTicket {
    generation: u64,
    pub contact_id: String,
    pub phone: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToneStep {
    Compose(ComposeTicket),
    /// The contact could not be messaged; the session already moved on.
    Skipped(CakedayError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// Arrived after a cancel or restart; ignored.
    Stale,
}

#[derive(Debug)]
pub struct OutreachSession {
    queue: Vec<ContactRecord>,
    position: usize,
    phase: Phase,
    generation: u64,
    today: Option<NaiveDate>,
    draft: Option<String>,
    last_error: Option<CakedayError>,
    events: Option<mpsc::UnboundedSender<OutreachEvent>>,
}

impl Default for OutreachSession {
    fn default() -> Self {
        Self::new()
    }
}

impl OutreachSession {
    pub fn new() -> Self {
        Self {
            queue: Vec::new(),
            position: 0,
            phase: Phase::Idle,
            generation: 0,
            today: None,
            draft: None,
            last_error: None,
            events: None,
        }
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<OutreachEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn queue_ids(&self) -> Vec<&str> {
        self.queue.iter().map(|c| c.id.as_str()).collect()
    }

    pub fn current(&self) -> Option<&ContactRecord> {
        match self.phase {
            Phase::Idle | Phase::Done => None,
            _ => self.queue.get(self.position),
        }
    }

    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    pub fn last_error(&self) -> Option<&CakedayError> {
        self.last_error.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Begin a run over `candidates`, in the order given. `today` is used for ages.
    pub fn start(&mut self, candidates: Vec<ContactRecord>, today: NaiveDate) -> Result<()> {
        if !matches!(self.phase, Phase::Idle | Phase::Done) {
            return Err(self.invalid("start"));
        }
        if candidates.is_empty() {
            self.last_error = Some(CakedayError::EmptyQueue);
            return Err(CakedayError::EmptyQueue);
        }

        self.generation += 1;
        self.queue = candidates;
        self.position = 0;
        self.today = Some(today);
        self.draft = None;
        self.last_error = None;
        self.phase = Phase::AwaitingToneChoice;

        info!(queue_len = self.queue.len(), "outreach started");
        self.emit(OutreachEvent::Started {
            queue_len: self.queue.len(),
        });
        Ok(())
    }

    /// Pick a tone for the current contact. Contacts without a usable phone
    /// are skipped here, before any composing happens.
    pub fn begin_compose(&mut self, tone: MessageTone, hint: Option<String>) -> Result<ToneStep> {
        if self.phase != Phase::AwaitingToneChoice {
            return Err(self.invalid("choose_tone"));
        }
        let contact = self.queue[self.position].clone();

        if let Err(e) = contact.dialable_phone() {
            warn!(contact_id = %contact.id, error = %e, "skipping contact");
            self.last_error = Some(e.clone());
            self.emit(OutreachEvent::Skipped {
                contact_id: contact.id.clone(),
                error: e.clone(),
            });
            self.step_forward();
            return Ok(ToneStep::Skipped(e));
        }

        let age = match (contact.birth_date, self.today) {
            (Some(b), Some(today)) => b.age_on(today),
            _ => None,
        };

        self.phase = Phase::AwaitingComposition;
        Ok(ToneStep::Compose(ComposeTicket {
            generation: self.generation,
            contact_id: contact.id.clone(),
            request: ComposeRequest {
                tone,
                name: contact.display_name().to_string(),
                age,
                hint,
            },
        }))
    }

    pub fn finish_compose(&mut self, ticket: ComposeTicket, text: String) -> Result<Completion> {
        if ticket.generation != self.generation {
            debug!(contact_id = %ticket.contact_id, "dropping stale composition");
            return Ok(Completion::Stale);
        }
        if self.phase != Phase::AwaitingComposition {
            return Err(self.invalid("finish_compose"));
        }

        self.draft = Some(text);
        self.phase = Phase::AwaitingSend;
        self.emit(OutreachEvent::Composed {
            contact_id: ticket.contact_id,
        });
        Ok(Completion::Applied)
    }

    /// Replace the composed text before sending.
    pub fn edit(&mut self, text: impl Into<String>) -> Result<()> {
        if self.phase != Phase::AwaitingSend {
            return Err(self.invalid("edit"));
        }
        self.draft = Some(text.into());
        Ok(())
    }

    pub fn begin_send(&mut self) -> Result<SendTicket> {
        if self.phase != Phase::AwaitingSend {
            return Err(self.invalid("confirm_send"));
        }
        let contact = &self.queue[self.position];
        let phone = contact.dialable_phone()?;
        let text = self.draft.clone().unwrap_or_default();
        let ticket = SendTicket {
            generation: self.generation,
            contact_id: contact.id.clone(),
            phone,
            text,
        };
        self.phase = Phase::Delivering;
        Ok(ticket)
    }

    /// Apply the transport result. Only `Sent` reaches the ledger; every
    /// outcome moves on to the next contact.
    pub fn finish_send(
        &mut self,
        ticket: SendTicket,
        outcome: SendOutcome,
        sent_at: DateTime<Utc>,
        ledger: &mut MessageLedger,
    ) -> Result<Completion> {
        if ticket.generation != self.generation {
            warn!(contact_id = %ticket.contact_id, ?outcome, "send result arrived after cancel; dropped");
            return Ok(Completion::Stale);
        }
        if self.phase != Phase::Delivering {
            return Err(self.invalid("finish_send"));
        }

        match outcome {
            SendOutcome::Sent => {
                ledger.record(&ticket.contact_id, &ticket.text, sent_at);
                self.last_error = None;
                self.emit(OutreachEvent::Sent {
                    contact_id: ticket.contact_id,
                });
            }
            SendOutcome::Cancelled | SendOutcome::Failed => {
                info!(contact_id = %ticket.contact_id, ?outcome, "message not sent");
                self.emit(OutreachEvent::NotSent {
                    contact_id: ticket.contact_id,
                    outcome,
                });
            }
        }
        self.step_forward();
        Ok(Completion::Applied)
    }

    /// Skip the current contact without sending.
    pub fn advance(&mut self) -> Result<()> {
        if !matches!(self.phase, Phase::AwaitingToneChoice | Phase::AwaitingSend) {
            return Err(self.invalid("advance"));
        }
        self.step_forward();
        Ok(())
    }

    /// Stop the run. Anything in flight is discarded when it lands.
    pub fn cancel(&mut self) -> Result<()> {
        if self.phase == Phase::Done {
            return Err(self.invalid("cancel"));
        }
        self.generation += 1;
        self.draft = None;
        self.phase = Phase::Done;
        info!(position = self.position, "outreach cancelled");
        self.emit(OutreachEvent::Cancelled {
            position: self.position,
        });
        Ok(())
    }

    fn step_forward(&mut self) {
        self.position += 1;
        self.draft = None;
        if self.position >= self.queue.len() {
            self.phase = Phase::Done;
            info!("outreach finished");
            self.emit(OutreachEvent::Finished);
        } else {
            self.phase = Phase::AwaitingToneChoice;
            self.emit(OutreachEvent::Advanced {
                position: self.position,
            });
        }
    }

    fn invalid(&self, operation: &'static str) -> CakedayError {
        CakedayError::InvalidPhase {
            operation,
            phase: self.phase,
        }
    }

    fn emit(&self, event: OutreachEvent) {
        if let Some(tx) = &self.events {
            // receiver gone just means nobody is listening
            let _ = tx.send(event);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeOutcome {
    Ready(String),
    Skipped(CakedayError),
    Discarded,
}

/// Async front for a session shared between the UI loop and in-flight work.
#[derive(Clone)]
pub struct OutreachDriver {
    session: Arc<Mutex<OutreachSession>>,
    ledger: Arc<Mutex<MessageLedger>>,
    composer: Arc<dyn MessageComposer>,
    transport: Arc<dyn MessageTransport>,
}

impl OutreachDriver {
    pub fn new(
        session: OutreachSession,
        ledger: Arc<Mutex<MessageLedger>>,
        composer: Arc<dyn MessageComposer>,
        transport: Arc<dyn MessageTransport>,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            ledger,
            composer,
            transport,
        }
    }

    pub fn session(&self) -> Arc<Mutex<OutreachSession>> {
        Arc::clone(&self.session)
    }

    pub async fn start(&self, candidates: Vec<ContactRecord>, today: NaiveDate) -> Result<()> {
        self.session.lock().await.start(candidates, today)
    }

    pub async fn choose_tone(&self, tone: MessageTone, hint: Option<String>) -> Result<ComposeOutcome> {
        let ticket = match self.session.lock().await.begin_compose(tone, hint)? {
            ToneStep::Compose(ticket) => ticket,
            ToneStep::Skipped(e) => return Ok(ComposeOutcome::Skipped(e)),
        };

        // lock released while the composer runs
        let text = self.composer.compose(&ticket.request).await;

        match self.session.lock().await.finish_compose(ticket, text.clone())? {
            Completion::Applied => Ok(ComposeOutcome::Ready(text)),
            Completion::Stale => Ok(ComposeOutcome::Discarded),
        }
    }

    pub async fn edit(&self, text: impl Into<String>) -> Result<()> {
        self.session.lock().await.edit(text)
    }

    /// Returns `None` when the result was discarded because of a cancel.
    pub async fn confirm_send(&self) -> Result<Option<SendOutcome>> {
        let ticket = self.session.lock().await.begin_send()?;
        let outcome = self.transport.send(&ticket.phone, &ticket.text).await;

        let mut session = self.session.lock().await;
        let mut ledger = self.ledger.lock().await;
        match session.finish_send(ticket, outcome, Utc::now(), &mut ledger)? {
            Completion::Applied => Ok(Some(outcome)),
            Completion::Stale => Ok(None),
        }
    }

    pub async fn advance(&self) -> Result<()> {
        self.session.lock().await.advance()
    }

    pub async fn cancel(&self) -> Result<()> {
        self.session.lock().await.cancel()
    }

    pub async fn phase(&self) -> Phase {
        self.session.lock().await.phase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{fallback_message, TemplateComposer};
    use crate::date_math::PartialBirthDate;
    use chrono::TimeZone;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 12, 1).unwrap()
    }

    fn person(id: &str, phone: Option<&str>) -> ContactRecord {
        let c = ContactRecord::new(id, format!("{} Smith", id.to_uppercase()))
            .with_birth_date(PartialBirthDate::new(12, 1, Some(1996)).unwrap());
        match phone {
            Some(p) => c.with_phone(p),
            None => c,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 12, 1, 10, 0, 0).unwrap()
    }

    fn compose(session: &mut OutreachSession) -> ComposeTicket {
        match session.begin_compose(MessageTone::Casual, None).unwrap() {
            ToneStep::Compose(t) => t,
            ToneStep::Skipped(e) => panic!("unexpected skip: {e}"),
        }
    }

    #[test]
    fn empty_start_is_rejected() {
        let mut s = OutreachSession::new();
        assert_eq!(s.start(vec![], today()), Err(CakedayError::EmptyQueue));
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn full_pass_records_only_sent_messages() {
        let mut s = OutreachSession::new();
        let mut ledger = MessageLedger::new();
        s.start(vec![person("a", Some("555-0100")), person("b", Some("555-0101"))], today())
            .unwrap();

        let t = compose(&mut s);
        assert_eq!(t.request.name, "A");
        assert_eq!(t.request.age, Some(30));
        s.finish_compose(t, "hi a".into()).unwrap();
        s.edit("hello a").unwrap();
        let send = s.begin_send().unwrap();
        assert_eq!(send.phone, "5550100");
        assert_eq!(send.text, "hello a");
        s.finish_send(send, SendOutcome::Sent, now(), &mut ledger).unwrap();
        assert_eq!(s.phase(), Phase::AwaitingToneChoice);
        assert_eq!(s.current().unwrap().id, "b");

        let t = compose(&mut s);
        s.finish_compose(t, "hi b".into()).unwrap();
        let send = s.begin_send().unwrap();
        s.finish_send(send, SendOutcome::Failed, now(), &mut ledger).unwrap();

        assert!(s.is_done());
        assert_eq!(ledger.total(), 1);
        assert_eq!(ledger.history_for("a")[0].text, "hello a");
    }

    #[test]
    fn no_phone_is_skipped_without_composing() {
        let mut s = OutreachSession::new();
        s.start(vec![person("a", None), person("b", Some("+1 555 0101"))], today())
            .unwrap();

        let step = s.begin_compose(MessageTone::Formal, None).unwrap();
        assert!(matches!(step, ToneStep::Skipped(CakedayError::NoPhoneNumber { .. })));
        assert!(matches!(s.last_error(), Some(CakedayError::NoPhoneNumber { .. })));
        assert_eq!(s.current().unwrap().id, "b");
    }

    #[test]
    fn out_of_order_calls_fail_with_invalid_phase() {
        let mut s = OutreachSession::new();
        assert!(matches!(s.edit("x"), Err(CakedayError::InvalidPhase { .. })));
        assert!(matches!(s.begin_send(), Err(CakedayError::InvalidPhase { .. })));

        s.start(vec![person("a", Some("5550100"))], today()).unwrap();
        let _ticket = compose(&mut s);
        assert!(matches!(
            s.begin_compose(MessageTone::Funny, None),
            Err(CakedayError::InvalidPhase { phase: Phase::AwaitingComposition, .. })
        ));
        assert!(matches!(s.begin_send(), Err(CakedayError::InvalidPhase { .. })));
    }

    #[test]
    fn double_confirm_is_rejected_while_delivering() {
        let mut s = OutreachSession::new();
        s.start(vec![person("a", Some("5550100"))], today()).unwrap();
        let t = compose(&mut s);
        s.finish_compose(t, "hi".into()).unwrap();
        let _send = s.begin_send().unwrap();
        assert!(matches!(
            s.begin_send(),
            Err(CakedayError::InvalidPhase { phase: Phase::Delivering, .. })
        ));
    }

    #[test]
    fn cancel_discards_in_flight_results() {
        let mut s = OutreachSession::new();
        let mut ledger = MessageLedger::new();
        s.start(vec![person("a", Some("5550100")), person("b", Some("5550101"))], today())
            .unwrap();
        let t = compose(&mut s);
        s.finish_compose(t, "hi".into()).unwrap();
        let send = s.begin_send().unwrap();

        s.cancel().unwrap();
        assert!(s.is_done());
        assert_eq!(
            s.finish_send(send, SendOutcome::Sent, now(), &mut ledger).unwrap(),
            Completion::Stale
        );
        assert_eq!(ledger.total(), 0);
        assert!(matches!(s.cancel(), Err(CakedayError::InvalidPhase { .. })));
    }

    #[test]
    fn composition_from_before_cancel_is_stale() {
        let mut s = OutreachSession::new();
        s.start(vec![person("a", Some("5550100"))], today()).unwrap();
        let t = compose(&mut s);
        let replayed = t.clone();

        s.cancel().unwrap();
        assert_eq!(s.finish_compose(t, "late".into()).unwrap(), Completion::Stale);
        assert_eq!(s.draft(), None);
        assert_eq!(s.phase(), Phase::Done);

        // a fresh run must not pick up the old composition either
        s.start(vec![person("b", Some("5550101"))], today()).unwrap();
        assert_eq!(s.finish_compose(replayed, "late".into()).unwrap(), Completion::Stale);
        assert_eq!(s.draft(), None);
        assert_eq!(s.phase(), Phase::AwaitingToneChoice);
        assert_eq!(s.current().unwrap().id, "b");
    }

    #[test]
    fn cancel_works_from_every_live_phase() {
        for steps in 0..4 {
            let mut s = OutreachSession::new();
            if steps > 0 {
                s.start(vec![person("a", Some("5550100"))], today()).unwrap();
            }
            if steps > 1 {
                let t = compose(&mut s);
                if steps > 2 {
                    s.finish_compose(t, "hi".into()).unwrap();
                }
            }
            s.cancel().unwrap();
            assert_eq!(s.phase(), Phase::Done);
        }
    }

    #[test]
    fn events_follow_transitions() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut s = OutreachSession::new().with_events(tx);
        s.start(vec![person("a", None)], today()).unwrap();
        s.begin_compose(MessageTone::Casual, None).unwrap();

        assert_eq!(rx.try_recv().unwrap(), OutreachEvent::Started { queue_len: 1 });
        assert!(matches!(rx.try_recv().unwrap(), OutreachEvent::Skipped { .. }));
        assert_eq!(rx.try_recv().unwrap(), OutreachEvent::Finished);
    }

    struct AlwaysSent;

    #[async_trait]
    impl MessageTransport for AlwaysSent {
        async fn send(&self, _phone: &str, _body: &str) -> SendOutcome {
            SendOutcome::Sent
        }
    }

    #[tokio::test]
    async fn driver_runs_compose_and_send() {
        let ledger = Arc::new(Mutex::new(MessageLedger::new()));
        let driver = OutreachDriver::new(
            OutreachSession::new(),
            Arc::clone(&ledger),
            Arc::new(TemplateComposer),
            Arc::new(AlwaysSent),
        );
        driver.start(vec![person("a", Some("5550100"))], today()).await.unwrap();

        let composed = driver.choose_tone(MessageTone::Formal, None).await.unwrap();
        assert_eq!(
            composed,
            ComposeOutcome::Ready(fallback_message(MessageTone::Formal, "A", Some(30)))
        );
        assert_eq!(driver.confirm_send().await.unwrap(), Some(SendOutcome::Sent));
        assert_eq!(driver.phase().await, Phase::Done);
        assert_eq!(ledger.lock().await.total(), 1);
    }
}
