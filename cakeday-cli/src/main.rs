use anyhow::{bail, Context, Result};
use cakeday_core::{
    BirthdayIndex, ContactRecord, ContactSource, KeyValueStore, MessageLedger, NextOccurrence,
    ReminderPlanner, ReminderSync, WidgetSummary,
};
use cakeday_ingest::FileContactSource;
use chrono::{Local, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod llm;
mod outreach_cmd;
mod scheduler;
mod state;
mod transport;

use config::Config;
use scheduler::IcsScheduler;
use state::JsonFileStore;

#[derive(Parser, Debug)]
#[command(
    name = "cakeday",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CAKEDAY_BUILD_SHA"), ")"),
    about = "Birthday reminders and messages from your address book"
)]
struct Cli {
    /// Contacts export (.vcf or .csv); overrides [contacts].file
    #[arg(long, global = true)]
    contacts: Option<PathBuf>,

    /// Debug logging on stderr (RUST_LOG also works)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Everyone, soonest birthday first; contacts without one at the end
    List,

    /// Next birthdays with days to go
    Upcoming {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Birthdays in a month (name or number); default is the current month
    Month { month: Option<String> },

    /// Birthdays on a date (YYYY-MM-DD or MM-DD)
    On { date: String },

    /// Contacts with no birthday on file
    Missing,

    /// Birthdays today
    Today,

    /// Notification triggers
    Reminders {
        #[command(subcommand)]
        command: RemindersCommand,
    },

    /// Go through today's birthdays and send messages
    Send {
        /// Extra note for the message writer, e.g. "mention the ski trip"
        #[arg(long)]
        hint: Option<String>,
    },

    /// Messages sent so far, for one contact or everyone
    History { contact_id: Option<String> },

    /// Clear message history for one contact, or all of it
    Reset {
        #[arg(long)]
        contact: Option<String>,
    },

    /// Refresh and print the home-screen summary
    Widget,

    /// Manage ~/.cakeday/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum RemindersCommand {
    /// Reconcile triggers with the roster and rewrite the calendar file
    Sync,
    /// Show registered triggers
    List,
    /// Print registered triggers as iCalendar
    ExportIcs {
        /// Write here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Init,
    Show,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config()?;
    let now = local_now(&cfg)?;
    let today = now.date();
    let mut store = JsonFileStore::open_default()?;

    match cli.command {
        Command::List => {
            let index = load_roster(cli.contacts, &cfg)?;
            for c in index.sorted_by_next_occurrence(today) {
                print_contact(c, index.next_occurrence_of(c, today));
            }
        }

        Command::Upcoming { limit } => {
            let index = load_roster(cli.contacts, &cfg)?;
            let upcoming = index.upcoming(today);
            if upcoming.is_empty() {
                println!("No upcoming birthdays");
            }
            for (c, next) in upcoming.into_iter().take(limit) {
                let turning = c
                    .birth_date
                    .and_then(|b| b.age_on(next.date))
                    .map(|a| format!(" (turning {a})"))
                    .unwrap_or_default();
                println!("{:>12}  {}{}", days_phrase(next.days_from_today), c.name, turning);
            }
        }

        Command::Month { month } => {
            let index = load_roster(cli.contacts, &cfg)?;
            let found = match month.as_deref() {
                None => index.contacts_this_month(today),
                Some(m) => match m.trim().parse::<u32>() {
                    Ok(n) if (1..=12).contains(&n) => index.contacts_in_month(n),
                    Ok(n) => bail!("month must be 1-12, got {n}"),
                    Err(_) => index.contacts_in_month_named(m),
                },
            };
            print_group(&index, found, today);
        }

        Command::On { date } => {
            let index = load_roster(cli.contacts, &cfg)?;
            let date = parse_lookup_date(&date)?;
            print_group(&index, index.contacts_on_date(date), today);
        }

        Command::Missing => {
            let index = load_roster(cli.contacts, &cfg)?;
            let missing = index.without_birthday();
            for c in &missing {
                println!("{}  ({})", c.name, c.id);
            }
            println!("{} of {} contacts have no birthday", missing.len(), index.len());
        }

        Command::Today => {
            let index = load_roster(cli.contacts, &cfg)?;
            let found = index.birthdays_today(today);
            if found.is_empty() {
                println!("No birthdays today.");
            }
            print_group(&index, found, today);
        }

        Command::Reminders { command } => match command {
            RemindersCommand::Sync => {
                let index = load_roster(cli.contacts, &cfg)?;
                let planner = ReminderPlanner::new(cfg.reminders.policy()?);
                let mut sync = ReminderSync::new(planner, &mut store);
                let mut ics = IcsScheduler::new(sync.registered()?, now, cfg.reminders.tz()?);
                let plan = sync.sync(&index, &mut ics, now)?;

                let path = match cfg.reminders.ics_path.clone() {
                    Some(p) => p,
                    None => state::default_ics_path()?,
                };
                fs::write(&path, ics.render()).with_context(|| format!("write {}", path.display()))?;
                info!(added = plan.to_add.len(), removed = plan.to_remove.len(), "reminders synced");
                println!(
                    "Reminders: +{} -{} ({} registered) -> {}",
                    plan.to_add.len(),
                    plan.to_remove.len(),
                    ics.len(),
                    path.display()
                );
            }
            RemindersCommand::List => {
                let planner = ReminderPlanner::new(cfg.reminders.policy()?);
                let registered = ReminderSync::new(planner, &mut store).registered()?;
                if registered.is_empty() {
                    println!("No reminders registered. Run: cakeday reminders sync");
                }
                for t in registered {
                    let when = match (t.delay_secs, t.year) {
                        (Some(delay), _) => format!("catch-up +{delay}s"),
                        (None, Some(y)) => format!("{y}-{:02}-{:02}", t.month, t.day),
                        (None, None) => format!("every {:02}-{:02}", t.month, t.day),
                    };
                    println!("{:<28} {:<18} {:02}:{:02}  {}", t.id, when, t.fire_hour, t.fire_minute, t.title);
                }
            }
            RemindersCommand::ExportIcs { out } => {
                let planner = ReminderPlanner::new(cfg.reminders.policy()?);
                let registered = ReminderSync::new(planner, &mut store).registered()?;
                let ics = IcsScheduler::new(registered, now, cfg.reminders.tz()?).render();
                match out {
                    Some(p) => fs::write(&p, ics).with_context(|| format!("write {}", p.display()))?,
                    None => print!("{ics}"),
                }
            }
        },

        Command::Send { hint } => {
            let index = load_roster(cli.contacts, &cfg)?;
            outreach_cmd::run(&index, &mut store, &cfg, hint, today).await?;
        }

        Command::History { contact_id } => {
            let ledger = MessageLedger::load(&store)?;
            let ids: Vec<String> = match contact_id {
                Some(id) => vec![id],
                None => ledger.contact_ids().map(str::to_string).collect(),
            };
            for id in &ids {
                let records = ledger.history_for(id);
                println!("{id} ({} sent)", records.len());
                for r in records {
                    let local = r.sent_at.with_timezone(&Local);
                    println!("  {}  {}", local.format("%Y-%m-%d %H:%M"), r.text);
                }
            }
            println!("Total: {}", ledger.total());
        }

        Command::Reset { contact } => {
            let mut ledger = MessageLedger::load(&store)?;
            let removed = match contact.as_deref() {
                Some(id) => ledger.reset_for(id),
                None => ledger.reset_all(),
            };
            ledger.save(&mut store)?;

            let index = match load_roster(cli.contacts, &cfg) {
                Ok(index) => Some(index),
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "roster unavailable, refreshing widget count only");
                    None
                }
            };
            refresh_widget(&mut store, &ledger, index.as_ref(), today)?;
            println!("Removed {removed} message(s); {} left", ledger.total());
        }

        Command::Widget => {
            let index = load_roster(cli.contacts, &cfg)?;
            let ledger = MessageLedger::load(&store)?;
            let summary = WidgetSummary::build(&index, &ledger, today);
            summary.save(&mut store)?;
            println!("Next: {}", summary.next_name.as_deref().unwrap_or("none"));
            println!("{}", summary.days_label());
            println!("This month: {}", summary.upcoming_this_month);
            println!("{} remembered · {}", summary.remembered_count, summary.remembered_caption());
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => config::show_config()?,
        },
    }

    Ok(())
}

fn local_now(cfg: &Config) -> Result<NaiveDateTime> {
    Ok(match cfg.reminders.tz()? {
        Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
        None => Local::now().naive_local(),
    })
}

/// Rewrite the widget payload after the ledger changed outside `send`.
/// Without a roster only the remembered count of an existing payload changes.
fn refresh_widget(
    store: &mut dyn KeyValueStore,
    ledger: &MessageLedger,
    index: Option<&BirthdayIndex>,
    today: NaiveDate,
) -> Result<()> {
    let summary = match index {
        Some(index) => WidgetSummary::build(index, ledger, today),
        None => match WidgetSummary::load(store) {
            Some(mut summary) => {
                summary.remembered_count = ledger.total();
                summary
            }
            None => return Ok(()),
        },
    };
    summary.save(store)?;
    Ok(())
}

fn load_roster(flag: Option<PathBuf>, cfg: &Config) -> Result<BirthdayIndex> {
    let path = flag
        .or_else(|| cfg.contacts.file.clone())
        .context("no contacts file; pass --contacts <path> or set [contacts].file in config.toml")?;
    let contacts = FileContactSource::new(path).fetch_all()?;
    Ok(BirthdayIndex::new(contacts))
}

/// `YYYY-MM-DD`, or `MM-DD` looked up in a leap year so Feb 29 is allowed.
fn parse_lookup_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    NaiveDate::parse_from_str(&format!("2000-{s}"), "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM-DD or MM-DD, got {s:?}"))
}

fn days_phrase(days: i64) -> String {
    match days {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        n => format!("in {n} days"),
    }
}

fn print_contact(c: &ContactRecord, next: Option<NextOccurrence>) {
    match (c.birth_date, next) {
        (Some(b), Some(next)) => {
            let year = b.year().map(|y| format!("-{y}")).unwrap_or_default();
            println!(
                "{:02}-{:02}{:<5}  {:>12}  {}",
                b.month(),
                b.day(),
                year,
                days_phrase(next.days_from_today),
                c.name
            );
        }
        _ => println!("{:<7}  {:>12}  {}", "--", "", c.name),
    }
}

fn print_group(index: &BirthdayIndex, contacts: Vec<&ContactRecord>, today: NaiveDate) {
    for c in contacts {
        print_contact(c, index.next_occurrence_of(c, today));
    }
}
