//! cakeday-core: birthday scheduling and outreach engine.

pub mod birthday_index;
pub mod compose;
pub mod contact;
pub mod date_math;
pub mod error;
pub mod ledger;
pub mod outreach;
pub mod reminders;
pub mod store;
pub mod widget;

pub use birthday_index::BirthdayIndex;
pub use compose::{
    fallback_message, ComposeRequest, LlmComposer, MessageComposer, MessageTone, TemplateComposer,
    TextGenerator,
};
pub use contact::{ContactRecord, ContactSource, NO_NAME};
pub use date_math::{days_between, next_occurrence, normalized_age, NextOccurrence, PartialBirthDate};
pub use error::{CakedayError, Result};
pub use ledger::{MessageLedger, MessageRecord};
pub use outreach::{
    Completion, ComposeOutcome, ComposeTicket, MessageTransport, OutreachDriver, OutreachEvent,
    OutreachSession, Phase, SendOutcome, SendTicket, ToneStep,
};
pub use reminders::{
    trigger_id, NotificationScheduler, ReminderPlan, ReminderPlanner, ReminderPolicy, ReminderSync,
    ReminderTrigger,
};
pub use store::{KeyValueStore, MemoryStore};
pub use widget::WidgetSummary;
