//! Error types for cakeday-core.

use thiserror::Error;

use crate::outreach::Phase;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CakedayError {
    /// Outreach was started with nobody to message.
    #[error("no eligible contacts to message")]
    EmptyQueue,

    /// Operation called out of sequence for the current outreach phase.
    #[error("`{operation}` is not allowed while {phase:?}")]
    InvalidPhase { operation: &'static str, phase: Phase },

    /// Contact has no phone number at all.
    #[error("no phone number for {name}")]
    NoPhoneNumber { contact_id: String, name: String },

    /// Contact has a phone entry but no digits survive normalization.
    #[error("no valid phone for {name}")]
    InvalidPhoneNumber { contact_id: String, name: String },

    /// Roster fetch failed (permission denied, unreadable export, ...).
    #[error("could not load contacts: {0}")]
    ContactSource(String),

    /// Text generation failed; callers mask this with a fallback template.
    #[error("composer failure: {0}")]
    ComposerFailure(String),

    #[error("invalid birth date {month:02}-{day:02}")]
    InvalidBirthDate { month: u32, day: u32 },

    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CakedayError {
    fn from(e: serde_json::Error) -> Self {
        CakedayError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CakedayError>;
