//! Contact model shared by the index, planner, and outreach flow.

use serde::{Deserialize, Serialize};

use crate::date_math::PartialBirthDate;
use crate::error::{CakedayError, Result};

/// Name ingest gives entries that carry none.
pub const NO_NAME: &str = "No Name";

/// One address-book entry as the core sees it.
///
/// `id` must be stable across reloads of the same underlying contact: it keys
/// reminder triggers and message history. Rosters are rebuilt wholesale on each
/// reload, so records are never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: String,
    pub name: String,
    /// Given name when the source keeps it separately (vCard `N`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    pub phone_number: Option<String>,
    pub birth_date: Option<PartialBirthDate>,
}

impl ContactRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            given_name: None,
            phone_number: None,
            birth_date: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    pub fn with_given_name(mut self, given: impl Into<String>) -> Self {
        self.given_name = Some(given.into());
        self
    }

    pub fn with_birth_date(mut self, birth_date: PartialBirthDate) -> Self {
        self.birth_date = Some(birth_date);
        self
    }

    pub fn has_birthday(&self) -> bool {
        self.birth_date.is_some()
    }

    /// Name to greet with: the given name, else the first word of the full
    /// name that is not an honorific like "Dr.", else "there".
    pub fn display_name(&self) -> &str {
        if let Some(given) = self.given_name.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
            return given;
        }
        let name = self.name.trim();
        if name == NO_NAME {
            return "there";
        }
        name.split_whitespace()
            .find(|word| !word.ends_with('.'))
            .unwrap_or("there")
    }

    /// Phone number reduced to digits, ready to hand to a transport.
    pub fn dialable_phone(&self) -> Result<String> {
        let raw = self
            .phone_number
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| CakedayError::NoPhoneNumber {
                contact_id: self.id.clone(),
                name: self.name.clone(),
            })?;

        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(CakedayError::InvalidPhoneNumber {
                contact_id: self.id.clone(),
                name: self.name.clone(),
            });
        }
        Ok(digits)
    }
}

/// Where rosters come from. Errors are passed through to the caller untouched.
pub trait ContactSource {
    fn fetch_all(&self) -> Result<Vec<ContactRecord>>;
}
