//! Plain CSV roster export.
//!
//! Expected header (order free, extra columns ignored):
//!   id,name,phone,birthday
//! Optional columns:
//!   given_name   name to greet with
//!   age          age turned this year, or a birth year; fills in a missing birth year

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use cakeday_core::{normalized_age, ContactRecord, PartialBirthDate, NO_NAME};

use super::BirthdayParser;
use crate::types::ImportReport;

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    birthday: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    age: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Birth year implied by an `age` cell when the birthday itself has none.
fn with_year_from_age(birth: PartialBirthDate, age_cell: Option<&str>, current_year: i32) -> PartialBirthDate {
    if birth.year().is_some() {
        return birth;
    }
    age_cell
        .and_then(|a| a.parse::<i32>().ok())
        .and_then(|raw| normalized_age(raw, current_year))
        .and_then(|age| PartialBirthDate::new(birth.month(), birth.day(), Some(current_year - age as i32)).ok())
        .unwrap_or(birth)
}

/// Parse CSV text into contacts. Every row must carry an id; CSV rosters are
/// hand-maintained, so a missing id is reported instead of guessed.
///
/// `current_year` anchors the `age` column.
pub fn parse_contacts_csv(text: &str, current_year: i32) -> Result<ImportReport> {
    let birthdays = BirthdayParser::new()?;
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut report = ImportReport::default();
    for (i, row) in rdr.deserialize::<Row>().enumerate() {
        // header is line 1
        let line = i + 2;
        let row = row.with_context(|| format!("row {line}: malformed CSV record"))?;

        let Some(id) = non_empty(row.id) else {
            bail!("row {line}: missing id");
        };
        let name = non_empty(row.name).unwrap_or_else(|| NO_NAME.to_string());
        let age = non_empty(row.age);

        let mut contact = ContactRecord::new(id, name);
        if let Some(given) = non_empty(row.given_name) {
            contact = contact.with_given_name(given);
        }
        if let Some(phone) = non_empty(row.phone) {
            contact = contact.with_phone(phone);
        }
        if let Some(raw) = non_empty(row.birthday) {
            match birthdays.parse(&raw) {
                Some(birth) => {
                    contact = contact.with_birth_date(with_year_from_age(birth, age.as_deref(), current_year))
                }
                None => {
                    report.bad_birthdays += 1;
                    warn!(line, contact_id = %contact.id, birthday = %raw, "unreadable birthday; keeping contact without one");
                }
            }
        }
        report.contacts.push(contact);
    }

    debug!(contacts = report.contacts.len(), bad_birthdays = report.bad_birthdays, "parsed csv export");
    Ok(report)
}
