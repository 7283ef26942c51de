//! vCard (.vcf) export parser, versions 2.1 through 4.0.
//!
//! Only the properties the roster needs are read:
//!   UID / X-ABUID   stable contact id
//!   FN, N           display name
//!   TEL             first phone number
//!   BDAY            birthday, year optional

use anyhow::{bail, Result};
use tracing::{debug, warn};

use cakeday_core::{ContactRecord, NO_NAME};

use super::{derived_id, BirthdayParser};
use crate::types::ImportReport;

#[derive(Default)]
struct Card {
    uid: Option<String>,
    full_name: Option<String>,
    structured_name: Option<String>,
    given_name: Option<String>,
    phone: Option<String>,
    birthday: Option<String>,
}

/// Join folded lines: a line starting with a space or tab continues the previous one.
fn unfold(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in text.lines() {
        let line = raw.trim_end_matches('\r');
        match (line.strip_prefix(' ').or_else(|| line.strip_prefix('\t')), out.last_mut()) {
            (Some(rest), Some(prev)) => prev.push_str(rest),
            _ => out.push(line.to_string()),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push(' '),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out.trim().to_string()
}

/// `item1.TEL;TYPE=CELL` -> `TEL`
fn property_name(head: &str) -> String {
    let name = head.split(';').next().unwrap_or_default();
    let name = name.rsplit('.').next().unwrap_or(name);
    name.to_ascii_uppercase()
}

/// `N:Family;Given;Middle;Prefix;Suffix` -> (`Given Family`, `Given`)
fn name_from_structured(value: &str) -> (Option<String>, Option<String>) {
    let mut parts = value.split(';').map(unescape);
    let family = parts.next().unwrap_or_default();
    let given = parts.next().unwrap_or_default();
    let joined = [given.as_str(), family.as_str()]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (
        (!joined.is_empty()).then_some(joined),
        (!given.is_empty()).then_some(given),
    )
}

fn set_once(slot: &mut Option<String>, value: String) {
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value);
    }
}

/// Parse a vCard export into contacts.
///
/// Cards without an id get one derived from name and phone. Unreadable
/// birthdays are dropped (the contact is kept) and counted in the report.
pub fn parse_vcard_text(text: &str) -> Result<ImportReport> {
    let birthdays = BirthdayParser::new()?;
    let mut report = ImportReport::default();
    let mut current: Option<Card> = None;

    for (lineno, line) in unfold(text).iter().enumerate() {
        let Some((head, value)) = line.split_once(':') else {
            continue;
        };
        let name = property_name(head);

        match name.as_str() {
            "BEGIN" if value.eq_ignore_ascii_case("VCARD") => {
                if current.is_some() {
                    bail!("line {}: BEGIN:VCARD inside an open card", lineno + 1);
                }
                current = Some(Card::default());
            }
            "END" if value.eq_ignore_ascii_case("VCARD") => {
                let Some(card) = current.take() else {
                    bail!("line {}: END:VCARD without BEGIN", lineno + 1);
                };
                let contact = finish_card(
                    card,
                    &birthdays,
                    &mut report.derived_ids,
                    &mut report.bad_birthdays,
                );
                report.contacts.push(contact);
            }
            _ => {
                let Some(card) = current.as_mut() else {
                    continue;
                };
                match name.as_str() {
                    "UID" | "X-ABUID" => set_once(&mut card.uid, unescape(value)),
                    "FN" => set_once(&mut card.full_name, unescape(value)),
                    "N" => {
                        let (full, given) = name_from_structured(value);
                        if let Some(n) = full {
                            set_once(&mut card.structured_name, n);
                        }
                        if let Some(g) = given {
                            set_once(&mut card.given_name, g);
                        }
                    }
                    "TEL" => set_once(&mut card.phone, unescape(value)),
                    "BDAY" => set_once(&mut card.birthday, unescape(value)),
                    _ => {}
                }
            }
        }
    }

    if current.is_some() {
        bail!("export ends inside an unterminated card");
    }

    debug!(
        contacts = report.contacts.len(),
        derived_ids = report.derived_ids,
        bad_birthdays = report.bad_birthdays,
        "parsed vcard export"
    );
    Ok(report)
}

fn finish_card(
    card: Card,
    birthdays: &BirthdayParser,
    derived_ids: &mut usize,
    bad_birthdays: &mut usize,
) -> ContactRecord {
    let name = card
        .full_name
        .or(card.structured_name)
        .unwrap_or_else(|| NO_NAME.to_string());

    let id = match card.uid {
        Some(uid) => uid,
        None => {
            *derived_ids += 1;
            let id = derived_id(&name, card.phone.as_deref());
            warn!(%name, %id, "card has no UID; derived id from name and phone");
            id
        }
    };

    let mut contact = ContactRecord::new(id, name);
    if let Some(given) = card.given_name {
        contact = contact.with_given_name(given);
    }
    if let Some(phone) = card.phone {
        contact = contact.with_phone(phone);
    }
    if let Some(raw) = card.birthday {
        match birthdays.parse(&raw) {
            Some(birth) => contact = contact.with_birth_date(birth),
            None => {
                *bad_birthdays += 1;
                warn!(contact_id = %contact.id, bday = %raw, "unreadable BDAY; keeping contact without birthday");
            }
        }
    }
    contact
}
