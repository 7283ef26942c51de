use cakeday_core::ContactRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportKind {
    VCard,
    Csv,
}

impl ExportKind {
    /// Guess from a file extension (`vcf`/`vcard`, `csv`).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "vcf" | "vcard" => Some(ExportKind::VCard),
            "csv" => Some(ExportKind::Csv),
            _ => None,
        }
    }
}

/// Parser output: the usable contacts plus what had to be dropped or patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub contacts: Vec<ContactRecord>,
    /// Entries without a stable id in the export; their id was derived from name/phone.
    pub derived_ids: usize,
    /// Birthday fields present but unreadable; the contact was kept without one.
    pub bad_birthdays: usize,
}
