//! File-backed `ContactSource`: re-reads the export on every fetch.

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Local};
use tracing::info;

use cakeday_core::{CakedayError, ContactRecord, ContactSource};

use crate::parsers::{csv_contacts, vcard};
use crate::types::{ExportKind, ImportReport};

#[derive(Debug, Clone)]
pub struct FileContactSource {
    path: PathBuf,
}

impl FileContactSource {
    /// Export kind is taken from the file extension at read time.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn kind(&self) -> Result<ExportKind> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ExportKind::from_extension)
            .ok_or_else(|| anyhow!("cannot tell export format of {} (expected .vcf or .csv)", self.path.display()))
    }

    /// Read and parse the export, keeping the import statistics.
    pub fn import(&self) -> Result<ImportReport> {
        let kind = self.kind()?;
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading contacts from {}", self.path.display()))?;

        let report = match kind {
            ExportKind::VCard => vcard::parse_vcard_text(&text),
            ExportKind::Csv => csv_contacts::parse_contacts_csv(&text, Local::now().year()),
        }
        .with_context(|| format!("parsing {}", self.path.display()))?;

        info!(
            path = %self.path.display(),
            contacts = report.contacts.len(),
            derived_ids = report.derived_ids,
            bad_birthdays = report.bad_birthdays,
            "imported contacts"
        );
        Ok(report)
    }
}

impl ContactSource for FileContactSource {
    fn fetch_all(&self) -> cakeday_core::Result<Vec<ContactRecord>> {
        self.import()
            .map(|report| report.contacts)
            .map_err(|e| CakedayError::ContactSource(format!("{e:#}")))
    }
}
