//! cakeday-ingest: address-book export parsers (vCard, CSV) feeding the core roster.

pub mod parsers;
pub mod source;
pub mod types;

pub use source::FileContactSource;
pub use types::{ExportKind, ImportReport};
