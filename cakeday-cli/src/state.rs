//! On-disk state under `~/.cakeday/`.

use anyhow::{Context, Result};
use cakeday_core::{CakedayError, KeyValueStore};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub fn cakeday_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".cakeday"))
}

pub fn ensure_cakeday_home() -> Result<PathBuf> {
    let dir = cakeday_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn store_path() -> Result<PathBuf> {
    Ok(ensure_cakeday_home()?.join("store.json"))
}

pub fn default_ics_path() -> Result<PathBuf> {
    Ok(ensure_cakeday_home()?.join("birthdays.ics"))
}

/// `KeyValueStore` kept as one JSON object of string values.
///
/// Every write rewrites the whole file through a sibling temp file and a
/// rename, so a crash leaves either the old or the new snapshot.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let s = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            if s.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), keys = values.len(), "opened store");
        Ok(Self { path, values })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(store_path()?)
    }

    fn flush(&self) -> cakeday_core::Result<()> {
        let store_err = |e: std::io::Error| CakedayError::Store(format!("{}: {e}", self.path.display()));

        let json = serde_json::to_string_pretty(&self.values)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(store_err)?;
        fs::rename(&tmp, &self.path).map_err(store_err)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> cakeday_core::Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> cakeday_core::Result<()> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }

    fn set_many(&mut self, entries: Vec<(String, String)>) -> cakeday_core::Result<()> {
        self.values.extend(entries);
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cakeday_core::{MessageLedger, WidgetSummary};
    use chrono::{TimeZone, Utc};

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v".to_string()).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn ledger_persists_history_and_total_together() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut ledger = MessageLedger::new();
        ledger.record("a", "hi", Utc.with_ymd_and_hms(2026, 12, 1, 9, 0, 0).unwrap());
        let mut store = JsonFileStore::open(&path).unwrap();
        ledger.save(&mut store).unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("totalBirthdayMessagesSent").unwrap().as_deref(), Some("1"));
        assert_eq!(MessageLedger::load(&store).unwrap().total(), 1);
    }

    #[test]
    fn corrupt_store_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{oops").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
        assert!(WidgetSummary::load(&JsonFileStore::open(dir.path().join("other.json")).unwrap()).is_none());
    }
}
