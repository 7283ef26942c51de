//! MessageLedger: per-contact history of sent birthday messages.
//!
//! History and the running total live in one struct and change together inside
//! a single `&mut self` call, so no caller can observe one without the other.
//! Persistence writes both keys in one `set_many`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::store::{load_json, to_json, KeyValueStore};

pub const LEDGER_KEY: &str = "messageLedger";
pub const TOTAL_COUNTER_KEY: &str = "totalBirthdayMessagesSent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub contact_id: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// Deterministic record id, so replaying the same send is a no-op.
pub fn message_id(contact_id: &str, sent_at: DateTime<Utc>) -> String {
    format!("{}:{}", contact_id, sent_at.timestamp_millis())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLedger {
    history: BTreeMap<String, Vec<MessageRecord>>,
    total: usize,
}

impl MessageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn contact_ids(&self) -> impl Iterator<Item = &str> {
        self.history.keys().map(String::as_str)
    }

    /// Append a send. Returns false when the same record was already present.
    pub fn record(&mut self, contact_id: &str, text: &str, sent_at: DateTime<Utc>) -> bool {
        let id = message_id(contact_id, sent_at);
        let entries = self.history.entry(contact_id.to_string()).or_default();
        if entries.iter().any(|r| r.id == id) {
            debug!(message_id = %id, "duplicate record ignored");
            return false;
        }

        entries.push(MessageRecord {
            id,
            contact_id: contact_id.to_string(),
            text: text.to_string(),
            sent_at,
        });
        self.total += 1;
        debug_assert!(self.is_consistent());
        info!(contact_id, total = self.total, "recorded birthday message");
        true
    }

    /// Newest first; equal timestamps keep reverse insertion order.
    pub fn history_for(&self, contact_id: &str) -> Vec<&MessageRecord> {
        let mut out: Vec<&MessageRecord> = self
            .history
            .get(contact_id)
            .map(|v| v.iter().rev().collect())
            .unwrap_or_default();
        out.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        out
    }

    pub fn last_message_for(&self, contact_id: &str) -> Option<&MessageRecord> {
        self.history_for(contact_id).into_iter().next()
    }

    /// Clears one contact's history. Returns how many records were removed.
    pub fn reset_for(&mut self, contact_id: &str) -> usize {
        let removed = self.history.remove(contact_id).map(|v| v.len()).unwrap_or(0);
        self.total -= removed;
        debug_assert!(self.is_consistent());
        info!(contact_id, removed, total = self.total, "reset contact history");
        removed
    }

    pub fn reset_all(&mut self) -> usize {
        let removed = self.total;
        self.history.clear();
        self.total = 0;
        info!(removed, "reset all message history");
        removed
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.history.values().map(Vec::len).sum::<usize>()
    }

    /// Load from the store. A missing ledger is empty; a stored total that
    /// disagrees with the history is rebuilt from the history.
    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        let mut ledger: MessageLedger = load_json(store, LEDGER_KEY)?.unwrap_or_default();
        if !ledger.is_consistent() {
            ledger.total = ledger.history.values().map(Vec::len).sum();
        }
        Ok(ledger)
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) -> Result<()> {
        store.set_many(vec![
            (LEDGER_KEY.to_string(), to_json(self)?),
            (TOTAL_COUNTER_KEY.to_string(), self.total.to_string()),
        ])
    }
}
