//! Home-screen summary payload, stored as JSON for the widget to read.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::birthday_index::BirthdayIndex;
use crate::error::Result;
use crate::ledger::MessageLedger;
use crate::store::{to_json, KeyValueStore};

pub const WIDGET_KEY: &str = "BirthdayWidgetData";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSummary {
    pub next_name: Option<String>,
    pub days_to_next: Option<i64>,
    pub upcoming_this_month: usize,
    pub remembered_count: usize,
}

impl WidgetSummary {
    pub fn build(index: &BirthdayIndex, ledger: &MessageLedger, today: NaiveDate) -> Self {
        let next = index.upcoming(today).into_iter().next();
        Self {
            next_name: next.map(|(c, _)| c.name.clone()),
            days_to_next: next.map(|(_, n)| n.days_from_today),
            upcoming_this_month: index.count_this_month(today),
            remembered_count: ledger.total(),
        }
    }

    pub fn days_label(&self) -> String {
        match (&self.next_name, self.days_to_next) {
            (Some(_), Some(0)) => "Today 🎉".to_string(),
            (Some(_), Some(1)) => "In 1 day".to_string(),
            (Some(_), Some(days)) => format!("In {days} days"),
            _ => "No upcoming birthdays".to_string(),
        }
    }

    pub fn remembered_caption(&self) -> &'static str {
        match self.remembered_count {
            0 => "Start sending birthday messages 🎉",
            1..=9 => "Nice start – keep going! 🎂",
            _ => "You're a birthday pro 🥳",
        }
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) -> Result<()> {
        store.set(WIDGET_KEY, to_json(self)?)
    }

    /// Missing or unreadable payloads load as `None`; the widget shows a placeholder.
    pub fn load(store: &dyn KeyValueStore) -> Option<Self> {
        let raw = store.get(WIDGET_KEY).ok().flatten()?;
        serde_json::from_str(&raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::ContactRecord;
    use crate::date_math::PartialBirthDate;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn summarizes_roster_and_ledger() {
        let index = BirthdayIndex::new(vec![
            ContactRecord::new("b", "Bob").with_birth_date(PartialBirthDate::new(12, 24, None).unwrap()),
            ContactRecord::new("a", "Alice").with_birth_date(PartialBirthDate::new(12, 3, None).unwrap()),
            ContactRecord::new("c", "Cara"),
        ]);
        let mut ledger = MessageLedger::new();
        ledger.record("a", "hi", Utc.with_ymd_and_hms(2025, 12, 3, 9, 0, 0).unwrap());

        let summary = WidgetSummary::build(&index, &ledger, d(2026, 12, 1));
        assert_eq!(summary.next_name.as_deref(), Some("Alice"));
        assert_eq!(summary.days_to_next, Some(2));
        assert_eq!(summary.upcoming_this_month, 2);
        assert_eq!(summary.remembered_count, 1);
        assert_eq!(summary.days_label(), "In 2 days");
        assert_eq!(summary.remembered_caption(), "Nice start – keep going! 🎂");
    }

    #[test]
    fn payload_uses_camel_case_keys() {
        let summary = WidgetSummary {
            next_name: None,
            days_to_next: None,
            upcoming_this_month: 0,
            remembered_count: 12,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["rememberedCount"], 12);
        assert!(json.get("upcomingThisMonth").is_some());
        assert_eq!(summary.days_label(), "No upcoming birthdays");
        assert_eq!(summary.remembered_caption(), "You're a birthday pro 🥳");
    }

    #[test]
    fn corrupt_payload_loads_as_none() {
        let mut store = MemoryStore::new();
        assert!(WidgetSummary::load(&store).is_none());
        store.set(WIDGET_KEY, "{not json".to_string()).unwrap();
        assert!(WidgetSummary::load(&store).is_none());
    }
}
