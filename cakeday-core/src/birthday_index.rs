//! BirthdayIndex: derived views over an immutable roster.
//!
//! Every query recomputes next occurrences from the `today` it is given;
//! nothing date-dependent is cached, because "today" moves.
//!
//! Views:
//! - with / without birthday
//! - sorted by next occurrence (stable, birthday-less contacts last)
//! - this month (by next occurrence month, not raw birth month)
//! - calendar lookups by month/day or month

use chrono::{Datelike, Month, NaiveDate};

use crate::contact::ContactRecord;
use crate::date_math::{next_occurrence, NextOccurrence};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BirthdayIndex {
    contacts: Vec<ContactRecord>,
}

impl BirthdayIndex {
    pub fn new(contacts: Vec<ContactRecord>) -> Self {
        Self { contacts }
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn contacts(&self) -> &[ContactRecord] {
        &self.contacts
    }

    pub fn get(&self, id: &str) -> Option<&ContactRecord> {
        self.contacts.iter().find(|c| c.id == id)
    }

    pub fn with_birthday(&self) -> Vec<&ContactRecord> {
        self.contacts.iter().filter(|c| c.has_birthday()).collect()
    }

    pub fn without_birthday(&self) -> Vec<&ContactRecord> {
        self.contacts.iter().filter(|c| !c.has_birthday()).collect()
    }

    pub fn next_occurrence_of(&self, contact: &ContactRecord, today: NaiveDate) -> Option<NextOccurrence> {
        contact.birth_date.as_ref().map(|b| next_occurrence(b, today))
    }

    /// Soonest birthday first; contacts without one keep roster order at the end.
    pub fn sorted_by_next_occurrence(&self, today: NaiveDate) -> Vec<&ContactRecord> {
        let mut keyed: Vec<(Option<i64>, &ContactRecord)> = self
            .contacts
            .iter()
            .map(|c| (self.next_occurrence_of(c, today).map(|n| n.days_from_today), c))
            .collect();

        // sort_by_key is stable; None sorts after every Some via the bool.
        keyed.sort_by_key(|(days, _)| (days.is_none(), days.unwrap_or(0)));
        keyed.into_iter().map(|(_, c)| c).collect()
    }

    /// Contacts with a birthday, soonest first, paired with their next occurrence.
    pub fn upcoming(&self, today: NaiveDate) -> Vec<(&ContactRecord, NextOccurrence)> {
        self.sorted_by_next_occurrence(today)
            .into_iter()
            .filter_map(|c| self.next_occurrence_of(c, today).map(|n| (c, n)))
            .collect()
    }

    /// Contacts whose next occurrence lands in today's month and year.
    pub fn contacts_this_month(&self, today: NaiveDate) -> Vec<&ContactRecord> {
        self.sorted_by_next_occurrence(today)
            .into_iter()
            .filter(|c| {
                self.next_occurrence_of(c, today)
                    .map(|n| n.date.year() == today.year() && n.date.month() == today.month())
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn count_this_month(&self, today: NaiveDate) -> usize {
        self.contacts_this_month(today).len()
    }

    /// People celebrating today, in roster order.
    pub fn birthdays_today(&self, today: NaiveDate) -> Vec<&ContactRecord> {
        self.contacts
            .iter()
            .filter(|c| {
                self.next_occurrence_of(c, today)
                    .map(|n| n.days_from_today == 0)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Calendar lookup on the stored month/day, independent of today.
    pub fn contacts_on_date(&self, date: NaiveDate) -> Vec<&ContactRecord> {
        self.contacts
            .iter()
            .filter(|c| c.birth_date.map(|b| b.matches_month_day(date)).unwrap_or(false))
            .collect()
    }

    pub fn contacts_in_month(&self, month: u32) -> Vec<&ContactRecord> {
        self.contacts
            .iter()
            .filter(|c| c.birth_date.map(|b| b.month() == month).unwrap_or(false))
            .collect()
    }

    /// Accepts "march", "Mar", "MARCH"; unknown names give an empty result.
    pub fn contacts_in_month_named(&self, name: &str) -> Vec<&ContactRecord> {
        match name.trim().parse::<Month>() {
            Ok(m) => self.contacts_in_month(m.number_from_month()),
            Err(_) => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_math::PartialBirthDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn contact(id: &str, md: Option<(u32, u32)>) -> ContactRecord {
        let c = ContactRecord::new(id, id.to_uppercase());
        match md {
            Some((m, day)) => c.with_birth_date(PartialBirthDate::new(m, day, None).unwrap()),
            None => c,
        }
    }

    fn ids(v: &[&ContactRecord]) -> Vec<String> {
        v.iter().map(|c| c.id.clone()).collect()
    }

    #[test]
    fn sorts_by_days_and_keeps_missing_last_in_order() {
        let idx = BirthdayIndex::new(vec![
            contact("nobday1", None),
            contact("march", Some((3, 1))),
            contact("nobday2", None),
            contact("jan", Some((1, 10))),
            contact("also_march", Some((3, 1))),
        ]);
        let sorted = idx.sorted_by_next_occurrence(d(2026, 1, 1));
        assert_eq!(
            ids(&sorted),
            vec!["jan", "march", "also_march", "nobday1", "nobday2"]
        );
    }

    #[test]
    fn this_month_uses_next_occurrence() {
        let idx = BirthdayIndex::new(vec![
            contact("passed", Some((12, 1))),
            contact("later", Some((12, 25))),
            contact("jan", Some((1, 2))),
        ]);
        // Dec 1 already passed on Dec 10: its next occurrence is next December.
        let this_month = idx.contacts_this_month(d(2026, 12, 10));
        assert_eq!(ids(&this_month), vec!["later"]);
        assert_eq!(idx.count_this_month(d(2026, 12, 10)), 1);
    }

    #[test]
    fn on_date_is_a_calendar_lookup() {
        let idx = BirthdayIndex::new(vec![
            contact("a", Some((12, 1))),
            contact("b", Some((12, 2))),
            contact("c", None),
        ]);
        assert_eq!(ids(&idx.contacts_on_date(d(1999, 12, 1))), vec!["a"]);
    }

    #[test]
    fn month_lookup_by_number_and_name() {
        let idx = BirthdayIndex::new(vec![
            contact("a", Some((3, 1))),
            contact("b", Some((4, 2))),
        ]);
        assert_eq!(ids(&idx.contacts_in_month(3)), vec!["a"]);
        assert_eq!(ids(&idx.contacts_in_month_named("april")), vec!["b"]);
        assert_eq!(ids(&idx.contacts_in_month_named("Mar")), vec!["a"]);
        assert!(idx.contacts_in_month_named("smarch").is_empty());
    }

    #[test]
    fn birthdays_today_honours_leap_policy() {
        let idx = BirthdayIndex::new(vec![
            contact("leap", Some((2, 29))),
            contact("other", Some((2, 28))),
        ]);
        assert_eq!(ids(&idx.birthdays_today(d(2026, 2, 28))), vec!["leap", "other"]);
        assert_eq!(ids(&idx.birthdays_today(d(2028, 2, 28))), vec!["other"]);
    }

    #[test]
    fn empty_roster_yields_empty_views() {
        let idx = BirthdayIndex::default();
        let today = d(2026, 6, 1);
        assert!(idx.sorted_by_next_occurrence(today).is_empty());
        assert!(idx.with_birthday().is_empty());
        assert_eq!(idx.count_this_month(today), 0);
    }
}
