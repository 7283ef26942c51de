//! Reminder planning: one trigger per contact with a birthday, diffed against
//! what is already registered so repeated launches never duplicate.

use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::birthday_index::BirthdayIndex;
use crate::contact::ContactRecord;
use crate::date_math::next_occurrence;
use crate::error::Result;
use crate::store::{load_json, to_json, KeyValueStore};

pub const TRIGGER_PREFIX: &str = "bday.";
pub const CATCH_UP_SUFFIX: &str = ".now";
pub const THREAD_ID: &str = "birthday";
pub const REGISTERED_TRIGGERS_KEY: &str = "registeredTriggers";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderTrigger {
    pub id: String,
    pub contact_id: String,
    pub month: u32,
    pub day: u32,
    /// Set for triggers pinned to one specific year (leap-day birthdays).
    pub year: Option<i32>,
    pub fire_hour: u32,
    pub fire_minute: u32,
    pub repeats: bool,
    /// Set for catch-up triggers: fire this many seconds after registration.
    pub delay_secs: Option<u32>,
    pub title: String,
    pub body: String,
    pub thread_id: String,
}

impl ReminderTrigger {
    pub fn is_catch_up(&self) -> bool {
        self.delay_secs.is_some()
    }

    /// True when both triggers would fire at the same moments.
    pub fn same_schedule(&self, other: &ReminderTrigger) -> bool {
        self.month == other.month
            && self.day == other.day
            && self.year == other.year
            && self.fire_hour == other.fire_hour
            && self.fire_minute == other.fire_minute
            && self.repeats == other.repeats
            && self.delay_secs == other.delay_secs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPolicy {
    pub fire_hour: u32,
    pub fire_minute: u32,
    pub catch_up_delay_secs: u32,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            fire_hour: 19,
            fire_minute: 10,
            catch_up_delay_secs: 10,
        }
    }
}

impl ReminderPolicy {
    /// Whether today's fire time has already been reached at `now`.
    pub fn fire_time_passed(&self, now: NaiveDateTime) -> bool {
        (now.hour(), now.minute()) >= (self.fire_hour, self.fire_minute)
    }
}

/// Instructions for the notification layer. Apply removals before additions:
/// a changed schedule shows up as the same id in both lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPlan {
    pub to_add: Vec<ReminderTrigger>,
    pub to_remove: Vec<String>,
}

impl ReminderPlan {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Trigger id for a contact. Depends on the contact id only.
pub fn trigger_id(contact_id: &str) -> String {
    format!("{TRIGGER_PREFIX}{contact_id}")
}

pub fn catch_up_trigger_id(contact_id: &str) -> String {
    format!("{}{CATCH_UP_SUFFIX}", trigger_id(contact_id))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReminderPlanner {
    policy: ReminderPolicy,
}

impl ReminderPlanner {
    pub fn new(policy: ReminderPolicy) -> Self {
        Self { policy }
    }

    /// Every trigger that should be registered for this roster at `now`.
    pub fn desired(&self, roster: &BirthdayIndex, now: NaiveDateTime) -> Vec<ReminderTrigger> {
        let today = now.date();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();

        for contact in roster.with_birthday() {
            if !seen.insert(contact.id.as_str()) {
                warn!(contact_id = %contact.id, "duplicate contact id in roster; keeping first");
                continue;
            }
            let Some(birth) = contact.birth_date else { continue };
            let next = next_occurrence(&birth, today);

            let annual = if birth.is_leap_day() {
                // A repeating Feb 29 trigger would stay silent in common years,
                // so pin it to the observed date and re-plan after it passes.
                self.trigger(contact, trigger_id(&contact.id), next.date.month(), next.date.day())
                    .pinned_to(next.date.year())
            } else {
                self.trigger(contact, trigger_id(&contact.id), birth.month(), birth.day())
            };
            out.push(annual);

            if next.days_from_today == 0 && self.policy.fire_time_passed(now) {
                let mut catch_up =
                    self.trigger(contact, catch_up_trigger_id(&contact.id), next.date.month(), next.date.day());
                catch_up.repeats = false;
                catch_up.delay_secs = Some(self.policy.catch_up_delay_secs);
                out.push(catch_up);
            }
        }

        out
    }

    /// Diff the desired set against fully described registered triggers.
    pub fn plan(
        &self,
        roster: &BirthdayIndex,
        existing: &[ReminderTrigger],
        now: NaiveDateTime,
    ) -> ReminderPlan {
        let existing_by_id: BTreeMap<&str, &ReminderTrigger> =
            existing.iter().map(|t| (t.id.as_str(), t)).collect();
        let desired = self.desired(roster, now);
        let desired_ids: HashSet<&str> = desired.iter().map(|t| t.id.as_str()).collect();

        let mut plan = ReminderPlan::default();

        for id in existing_by_id.keys() {
            if !desired_ids.contains(id) {
                plan.to_remove.push((*id).to_string());
            }
        }

        for trigger in &desired {
            match existing_by_id.get(trigger.id.as_str()) {
                None => plan.to_add.push(trigger.clone()),
                Some(current) if !current.same_schedule(trigger) => {
                    debug!(trigger_id = %trigger.id, "schedule changed; replacing");
                    plan.to_remove.push(trigger.id.clone());
                    plan.to_add.push(trigger.clone());
                }
                Some(_) => {}
            }
        }

        info!(
            add = plan.to_add.len(),
            remove = plan.to_remove.len(),
            "planned reminder diff"
        );
        plan
    }

    /// Diff against bare registered ids. Schedule changes cannot be seen here.
    pub fn plan_ids<S: AsRef<str>>(
        &self,
        roster: &BirthdayIndex,
        existing_ids: &[S],
        now: NaiveDateTime,
    ) -> ReminderPlan {
        let existing: HashSet<&str> = existing_ids.iter().map(|s| s.as_ref()).collect();
        let desired = self.desired(roster, now);
        let desired_ids: HashSet<&str> = desired.iter().map(|t| t.id.as_str()).collect();

        let mut to_remove: Vec<String> = existing
            .iter()
            .filter(|id| !desired_ids.contains(*id))
            .map(|id| id.to_string())
            .collect();
        to_remove.sort();

        let to_add = desired
            .iter()
            .filter(|t| !existing.contains(t.id.as_str()))
            .cloned()
            .collect();

        ReminderPlan { to_add, to_remove }
    }

    fn trigger(&self, contact: &ContactRecord, id: String, month: u32, day: u32) -> ReminderTrigger {
        ReminderTrigger {
            id,
            contact_id: contact.id.clone(),
            month,
            day,
            year: None,
            fire_hour: self.policy.fire_hour,
            fire_minute: self.policy.fire_minute,
            repeats: true,
            delay_secs: None,
            title: format!("🎂 It's {}'s birthday!", contact.name),
            body: "Send them a quick message.".to_string(),
            thread_id: THREAD_ID.to_string(),
        }
    }
}

impl ReminderTrigger {
    fn pinned_to(mut self, year: i32) -> Self {
        self.year = Some(year);
        self.repeats = false;
        self
    }
}

/// OS-level notification primitive. Best effort; no result contract.
pub trait NotificationScheduler {
    fn apply(&mut self, to_add: &[ReminderTrigger], to_remove: &[String]);
}

/// Plans against the registered set kept in the store, applies the diff, and
/// records the new registered set.
///
/// Fired catch-up triggers stay in the registered set until they stop being
/// desired (the next day), so a relaunch on the same evening does not re-fire.
pub struct ReminderSync<'a> {
    planner: ReminderPlanner,
    store: &'a mut dyn KeyValueStore,
}

impl<'a> ReminderSync<'a> {
    pub fn new(planner: ReminderPlanner, store: &'a mut dyn KeyValueStore) -> Self {
        Self { planner, store }
    }

    pub fn registered(&self) -> Result<Vec<ReminderTrigger>> {
        Ok(load_json(&*self.store, REGISTERED_TRIGGERS_KEY)?.unwrap_or_default())
    }

    pub fn sync(
        &mut self,
        roster: &BirthdayIndex,
        scheduler: &mut dyn NotificationScheduler,
        now: NaiveDateTime,
    ) -> Result<ReminderPlan> {
        let registered = self.registered()?;
        let plan = self.planner.plan(roster, &registered, now);
        if plan.is_empty() {
            return Ok(plan);
        }

        scheduler.apply(&plan.to_add, &plan.to_remove);

        let removed: HashSet<&str> = plan.to_remove.iter().map(String::as_str).collect();
        let mut next: Vec<ReminderTrigger> = registered
            .into_iter()
            .filter(|t| !removed.contains(t.id.as_str()))
            .collect();
        next.extend(plan.to_add.iter().cloned());
        next.sort_by(|a, b| a.id.cmp(&b.id));

        self.store.set(REGISTERED_TRIGGERS_KEY, to_json(&next)?)?;
        Ok(plan)
    }
}
