//! `NotificationScheduler` that keeps registered triggers as an iCalendar file
//! any calendar app can subscribe to or import.

use cakeday_core::{NotificationScheduler, ReminderTrigger};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub struct IcsScheduler {
    triggers: BTreeMap<String, ReminderTrigger>,
    /// Fire times of catch-up triggers registered during this run.
    catch_up_at: BTreeMap<String, NaiveDateTime>,
    now: NaiveDateTime,
    tz: Option<Tz>,
    stamp: DateTime<Utc>,
}

impl IcsScheduler {
    /// Start from what is already registered; `now` is local wall-clock time.
    pub fn new(registered: Vec<ReminderTrigger>, now: NaiveDateTime, tz: Option<Tz>) -> Self {
        Self {
            triggers: registered.into_iter().map(|t| (t.id.clone(), t)).collect(),
            catch_up_at: BTreeMap::new(),
            now,
            tz,
            stamp: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    fn first_fire(&self, t: &ReminderTrigger) -> Option<NaiveDateTime> {
        if t.is_catch_up() {
            // Catch-ups from earlier runs have already fired.
            return self.catch_up_at.get(&t.id).copied();
        }
        let year = t.year.unwrap_or_else(|| self.now.year());
        NaiveDate::from_ymd_opt(year, t.month, t.day)?.and_hms_opt(t.fire_hour, t.fire_minute, 0)
    }

    fn format_time(&self, local: NaiveDateTime) -> String {
        match self.tz {
            Some(tz) => match tz.from_local_datetime(&local).earliest() {
                Some(zoned) => zoned.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ").to_string(),
                None => local.format("%Y%m%dT%H%M%S").to_string(),
            },
            // floating time: the calendar's own zone
            None => local.format("%Y%m%dT%H%M%S").to_string(),
        }
    }

    /// Emit a VCALENDAR with one VEVENT (plus display alarm) per live trigger.
    pub fn render(&self) -> String {
        let mut s = String::new();
        s.push_str("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Cakeday//EN\r\nX-WR-CALNAME:Birthdays\r\n");

        for t in self.triggers.values() {
            let Some(start) = self.first_fire(t) else {
                debug!(trigger = %t.id, "no upcoming fire time; not exported");
                continue;
            };
            let end = start + Duration::minutes(15);

            s.push_str("BEGIN:VEVENT\r\n");
            s.push_str(&format!("UID:{}@cakeday\r\n", t.id));
            s.push_str(&format!("DTSTAMP:{}\r\n", self.stamp.format("%Y%m%dT%H%M%SZ")));
            s.push_str(&format!("DTSTART:{}\r\n", self.format_time(start)));
            s.push_str(&format!("DTEND:{}\r\n", self.format_time(end)));
            if t.repeats {
                s.push_str("RRULE:FREQ=YEARLY\r\n");
            }
            s.push_str(&format!("SUMMARY:{}\r\n", escape_ics(&t.title)));
            s.push_str(&format!("DESCRIPTION:{}\r\n", escape_ics(&t.body)));
            s.push_str(&format!("CATEGORIES:{}\r\n", escape_ics(&t.thread_id)));
            s.push_str("BEGIN:VALARM\r\nACTION:DISPLAY\r\nTRIGGER:PT0S\r\n");
            s.push_str(&format!("DESCRIPTION:{}\r\n", escape_ics(&t.title)));
            s.push_str("END:VALARM\r\n");
            s.push_str("END:VEVENT\r\n");
        }

        s.push_str("END:VCALENDAR\r\n");
        s
    }
}

impl NotificationScheduler for IcsScheduler {
    fn apply(&mut self, to_add: &[ReminderTrigger], to_remove: &[String]) {
        for id in to_remove {
            if self.triggers.remove(id).is_none() {
                warn!(trigger = %id, "asked to remove unknown trigger");
            }
            self.catch_up_at.remove(id);
        }
        for t in to_add {
            if let Some(delay) = t.delay_secs {
                self.catch_up_at
                    .insert(t.id.clone(), self.now + Duration::seconds(delay.into()));
            }
            self.triggers.insert(t.id.clone(), t.clone());
        }
        debug!(added = to_add.len(), removed = to_remove.len(), live = self.triggers.len(), "applied reminder diff");
    }
}

fn escape_ics(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace(',', "\\,")
        .replace(';', "\\;")
}
