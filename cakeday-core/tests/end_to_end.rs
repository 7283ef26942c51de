use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cakeday_core::{
    next_occurrence, BirthdayIndex, CakedayError, ComposeOutcome, ComposeRequest, ContactRecord,
    MessageComposer, MessageLedger, MessageTone, MessageTransport, OutreachDriver, OutreachSession,
    PartialBirthDate, Phase, ReminderPlanner, SendOutcome,
};
use chrono::{NaiveDate, TimeZone, Utc};
use tokio::sync::{Mutex, Notify};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn born(id: &str, name: &str, m: u32, day: u32) -> ContactRecord {
    ContactRecord::new(id, name).with_birth_date(PartialBirthDate::new(m, day, None).unwrap())
}

#[derive(Default)]
struct CountingComposer {
    calls: AtomicUsize,
}

#[async_trait]
impl MessageComposer for CountingComposer {
    async fn compose(&self, request: &ComposeRequest) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        format!("hey {}", request.name)
    }
}

/// Transport that blocks until released, then reports `Sent`.
struct GatedTransport {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl MessageTransport for GatedTransport {
    async fn send(&self, _phone: &str, _body: &str) -> SendOutcome {
        self.entered.notify_one();
        self.release.notified().await;
        SendOutcome::Sent
    }
}

/// Composer that blocks until released.
struct GatedComposer {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl MessageComposer for GatedComposer {
    async fn compose(&self, request: &ComposeRequest) -> String {
        self.entered.notify_one();
        self.release.notified().await;
        format!("late for {}", request.name)
    }
}

struct ScriptedTransport(Vec<SendOutcome>, AtomicUsize);

#[async_trait]
impl MessageTransport for ScriptedTransport {
    async fn send(&self, _phone: &str, _body: &str) -> SendOutcome {
        let i = self.1.fetch_add(1, Ordering::SeqCst);
        self.0[i % self.0.len()]
    }
}

#[test]
fn scenario_birthday_today_is_found_by_date_and_zero_days_away() {
    let index = BirthdayIndex::new(vec![born("a", "Alice", 12, 1)]);
    let today = d(2026, 12, 1);

    let found: Vec<_> = index.contacts_on_date(today).iter().map(|c| c.id.clone()).collect();
    assert_eq!(found, vec!["a"]);

    let birth = index.get("a").unwrap().birth_date.unwrap();
    assert_eq!(next_occurrence(&birth, today).days_from_today, 0);
}

#[test]
fn scenario_january_birthday_seen_from_late_december() {
    let birth = PartialBirthDate::new(1, 5, None).unwrap();
    let next = next_occurrence(&birth, d(2026, 12, 20));
    assert_eq!(next.date, d(2027, 1, 5));
    assert_eq!(next.days_from_today, 16);
}

#[tokio::test]
async fn scenario_no_phone_finishes_without_composing() {
    let composer = Arc::new(CountingComposer::default());
    let driver = OutreachDriver::new(
        OutreachSession::new(),
        Arc::new(Mutex::new(MessageLedger::new())),
        composer.clone(),
        Arc::new(ScriptedTransport(vec![SendOutcome::Sent], AtomicUsize::new(0))),
    );

    driver.start(vec![born("a", "Alice", 12, 1)], d(2026, 12, 1)).await.unwrap();
    let outcome = driver.choose_tone(MessageTone::Casual, None).await.unwrap();

    assert!(matches!(outcome, ComposeOutcome::Skipped(CakedayError::NoPhoneNumber { .. })));
    assert_eq!(driver.phase().await, Phase::Done);
    assert_eq!(composer.calls.load(Ordering::SeqCst), 0);
    let session = driver.session();
    let session = session.lock().await;
    assert!(matches!(session.last_error(), Some(CakedayError::NoPhoneNumber { .. })));
}

#[test]
fn scenario_ledger_history_newest_first() {
    let mut ledger = MessageLedger::new();
    let t1 = Utc.with_ymd_and_hms(2026, 12, 1, 9, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2026, 12, 1, 9, 30, 0).unwrap();
    ledger.record("a", "hi", t1);
    ledger.record("a", "bye", t2);

    let texts: Vec<_> = ledger.history_for("a").iter().map(|r| r.text.clone()).collect();
    assert_eq!(texts, vec!["bye", "hi"]);
    assert_eq!(ledger.total(), 2);
}

#[test]
fn scenario_removed_contact_loses_its_trigger() {
    let planner = ReminderPlanner::default();
    let now = d(2026, 1, 2).and_hms_opt(8, 0, 0).unwrap();
    let roster = BirthdayIndex::new(vec![
        born("a", "Alice", 3, 1),
        born("b", "Bob", 6, 1),
        born("c", "Cara", 9, 1),
    ]);

    let first = planner.plan_ids::<String>(&roster, &[], now);
    assert_eq!(first.to_add.len(), 3);
    assert!(first.to_remove.is_empty());

    let registered: Vec<String> = first.to_add.iter().map(|t| t.id.clone()).collect();
    assert!(planner.plan_ids(&roster, &registered, now).is_empty());

    let without_bob = BirthdayIndex::new(vec![born("a", "Alice", 3, 1), born("c", "Cara", 9, 1)]);
    let second = planner.plan_ids(&without_bob, &registered, now);
    assert_eq!(second.to_remove, vec!["bday.b".to_string()]);
    assert!(second.to_add.is_empty());
}

#[test]
fn sorted_roster_puts_birthdays_first_and_is_stable() {
    let roster = BirthdayIndex::new(vec![
        ContactRecord::new("x", "X"),
        born("late", "Late", 11, 30),
        ContactRecord::new("y", "Y"),
        born("tie1", "Tie1", 2, 2),
        born("tie2", "Tie2", 2, 2),
    ]);
    let ids: Vec<_> = roster
        .sorted_by_next_occurrence(d(2026, 1, 15))
        .iter()
        .map(|c| c.id.clone())
        .collect();
    assert_eq!(ids, vec!["tie1", "tie2", "late", "x", "y"]);
}

#[tokio::test]
async fn outreach_reaches_done_within_queue_length() {
    let ledger = Arc::new(Mutex::new(MessageLedger::new()));
    let transport = ScriptedTransport(
        vec![SendOutcome::Sent, SendOutcome::Cancelled, SendOutcome::Failed],
        AtomicUsize::new(0),
    );
    let driver = OutreachDriver::new(
        OutreachSession::new(),
        Arc::clone(&ledger),
        Arc::new(CountingComposer::default()),
        Arc::new(transport),
    );
    let people: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|id| born(id, id, 12, 1).with_phone("555 0100"))
        .collect();
    driver.start(people, d(2026, 12, 1)).await.unwrap();

    let mut advances = 0;
    while driver.phase().await != Phase::Done {
        driver.choose_tone(MessageTone::Funny, None).await.unwrap();
        driver.confirm_send().await.unwrap();
        advances += 1;
        assert!(advances <= 3);
    }

    let ledger = ledger.lock().await;
    assert_eq!(ledger.total(), 1);
    assert!(ledger.is_consistent());
}

#[tokio::test]
async fn cancel_during_send_discards_the_late_result() {
    let ledger = Arc::new(Mutex::new(MessageLedger::new()));
    let transport = Arc::new(GatedTransport {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let driver = OutreachDriver::new(
        OutreachSession::new(),
        Arc::clone(&ledger),
        Arc::new(CountingComposer::default()),
        transport.clone(),
    );
    driver
        .start(vec![born("a", "Alice", 12, 1).with_phone("5550100")], d(2026, 12, 1))
        .await
        .unwrap();
    driver.choose_tone(MessageTone::Formal, None).await.unwrap();

    let sending = {
        let driver = driver.clone();
        tokio::spawn(async move { driver.confirm_send().await })
    };

    transport.entered.notified().await;
    assert_eq!(driver.phase().await, Phase::Delivering);
    driver.cancel().await.unwrap();
    transport.release.notify_one();

    assert_eq!(sending.await.unwrap().unwrap(), None);
    assert_eq!(ledger.lock().await.total(), 0);
    assert_eq!(driver.phase().await, Phase::Done);
}

#[tokio::test]
async fn cancel_during_compose_discards_the_draft() {
    let ledger = Arc::new(Mutex::new(MessageLedger::new()));
    let composer = Arc::new(GatedComposer {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let driver = OutreachDriver::new(
        OutreachSession::new(),
        Arc::clone(&ledger),
        composer.clone(),
        Arc::new(ScriptedTransport(vec![SendOutcome::Sent], AtomicUsize::new(0))),
    );
    driver
        .start(vec![born("a", "Alice", 12, 1).with_phone("5550100")], d(2026, 12, 1))
        .await
        .unwrap();

    let composing = {
        let driver = driver.clone();
        tokio::spawn(async move { driver.choose_tone(MessageTone::Casual, None).await })
    };

    composer.entered.notified().await;
    assert_eq!(driver.phase().await, Phase::AwaitingComposition);
    driver.cancel().await.unwrap();
    composer.release.notify_one();

    assert_eq!(composing.await.unwrap().unwrap(), ComposeOutcome::Discarded);
    assert_eq!(driver.phase().await, Phase::Done);
    let session = driver.session();
    assert_eq!(session.lock().await.draft(), None);
    assert_eq!(ledger.lock().await.total(), 0);
}
