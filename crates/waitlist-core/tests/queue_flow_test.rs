//! Integration tests for the waitlist coordinator.
//!
//! These tests verify:
//! - Join, promote, claim and leave flows keep positions contiguous
//! - Claim windows are enforced even before a sweep runs
//! - The sweep expires lapsed holders and hands the equipment on
//! - Failed notices never undo a promotion

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

use std::{sync::Arc, time::Duration};

use chrono::{TimeDelta, TimeZone, Utc};
use waitlist_core::{
    EntryStatus, EquipmentId, Error, ErrorKind, EventType, LogGateway, ManualClock, MemberId,
    NotificationGateway, QueueCoordinator, QueueSettings, QueueStore, SqliteQueueStore,
    TurnNotice,
};

// ============================================================================
// TEST HARNESS
// ============================================================================

/// Gateway that always fails delivery.
#[derive(Debug)]
struct FailingGateway;

#[async_trait::async_trait]
impl NotificationGateway for FailingGateway {
    async fn notify(&self, _notice: &TurnNotice) -> waitlist_core::Result<()> {
        Err(Error::DeliveryFailed("connection refused".to_string()))
    }
}

/// Gateway that never answers.
#[derive(Debug)]
struct HangingGateway;

#[async_trait::async_trait]
impl NotificationGateway for HangingGateway {
    async fn notify(&self, _notice: &TurnNotice) -> waitlist_core::Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Gateway that takes 30 seconds of clock time per notice.
#[derive(Debug)]
struct SlowGateway {
    clock: ManualClock,
}

#[async_trait::async_trait]
impl NotificationGateway for SlowGateway {
    async fn notify(&self, _notice: &TurnNotice) -> waitlist_core::Result<()> {
        self.clock.advance(TimeDelta::seconds(30));
        Ok(())
    }
}

struct Harness {
    coordinator: QueueCoordinator,
    store: Arc<SqliteQueueStore>,
    clock: ManualClock,
}

async fn harness_with(gateway: Arc<dyn NotificationGateway>, settings: QueueSettings) -> Harness {
    harness_with_clock(gateway, settings, start_clock()).await
}

fn start_clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap())
}

async fn harness_with_clock(
    gateway: Arc<dyn NotificationGateway>,
    settings: QueueSettings,
    clock: ManualClock,
) -> Harness {
    let store = Arc::new(SqliteQueueStore::open_in_memory().await.unwrap());
    let coordinator = QueueCoordinator::new(
        store.clone(),
        gateway,
        Arc::new(clock.clone()),
        settings,
    );
    Harness {
        coordinator,
        store,
        clock,
    }
}

async fn harness() -> Harness {
    harness_with(Arc::new(LogGateway), QueueSettings::default()).await
}

fn eq(id: &str) -> EquipmentId {
    EquipmentId::new(id)
}

fn member(id: &str) -> MemberId {
    MemberId::new(id)
}

async fn assert_contiguous(store: &SqliteQueueStore, equipment: &EquipmentId) {
    let active = store.list_active(equipment).await.unwrap();
    let positions: Vec<u32> = active.iter().map(|e| e.position.unwrap()).collect();
    let expected: Vec<u32> = (1..=u32::try_from(active.len()).unwrap()).collect();
    assert_eq!(positions, expected, "positions must be 1..N");

    let notified = active
        .iter()
        .filter(|e| e.status == EntryStatus::Notified)
        .count();
    assert!(notified <= 1, "at most one notified entry");
}

// ============================================================================
// JOIN / CLAIM FLOW
// ============================================================================

#[tokio::test]
async fn test_join_promote_claim_flow() {
    let h = harness().await;
    let e1 = eq("E1");

    let a = h.coordinator.join(&e1, &member("A"), None).await.unwrap();
    assert_eq!(a.position, 1);
    assert_eq!(a.total_in_queue, 1);

    let b = h
        .coordinator
        .join(&e1, &member("B"), Some("Bea"))
        .await
        .unwrap();
    assert_eq!(b.position, 2);
    assert_eq!(b.total_in_queue, 2);

    let promoted = h.coordinator.on_resource_freed(&e1).await.unwrap().unwrap();
    assert_eq!(promoted.member_id, member("A"));
    assert_eq!(promoted.status, EntryStatus::Notified);
    assert_eq!(
        promoted.expires_at,
        Some(h.clock_now() + TimeDelta::minutes(5))
    );

    let view = h.coordinator.position(&e1, &member("B")).await.unwrap();
    assert_eq!(view.position, Some(2));
    assert_eq!(view.status, Some(EntryStatus::Waiting));

    let claimed = h.coordinator.claim(&e1, &member("A")).await.unwrap();
    assert_eq!(claimed.status, EntryStatus::Claimed);
    assert_eq!(claimed.position, None);

    // A no longer counts, so B moves up but stays waiting.
    let view = h.coordinator.position(&e1, &member("B")).await.unwrap();
    assert_eq!(view.position, Some(1));
    assert_eq!(view.status, Some(EntryStatus::Waiting));
    assert_contiguous(&h.store, &e1).await;

    let promoted = h.coordinator.on_resource_freed(&e1).await.unwrap().unwrap();
    assert_eq!(promoted.member_id, member("B"));
}

impl Harness {
    fn clock_now(&self) -> chrono::DateTime<Utc> {
        use waitlist_core::Clock;
        self.clock.now()
    }
}

#[tokio::test]
async fn test_join_twice_fails_with_already_queued() {
    let h = harness().await;
    let e1 = eq("E1");

    h.coordinator.join(&e1, &member("A"), None).await.unwrap();
    let err = h.coordinator.join(&e1, &member("A"), None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyQueued);

    h.coordinator.on_resource_freed(&e1).await.unwrap();
    let err = h.coordinator.join(&e1, &member("A"), None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyQueued);

    // Other equipment is independent.
    h.coordinator.join(&eq("E2"), &member("A"), None).await.unwrap();
}

#[tokio::test]
async fn test_claim_while_waiting_is_not_your_turn() {
    let h = harness().await;
    let e1 = eq("E1");
    h.coordinator.join(&e1, &member("A"), None).await.unwrap();
    h.coordinator.join(&e1, &member("B"), None).await.unwrap();

    let err = h.coordinator.claim(&e1, &member("B")).await.unwrap_err();
    assert!(matches!(err, Error::NotYourTurn { position: 2, .. }));

    let err = h.coordinator.claim(&e1, &member("C")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInQueue);
}

#[tokio::test]
async fn test_claim_after_deadline_fails_before_sweep() {
    let h = harness().await;
    let e1 = eq("E1");
    h.coordinator.join(&e1, &member("A"), None).await.unwrap();
    let notified = h.coordinator.on_resource_freed(&e1).await.unwrap().unwrap();

    // Exactly at the deadline is still in time.
    h.clock.advance(TimeDelta::minutes(5));
    let view = h.coordinator.position(&e1, &member("A")).await.unwrap();
    assert_eq!(view.expires_at, notified.expires_at);

    h.clock.advance(TimeDelta::seconds(1));
    let err = h.coordinator.claim(&e1, &member("A")).await.unwrap_err();
    assert!(matches!(err, Error::ClaimWindowExpired { expires_at } if Some(expires_at) == notified.expires_at));

    // Nothing changed until the sweep runs.
    let entry = h.store.get(notified.id).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Notified);
}

#[tokio::test]
async fn test_claim_at_deadline_succeeds() {
    let h = harness().await;
    let e1 = eq("E1");
    h.coordinator.join(&e1, &member("A"), None).await.unwrap();
    h.coordinator.on_resource_freed(&e1).await.unwrap();

    h.clock.advance(TimeDelta::minutes(5));
    let claimed = h.coordinator.claim(&e1, &member("A")).await.unwrap();
    assert_eq!(claimed.status, EntryStatus::Claimed);
}

// ============================================================================
// LEAVE
// ============================================================================

#[tokio::test]
async fn test_leave_shifts_later_entries_down() {
    let h = harness().await;
    let e1 = eq("E1");
    for m in ["A", "B", "C", "D"] {
        h.coordinator.join(&e1, &member(m), None).await.unwrap();
    }

    let left = h.coordinator.leave(&e1, &member("B")).await.unwrap();
    assert_eq!(left.status, EntryStatus::Left);

    let queue = h.coordinator.queue(&e1).await.unwrap();
    let order: Vec<(&str, u32)> = queue
        .entries
        .iter()
        .map(|e| (e.member_id.as_str(), e.position))
        .collect();
    assert_eq!(order, vec![("A", 1), ("C", 2), ("D", 3)]);
    assert_eq!(queue.total_in_queue, 3);

    let err = h.coordinator.leave(&e1, &member("B")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInQueue);
}

#[tokio::test]
async fn test_notified_leave_is_handed_on_by_sweep() {
    let h = harness().await;
    let e1 = eq("E1");
    h.coordinator.join(&e1, &member("A"), None).await.unwrap();
    h.coordinator.join(&e1, &member("B"), None).await.unwrap();
    h.coordinator.on_resource_freed(&e1).await.unwrap();

    let left = h.coordinator.leave(&e1, &member("A")).await.unwrap();
    assert_eq!(left.status, EntryStatus::Left);

    let report = h.coordinator.sweep_expired().await.unwrap();
    assert!(report.expired.is_empty());
    assert_eq!(report.promoted.len(), 1);

    let view = h.coordinator.position(&e1, &member("B")).await.unwrap();
    assert_eq!(view.status, Some(EntryStatus::Notified));
    assert_eq!(view.position, Some(1));

    // The hand-off is consumed.
    let report = h.coordinator.sweep_expired().await.unwrap();
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_notified_leave_is_handed_on_by_freed_signal() {
    let h = harness().await;
    let e1 = eq("E1");
    h.coordinator.join(&e1, &member("A"), None).await.unwrap();
    h.coordinator.join(&e1, &member("B"), None).await.unwrap();
    h.coordinator.on_resource_freed(&e1).await.unwrap();
    h.coordinator.leave(&e1, &member("A")).await.unwrap();

    let promoted = h.coordinator.on_resource_freed(&e1).await.unwrap().unwrap();
    assert_eq!(promoted.member_id, member("B"));
    assert_eq!(promoted.status, EntryStatus::Notified);
    assert_eq!(promoted.position, Some(1));
    assert_contiguous(&h.store, &e1).await;

    // The freed signal already consumed the hand-off.
    assert!(h.store.pending_handoffs().await.unwrap().is_empty());
    let report = h.coordinator.sweep_expired().await.unwrap();
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_rejoin_after_leave_goes_to_back() {
    let h = harness().await;
    let e1 = eq("E1");
    for m in ["A", "B", "C"] {
        h.coordinator.join(&e1, &member(m), None).await.unwrap();
    }
    h.coordinator.leave(&e1, &member("A")).await.unwrap();

    let again = h.coordinator.join(&e1, &member("A"), None).await.unwrap();
    assert_eq!(again.position, 3);
    assert_contiguous(&h.store, &e1).await;
}

// ============================================================================
// RESOURCE FREED
// ============================================================================

#[tokio::test]
async fn test_freed_is_idempotent_and_safe_on_empty_queue() {
    let h = harness().await;
    let e1 = eq("E1");

    assert!(h.coordinator.on_resource_freed(&e1).await.unwrap().is_none());

    h.coordinator.join(&e1, &member("A"), None).await.unwrap();
    h.coordinator.join(&e1, &member("B"), None).await.unwrap();
    assert!(h.coordinator.on_resource_freed(&e1).await.unwrap().is_some());
    assert!(h.coordinator.on_resource_freed(&e1).await.unwrap().is_none());

    let queue = h.coordinator.queue(&e1).await.unwrap();
    assert_eq!(queue.entries[0].status, EntryStatus::Notified);
    assert_eq!(queue.entries[1].status, EntryStatus::Waiting);
}

// ============================================================================
// SWEEP
// ============================================================================

#[tokio::test]
async fn test_sweep_expires_holder_and_promotes_next() {
    let h = harness().await;
    let e1 = eq("E1");
    h.coordinator.join(&e1, &member("A"), None).await.unwrap();
    h.coordinator.join(&e1, &member("B"), None).await.unwrap();
    let a = h.coordinator.on_resource_freed(&e1).await.unwrap().unwrap();

    h.clock.advance(TimeDelta::minutes(6));
    let report = h.coordinator.sweep_expired().await.unwrap();
    assert_eq!(report.expired, vec![a.id]);
    assert_eq!(report.promoted.len(), 1);

    let a = h.store.get(a.id).await.unwrap().unwrap();
    assert_eq!(a.status, EntryStatus::Expired);

    let view = h.coordinator.position(&e1, &member("B")).await.unwrap();
    assert_eq!(view.status, Some(EntryStatus::Notified));
    assert_eq!(
        view.expires_at,
        Some(h.clock_now() + TimeDelta::minutes(5))
    );
    assert_contiguous(&h.store, &e1).await;
}

#[tokio::test]
async fn test_sweep_leaves_live_windows_alone() {
    let h = harness().await;
    let e1 = eq("E1");
    h.coordinator.join(&e1, &member("A"), None).await.unwrap();
    h.coordinator.on_resource_freed(&e1).await.unwrap();

    h.clock.advance(TimeDelta::minutes(4));
    let report = h.coordinator.sweep_expired().await.unwrap();
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_sweep_with_no_one_waiting_just_expires() {
    let h = harness().await;
    let e1 = eq("E1");
    h.coordinator.join(&e1, &member("A"), None).await.unwrap();
    h.coordinator.on_resource_freed(&e1).await.unwrap();

    h.clock.advance(TimeDelta::hours(1));
    let report = h.coordinator.sweep_expired().await.unwrap();
    assert_eq!(report.expired.len(), 1);
    assert!(report.promoted.is_empty());
    assert_eq!(h.coordinator.queue(&e1).await.unwrap().total_in_queue, 0);

    // Re-joining after expiry is allowed.
    let again = h.coordinator.join(&e1, &member("A"), None).await.unwrap();
    assert_eq!(again.position, 1);
}

#[tokio::test]
async fn test_sweep_covers_every_equipment() {
    let h = harness().await;
    for id in ["E1", "E2", "E3"] {
        h.coordinator.join(&eq(id), &member("A"), None).await.unwrap();
        h.coordinator.join(&eq(id), &member("B"), None).await.unwrap();
        h.coordinator.on_resource_freed(&eq(id)).await.unwrap();
    }

    h.clock.advance(TimeDelta::minutes(10));
    let report = h.coordinator.sweep_expired().await.unwrap();
    assert_eq!(report.expired.len(), 3);
    assert_eq!(report.promoted.len(), 3);
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn test_slow_notices_do_not_shorten_later_claim_windows() {
    let clock = start_clock();
    let gateway = Arc::new(SlowGateway {
        clock: clock.clone(),
    });
    let h = harness_with_clock(gateway, QueueSettings::default(), clock).await;
    for id in ["E1", "E2", "E3"] {
        h.coordinator.join(&eq(id), &member("A"), None).await.unwrap();
        h.coordinator.join(&eq(id), &member("B"), None).await.unwrap();
        h.coordinator.on_resource_freed(&eq(id)).await.unwrap();
    }

    h.clock.advance(TimeDelta::minutes(10));
    let sweep_started = h.clock_now();
    let report = h.coordinator.sweep_expired().await.unwrap();
    assert_eq!(report.promoted.len(), 3);

    let mut notified_at = Vec::new();
    for id in &report.promoted {
        let entry = h.store.get(*id).await.unwrap().unwrap();
        let at = entry.notified_at.unwrap();
        assert_eq!(entry.expires_at, Some(at + TimeDelta::minutes(5)));
        notified_at.push(at);
    }
    assert_eq!(
        notified_at,
        vec![
            sweep_started,
            sweep_started + TimeDelta::seconds(30),
            sweep_started + TimeDelta::seconds(60),
        ]
    );
}

// ============================================================================
// NOTIFICATION FAILURES
// ============================================================================

#[tokio::test]
async fn test_failed_notice_keeps_promotion() {
    let h = harness_with(Arc::new(FailingGateway), QueueSettings::default()).await;
    let e1 = eq("E1");
    h.coordinator.join(&e1, &member("A"), None).await.unwrap();

    let promoted = h.coordinator.on_resource_freed(&e1).await.unwrap().unwrap();
    assert_eq!(promoted.status, EntryStatus::Notified);

    let history = h.coordinator.history(&e1, 10).await.unwrap();
    assert_eq!(history[0].event_type, EventType::NotificationFailed);
    assert!(history[0]
        .details
        .as_deref()
        .is_some_and(|d| d.contains("connection refused")));
    assert_eq!(history[1].event_type, EventType::Notified);
}

#[tokio::test]
async fn test_hanging_gateway_is_bounded_by_timeout() {
    let settings = QueueSettings {
        notify_timeout: Duration::from_millis(20),
        ..QueueSettings::default()
    };
    let h = harness_with(Arc::new(HangingGateway), settings).await;
    let e1 = eq("E1");
    h.coordinator.join(&e1, &member("A"), None).await.unwrap();

    let promoted = tokio::time::timeout(
        Duration::from_secs(5),
        h.coordinator.on_resource_freed(&e1),
    )
    .await
    .expect("dispatch must not hang")
    .unwrap();
    assert!(promoted.is_some());

    let history = h.coordinator.history(&e1, 1).await.unwrap();
    assert_eq!(history[0].event_type, EventType::NotificationFailed);
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test]
async fn test_concurrent_joins_get_distinct_positions() {
    let h = harness().await;
    let e1 = eq("E1");

    let joins = (0..20).map(|i| {
        let coordinator = h.coordinator.clone();
        let e1 = e1.clone();
        async move { coordinator.join(&e1, &member(&format!("m{i}")), None).await }
    });
    let results = futures::future::join_all(joins).await;

    let mut positions: Vec<u32> = results.into_iter().map(|r| r.unwrap().position).collect();
    positions.sort_unstable();
    assert_eq!(positions, (1..=20).collect::<Vec<_>>());
    assert_contiguous(&h.store, &e1).await;
}

#[tokio::test]
async fn test_concurrent_freed_signals_notify_once() {
    let h = harness().await;
    let e1 = eq("E1");
    for m in ["A", "B", "C"] {
        h.coordinator.join(&e1, &member(m), None).await.unwrap();
    }

    let signals = (0..10).map(|_| {
        let coordinator = h.coordinator.clone();
        let e1 = e1.clone();
        async move { coordinator.on_resource_freed(&e1).await }
    });
    let promoted = futures::future::join_all(signals)
        .await
        .into_iter()
        .filter_map(|r| r.unwrap())
        .count();
    assert_eq!(promoted, 1);
    assert_contiguous(&h.store, &e1).await;
}

#[tokio::test]
async fn test_concurrent_duplicate_joins_admit_one() {
    let h = harness().await;
    let e1 = eq("E1");

    let joins = (0..8).map(|_| {
        let coordinator = h.coordinator.clone();
        let e1 = e1.clone();
        async move { coordinator.join(&e1, &member("A"), None).await }
    });
    let results = futures::future::join_all(joins).await;

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let dupes = results
        .iter()
        .filter(|r| matches!(r, Err(Error::AlreadyQueued { .. })))
        .count();
    assert_eq!(ok, 1);
    assert_eq!(dupes, 7);
}
