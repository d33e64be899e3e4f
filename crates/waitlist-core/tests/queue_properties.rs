//! Property-based tests for queue invariants using proptest.
//!
//! # Invariants tested:
//! - Active positions always form 1..N with no gaps or duplicates
//! - At most one entry per equipment is notified
//! - A member never holds two active entries for the same equipment
//!
//! Reproducible: set `PROPTEST_SEED` for deterministic runs

// Integration tests have relaxed clippy settings for test ergonomics.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::doc_markdown,
    clippy::missing_panics_doc
)]

use std::{collections::HashSet, sync::Arc};

use chrono::{TimeDelta, TimeZone, Utc};
use proptest::prelude::*;
use waitlist_core::{
    EntryStatus, EquipmentId, Error, LogGateway, ManualClock, MemberId, QueueCoordinator,
    QueueSettings, QueueStore, SqliteQueueStore,
};

// ═══════════════════════════════════════════════════════════════════════════
// OPERATION STRATEGY
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum Op {
    Join { equipment: u8, member: u8 },
    Leave { equipment: u8, member: u8 },
    Claim { equipment: u8, member: u8 },
    Freed { equipment: u8 },
    Tick { minutes: i64 },
    Sweep,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..2u8, 0..5u8).prop_map(|(equipment, member)| Op::Join { equipment, member }),
        2 => (0..2u8, 0..5u8).prop_map(|(equipment, member)| Op::Leave { equipment, member }),
        2 => (0..2u8, 0..5u8).prop_map(|(equipment, member)| Op::Claim { equipment, member }),
        2 => (0..2u8).prop_map(|equipment| Op::Freed { equipment }),
        1 => (1..8i64).prop_map(|minutes| Op::Tick { minutes }),
        1 => Just(Op::Sweep),
    ]
}

fn equipment(n: u8) -> EquipmentId {
    EquipmentId::new(format!("E{n}"))
}

fn member(n: u8) -> MemberId {
    MemberId::new(format!("m{n}"))
}

/// Only the expected client errors may surface.
fn check_outcome<T>(result: waitlist_core::Result<T>) -> Result<(), TestCaseError> {
    match result {
        Ok(_)
        | Err(
            Error::AlreadyQueued { .. }
            | Error::NotInQueue { .. }
            | Error::NotYourTurn { .. }
            | Error::ClaimWindowExpired { .. },
        ) => Ok(()),
        Err(e) => Err(TestCaseError::fail(format!("unexpected error: {e}"))),
    }
}

async fn check_invariants(store: &SqliteQueueStore) -> Result<(), TestCaseError> {
    for n in 0..2u8 {
        let active = store.list_active(&equipment(n)).await.unwrap();

        let positions: Vec<u32> = active.iter().filter_map(|e| e.position).collect();
        let expected: Vec<u32> = (1..=u32::try_from(active.len()).unwrap()).collect();
        prop_assert_eq!(positions, expected);

        let notified = active
            .iter()
            .filter(|e| e.status == EntryStatus::Notified)
            .count();
        prop_assert!(notified <= 1);

        let members: HashSet<&MemberId> = active.iter().map(|e| &e.member_id).collect();
        prop_assert_eq!(members.len(), active.len());
    }
    Ok(())
}

async fn run(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let store = Arc::new(SqliteQueueStore::open_in_memory().await.unwrap());
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    let coordinator = QueueCoordinator::new(
        store.clone(),
        Arc::new(LogGateway),
        Arc::new(clock.clone()),
        QueueSettings::default(),
    );

    for op in ops {
        match op {
            Op::Join { equipment: e, member: m } => {
                check_outcome(coordinator.join(&equipment(e), &member(m), None).await)?;
            }
            Op::Leave { equipment: e, member: m } => {
                check_outcome(coordinator.leave(&equipment(e), &member(m)).await)?;
            }
            Op::Claim { equipment: e, member: m } => {
                check_outcome(coordinator.claim(&equipment(e), &member(m)).await)?;
            }
            Op::Freed { equipment: e } => {
                check_outcome(coordinator.on_resource_freed(&equipment(e)).await)?;
            }
            Op::Tick { minutes } => clock.advance(TimeDelta::minutes(minutes)),
            Op::Sweep => {
                let report = coordinator.sweep_expired().await.unwrap();
                prop_assert!(report.failed.is_empty());
            }
        }
        check_invariants(&store).await?;
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_queue_invariants_hold(ops in prop::collection::vec(op_strategy(), 1..40)) {
        tokio_test::block_on(run(ops))?;
    }
}
