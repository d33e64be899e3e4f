//! Queue Store Trait - Abstraction boundary for queue persistence.
//!
//! The coordinator only talks to storage through `QueueStore`, so the
//! backend can be swapped without touching queue semantics.
//! `SqliteQueueStore` is the shipped implementation.

mod sqlite;

use chrono::{DateTime, Utc};

pub use sqlite::SqliteQueueStore;

use crate::{
    entry::{NewEntry, QueueEntry, StatusChange},
    events::QueueEvent,
    ids::{EntryId, EquipmentId, MemberId},
    Result,
};

/// Persistence boundary for equipment waitlists.
///
/// Every mutating method is atomic: it either applies completely,
/// including position recomputation and its audit event, or not at all.
#[async_trait::async_trait]
pub trait QueueStore: Send + Sync + std::fmt::Debug {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // ENTRY OPERATIONS
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Append a waiting entry at the back of the equipment's queue.
    ///
    /// Fails with `AlreadyQueued` if the member already has an active entry.
    async fn insert(&self, new: NewEntry<'_>) -> Result<QueueEntry>;

    /// Get an entry by id, whatever its status.
    async fn get(&self, id: EntryId) -> Result<Option<QueueEntry>>;

    /// Active (waiting or notified) entries, oldest join first.
    async fn list_active(&self, equipment_id: &EquipmentId) -> Result<Vec<QueueEntry>>;

    /// The member's active entry for this equipment, if any.
    async fn find_active_by_member(
        &self,
        equipment_id: &EquipmentId,
        member_id: &MemberId,
    ) -> Result<Option<QueueEntry>>;

    /// Apply a state machine transition.
    ///
    /// Fails with `InvalidTransition` for illegal moves and `NotFound` for
    /// unknown ids. Terminal transitions close the gap in positions.
    async fn update_status(&self, id: EntryId, change: StatusChange) -> Result<QueueEntry>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // SWEEP SUPPORT
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Notified entries whose claim deadline is before `now`.
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<QueueEntry>>;

    /// Equipment whose notified holder left while the equipment stayed free.
    async fn pending_handoffs(&self) -> Result<Vec<EquipmentId>>;

    /// Forget a pending hand-off.
    async fn clear_handoff(&self, equipment_id: &EquipmentId) -> Result<()>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // AUDIT TRAIL
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Append an event that is not part of a status change.
    async fn record_event(&self, event: &QueueEvent) -> Result<QueueEvent>;

    /// Most recent events for an equipment, newest first.
    async fn list_events(&self, equipment_id: &EquipmentId, limit: u32)
        -> Result<Vec<QueueEvent>>;
}
