//! Queue entry types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ids::{EntryId, EquipmentId, MemberId},
    status::EntryStatus,
    Error, Result,
};

/// A member's place in an equipment waitlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique identifier
    pub id: EntryId,
    /// Equipment being queued for
    pub equipment_id: EquipmentId,
    /// Queued member
    pub member_id: MemberId,
    /// Name shown in queue listings
    pub display_name: Option<String>,
    /// 1-based rank among active entries; `None` once terminal
    pub position: Option<u32>,
    /// Current status
    pub status: EntryStatus,
    /// When the member joined
    pub joined_at: DateTime<Utc>,
    /// When the member was told the equipment is free
    pub notified_at: Option<DateTime<Utc>>,
    /// Claim deadline, only while notified
    pub expires_at: Option<DateTime<Utc>>,
    /// When the entry reached a terminal state
    pub closed_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Check whether the claim window has lapsed at `now`
    #[must_use]
    pub fn is_claim_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Notified && self.expires_at.is_some_and(|at| now > at)
    }
}

/// Data needed to enqueue a member
#[derive(Debug, Clone, Copy)]
pub struct NewEntry<'a> {
    pub equipment_id: &'a EquipmentId,
    pub member_id: &'a MemberId,
    pub display_name: Option<&'a str>,
    pub joined_at: DateTime<Utc>,
}

/// Timestamps applied together with a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    /// Target status
    pub to: EntryStatus,
    /// When the change happens
    pub at: DateTime<Utc>,
    /// Claim deadline, required when moving to notified
    pub expires_at: Option<DateTime<Utc>>,
}

impl StatusChange {
    /// Promote to notified with a claim deadline
    #[must_use]
    pub const fn notified(at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            to: EntryStatus::Notified,
            at,
            expires_at: Some(expires_at),
        }
    }

    /// Move to a terminal state
    #[must_use]
    pub const fn close(to: EntryStatus, at: DateTime<Utc>) -> Self {
        Self {
            to,
            at,
            expires_at: None,
        }
    }
}

/// A row in the `queue_entries` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct QueueEntryRow {
    pub id: i64,
    pub equipment_id: String,
    pub member_id: String,
    pub display_name: Option<String>,
    pub position: Option<i64>,
    #[sqlx(try_from = "String")]
    pub status: EntryStatus,
    pub joined_at: i64,
    pub notified_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub closed_at: Option<i64>,
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::Database(format!("Timestamp out of range: {ms}")))
}

fn from_optional_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

impl TryFrom<QueueEntryRow> for QueueEntry {
    type Error = Error;

    fn try_from(row: QueueEntryRow) -> Result<Self> {
        let position = row
            .position
            .map(|p| {
                u32::try_from(p).map_err(|_| Error::Database(format!("Invalid position: {p}")))
            })
            .transpose()?;

        Ok(Self {
            id: EntryId::new(row.id),
            equipment_id: EquipmentId::new(row.equipment_id),
            member_id: MemberId::new(row.member_id),
            display_name: row.display_name,
            position,
            status: row.status,
            joined_at: from_millis(row.joined_at)?,
            notified_at: from_optional_millis(row.notified_at)?,
            expires_at: from_optional_millis(row.expires_at)?,
            closed_at: from_optional_millis(row.closed_at)?,
        })
    }
}
