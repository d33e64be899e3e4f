//! Read-only queue projections
//!
//! Nothing here mutates state, so clients may poll freely.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    entry::QueueEntry,
    events::QueueEvent,
    ids::{EntryId, EquipmentId, MemberId},
    status::EntryStatus,
    store::QueueStore,
    Result,
};

/// A member's standing in one equipment queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionView {
    pub in_queue: bool,
    pub position: Option<u32>,
    pub total_in_queue: u32,
    pub status: Option<EntryStatus>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// One row of a queue listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueViewEntry {
    pub entry_id: EntryId,
    pub member_id: MemberId,
    pub display_name: Option<String>,
    pub position: u32,
    pub status: EntryStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Ordered listing of an equipment's active entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueView {
    pub equipment_id: EquipmentId,
    pub total_in_queue: u32,
    pub entries: Vec<QueueViewEntry>,
}

/// Read side of the waitlist
#[derive(Debug, Clone)]
pub struct QueueQuery {
    store: Arc<dyn QueueStore>,
}

impl QueueQuery {
    #[must_use]
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Where the member stands in the equipment's queue
    pub async fn get_position(
        &self,
        equipment_id: &EquipmentId,
        member_id: &MemberId,
    ) -> Result<PositionView> {
        let active = self.store.list_active(equipment_id).await?;
        let total_in_queue = count(&active);

        let view = match active.iter().find(|e| &e.member_id == member_id) {
            Some(entry) => PositionView {
                in_queue: true,
                position: entry.position,
                total_in_queue,
                status: Some(entry.status),
                expires_at: entry.expires_at,
            },
            None => PositionView {
                in_queue: false,
                position: None,
                total_in_queue,
                status: None,
                expires_at: None,
            },
        };
        Ok(view)
    }

    /// The equipment's active entries in queue order
    pub async fn get_queue(&self, equipment_id: &EquipmentId) -> Result<QueueView> {
        let active = self.store.list_active(equipment_id).await?;
        let total_in_queue = count(&active);

        let entries = active
            .into_iter()
            .map(|e| QueueViewEntry {
                entry_id: e.id,
                member_id: e.member_id,
                display_name: e.display_name,
                position: e.position.unwrap_or_default(),
                status: e.status,
                expires_at: e.expires_at,
            })
            .collect();

        Ok(QueueView {
            equipment_id: equipment_id.clone(),
            total_in_queue,
            entries,
        })
    }

    /// Most recent audit events, newest first
    pub async fn history(&self, equipment_id: &EquipmentId, limit: u32) -> Result<Vec<QueueEvent>> {
        self.store.list_events(equipment_id, limit).await
    }
}

fn count(entries: &[QueueEntry]) -> u32 {
    u32::try_from(entries.len()).unwrap_or(u32::MAX)
}
