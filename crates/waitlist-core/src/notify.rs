//! Turn notifications
//!
//! Delivery is best effort. Queue state is authoritative and clients poll
//! their position, so a failed notice never undoes a promotion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    entry::QueueEntry,
    ids::{EntryId, EquipmentId, MemberId},
    Error, Result,
};

/// "Your turn" notice sent to the head of a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnNotice {
    pub member_id: MemberId,
    pub equipment_id: EquipmentId,
    pub entry_id: EntryId,
    pub expires_at: DateTime<Utc>,
}

impl TurnNotice {
    /// Build a notice for a freshly notified entry
    pub fn for_entry(entry: &QueueEntry) -> Result<Self> {
        let expires_at = entry.expires_at.ok_or_else(|| {
            Error::InvalidRequest(format!("entry {} has no claim deadline", entry.id))
        })?;
        Ok(Self {
            member_id: entry.member_id.clone(),
            equipment_id: entry.equipment_id.clone(),
            entry_id: entry.id,
            expires_at,
        })
    }
}

/// Outbound channel for turn notices.
///
/// Implementations return `Error::DeliveryFailed` on transport errors.
#[async_trait::async_trait]
pub trait NotificationGateway: Send + Sync + std::fmt::Debug {
    async fn notify(&self, notice: &TurnNotice) -> Result<()>;
}

/// Gateway that only logs the notice
#[derive(Debug, Clone, Copy, Default)]
pub struct LogGateway;

#[async_trait::async_trait]
impl NotificationGateway for LogGateway {
    async fn notify(&self, notice: &TurnNotice) -> Result<()> {
        tracing::info!(
            member_id = %notice.member_id,
            equipment_id = %notice.equipment_id,
            entry_id = %notice.entry_id,
            expires_at = %notice.expires_at.to_rfc3339(),
            "Equipment is free for member"
        );
        Ok(())
    }
}
