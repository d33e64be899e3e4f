//! Queue coordinator - waitlist business logic
//!
//! All mutations of one equipment's queue run inside that equipment's
//! critical section (`EquipmentLocks`). Notices are dispatched only after
//! the critical section is released.

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    clock::Clock,
    entry::{NewEntry, QueueEntry, StatusChange},
    events::{EventType, QueueEvent},
    ids::{EntryId, EquipmentId, MemberId},
    lock::EquipmentLocks,
    notify::{NotificationGateway, TurnNotice},
    query::{PositionView, QueueQuery, QueueView},
    settings::QueueSettings,
    status::EntryStatus,
    store::QueueStore,
    Error, Result,
};

/// Result of a successful join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOutcome {
    pub entry: QueueEntry,
    pub position: u32,
    pub total_in_queue: u32,
}

/// What a sweep pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Entries whose claim window lapsed
    pub expired: Vec<EntryId>,
    /// Entries promoted to notified
    pub promoted: Vec<EntryId>,
    /// Equipment whose sweep failed and will be retried next pass
    pub failed: Vec<EquipmentId>,
}

impl SweepReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.promoted.is_empty() && self.failed.is_empty()
    }
}

/// Waitlist state machine driver
#[derive(Debug, Clone)]
pub struct QueueCoordinator {
    store: Arc<dyn QueueStore>,
    gateway: Arc<dyn NotificationGateway>,
    clock: Arc<dyn Clock>,
    locks: EquipmentLocks,
    settings: QueueSettings,
    query: QueueQuery,
}

impl QueueCoordinator {
    #[must_use]
    pub fn new(
        store: Arc<dyn QueueStore>,
        gateway: Arc<dyn NotificationGateway>,
        clock: Arc<dyn Clock>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            query: QueueQuery::new(Arc::clone(&store)),
            store,
            gateway,
            clock,
            locks: EquipmentLocks::new(),
            settings,
        }
    }

    /// Add a member to the back of the equipment's queue.
    ///
    /// # Errors
    ///
    /// - `AlreadyQueued` if the member is already waiting or notified
    pub async fn join(
        &self,
        equipment_id: &EquipmentId,
        member_id: &MemberId,
        display_name: Option<&str>,
    ) -> Result<JoinOutcome> {
        let _guard = self.locks.acquire(equipment_id).await;

        if self
            .store
            .find_active_by_member(equipment_id, member_id)
            .await?
            .is_some()
        {
            return Err(Error::already_queued(equipment_id, member_id));
        }

        let entry = self
            .store
            .insert(NewEntry {
                equipment_id,
                member_id,
                display_name,
                joined_at: self.clock.now(),
            })
            .await?;

        // Appended under the lock, so the new entry is also the last one.
        let position = entry.position.unwrap_or_default();
        info!(
            equipment_id = %equipment_id,
            member_id = %member_id,
            entry_id = %entry.id,
            position,
            "Member joined queue"
        );

        Ok(JoinOutcome {
            entry,
            position,
            total_in_queue: position,
        })
    }

    /// Remove a member from the queue, whether waiting or notified.
    ///
    /// # Errors
    ///
    /// - `NotInQueue` if the member has no active entry
    pub async fn leave(
        &self,
        equipment_id: &EquipmentId,
        member_id: &MemberId,
    ) -> Result<QueueEntry> {
        let _guard = self.locks.acquire(equipment_id).await;

        let entry = self
            .store
            .find_active_by_member(equipment_id, member_id)
            .await?
            .ok_or_else(|| Error::not_in_queue(equipment_id, member_id))?;

        let left = self
            .store
            .update_status(
                entry.id,
                StatusChange::close(EntryStatus::Left, self.clock.now()),
            )
            .await?;

        info!(
            equipment_id = %equipment_id,
            member_id = %member_id,
            entry_id = %left.id,
            previous_status = %entry.status,
            "Member left queue"
        );
        Ok(left)
    }

    /// Handle an "equipment freed" signal.
    ///
    /// Promotes a waiting head of queue to notified and sends the turn
    /// notice. Returns `None` when the queue is empty or the head was already
    /// notified, so duplicate signals are harmless.
    pub async fn on_resource_freed(
        &self,
        equipment_id: &EquipmentId,
    ) -> Result<Option<QueueEntry>> {
        let promoted = {
            let _guard = self.locks.acquire(equipment_id).await;
            self.promote_head(equipment_id, self.clock.now()).await?
        };

        if let Some(entry) = &promoted {
            self.dispatch(entry).await;
        }
        Ok(promoted)
    }

    /// Take the equipment after being notified.
    ///
    /// # Errors
    ///
    /// - `NotInQueue` if the member has no active entry
    /// - `NotYourTurn` if the member is still waiting
    /// - `ClaimWindowExpired` if the deadline has passed, even before a sweep
    pub async fn claim(
        &self,
        equipment_id: &EquipmentId,
        member_id: &MemberId,
    ) -> Result<QueueEntry> {
        let _guard = self.locks.acquire(equipment_id).await;
        let now = self.clock.now();

        let entry = self
            .store
            .find_active_by_member(equipment_id, member_id)
            .await?
            .ok_or_else(|| Error::not_in_queue(equipment_id, member_id))?;

        if entry.status == EntryStatus::Waiting {
            return Err(Error::NotYourTurn {
                equipment_id: equipment_id.clone(),
                position: entry.position.unwrap_or_default(),
            });
        }

        if entry.is_claim_expired(now) {
            let expires_at = entry.expires_at.unwrap_or(now);
            warn!(
                equipment_id = %equipment_id,
                member_id = %member_id,
                entry_id = %entry.id,
                expires_at = %expires_at.to_rfc3339(),
                "Claim arrived after the claim window"
            );
            return Err(Error::ClaimWindowExpired { expires_at });
        }

        let claimed = self
            .store
            .update_status(entry.id, StatusChange::close(EntryStatus::Claimed, now))
            .await?;

        info!(
            equipment_id = %equipment_id,
            member_id = %member_id,
            entry_id = %claimed.id,
            "Member claimed equipment"
        );
        Ok(claimed)
    }

    /// Expire lapsed claim windows and hand the equipment to the next member.
    ///
    /// Also promotes equipment whose notified holder left. A failure on one
    /// equipment is logged and reported; the others are still swept.
    ///
    /// Each equipment reads the clock after taking its lock, so a slow
    /// notice for one item never shortens the claim window of the next.
    pub async fn sweep_expired(&self) -> Result<SweepReport> {
        let mut equipment: BTreeSet<EquipmentId> = self
            .store
            .list_expired(self.clock.now())
            .await?
            .into_iter()
            .map(|entry| entry.equipment_id)
            .collect();
        equipment.extend(self.store.pending_handoffs().await?);

        let mut report = SweepReport::default();
        for equipment_id in &equipment {
            match self.sweep_equipment(equipment_id, &mut report).await {
                Ok(Some(promoted)) => self.dispatch(&promoted).await,
                Ok(None) => {}
                Err(e) => {
                    error!(equipment_id = %equipment_id, error = %e, "Sweep failed for equipment");
                    report.failed.push(equipment_id.clone());
                }
            }
        }

        if !report.is_empty() {
            info!(
                expired = report.expired.len(),
                promoted = report.promoted.len(),
                failed = report.failed.len(),
                "Sweep finished"
            );
        }
        Ok(report)
    }

    /// Where the member stands in the equipment's queue
    pub async fn position(
        &self,
        equipment_id: &EquipmentId,
        member_id: &MemberId,
    ) -> Result<PositionView> {
        self.query.get_position(equipment_id, member_id).await
    }

    /// The equipment's active entries in queue order
    pub async fn queue(&self, equipment_id: &EquipmentId) -> Result<QueueView> {
        self.query.get_queue(equipment_id).await
    }

    /// Most recent audit events, newest first
    pub async fn history(
        &self,
        equipment_id: &EquipmentId,
        limit: u32,
    ) -> Result<Vec<QueueEvent>> {
        self.query.history(equipment_id, limit).await
    }

    async fn sweep_equipment(
        &self,
        equipment_id: &EquipmentId,
        report: &mut SweepReport,
    ) -> Result<Option<QueueEntry>> {
        let _guard = self.locks.acquire(equipment_id).await;
        let now = self.clock.now();

        loop {
            let active = self.store.list_active(equipment_id).await?;
            match active.first() {
                Some(head) if head.is_claim_expired(now) => {
                    self.store
                        .update_status(head.id, StatusChange::close(EntryStatus::Expired, now))
                        .await?;
                    info!(
                        equipment_id = %equipment_id,
                        member_id = %head.member_id,
                        entry_id = %head.id,
                        "Claim window expired"
                    );
                    report.expired.push(head.id);
                }
                Some(head) if head.status == EntryStatus::Notified => return Ok(None),
                Some(_) => {
                    let promoted = self.promote_head(equipment_id, now).await?;
                    report.promoted.extend(promoted.iter().map(|entry| entry.id));
                    return Ok(promoted);
                }
                None => {
                    self.store.clear_handoff(equipment_id).await?;
                    return Ok(None);
                }
            }
        }
    }

    /// Caller must hold the equipment's lock.
    async fn promote_head(
        &self,
        equipment_id: &EquipmentId,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueEntry>> {
        let active = self.store.list_active(equipment_id).await?;

        let Some(head) = active.first() else {
            self.store.clear_handoff(equipment_id).await?;
            debug!(equipment_id = %equipment_id, "Equipment freed with an empty queue");
            return Ok(None);
        };

        if head.status != EntryStatus::Waiting {
            debug!(
                equipment_id = %equipment_id,
                entry_id = %head.id,
                "Head of queue already notified"
            );
            return Ok(None);
        }

        let expires_at = now + self.settings.claim_window;
        let notified = self
            .store
            .update_status(head.id, StatusChange::notified(now, expires_at))
            .await?;

        info!(
            equipment_id = %equipment_id,
            member_id = %notified.member_id,
            entry_id = %notified.id,
            expires_at = %expires_at.to_rfc3339(),
            "Head of queue notified"
        );
        Ok(Some(notified))
    }

    /// Best-effort delivery; failures are logged and recorded, never returned.
    async fn dispatch(&self, entry: &QueueEntry) {
        let notice = match TurnNotice::for_entry(entry) {
            Ok(notice) => notice,
            Err(e) => {
                warn!(entry_id = %entry.id, error = %e, "Cannot build turn notice");
                return;
            }
        };

        let delivery =
            tokio::time::timeout(self.settings.notify_timeout, self.gateway.notify(&notice)).await;
        let outcome = delivery.unwrap_or_else(|_| {
            Err(Error::DeliveryFailed(format!(
                "timed out after {}ms",
                self.settings.notify_timeout.as_millis()
            )))
        });

        let Err(e) = outcome else {
            return;
        };

        warn!(
            equipment_id = %notice.equipment_id,
            member_id = %notice.member_id,
            entry_id = %notice.entry_id,
            error = %e,
            "Turn notice not delivered"
        );

        let event = QueueEvent::new(
            notice.equipment_id,
            notice.entry_id,
            notice.member_id,
            EventType::NotificationFailed,
            self.clock.now(),
        )
        .with_details(e.to_string());

        if let Err(record_err) = self.store.record_event(&event).await {
            error!(error = %record_err, "Failed to record delivery failure");
        }
    }
}
