//! Audit events for queue entries

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    entry::from_millis,
    ids::{EntryId, EquipmentId, MemberId},
    status::EntryStatus,
    Error, Result,
};

/// Event types in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Member joined the queue
    Joined,
    /// Head of queue told the equipment is free
    Notified,
    /// Member claimed the equipment
    Claimed,
    /// Claim window lapsed
    Expired,
    /// Member left the queue
    Left,
    /// Turn notice could not be delivered
    NotificationFailed,
}

impl EventType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Joined => "joined",
            Self::Notified => "notified",
            Self::Claimed => "claimed",
            Self::Expired => "expired",
            Self::Left => "left",
            Self::NotificationFailed => "notification_failed",
        }
    }

    /// The event recorded when an entry enters `status`
    #[must_use]
    pub const fn for_status(status: EntryStatus) -> Self {
        match status {
            EntryStatus::Waiting => Self::Joined,
            EntryStatus::Notified => Self::Notified,
            EntryStatus::Claimed => Self::Claimed,
            EntryStatus::Expired => Self::Expired,
            EntryStatus::Left => Self::Left,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "joined" => Ok(Self::Joined),
            "notified" => Ok(Self::Notified),
            "claimed" => Ok(Self::Claimed),
            "expired" => Ok(Self::Expired),
            "left" => Ok(Self::Left),
            "notification_failed" => Ok(Self::NotificationFailed),
            _ => Err(Error::Database(format!("Invalid event type: {s}"))),
        }
    }
}

impl TryFrom<String> for EventType {
    type Error = Error;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// An entry in the queue audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEvent {
    /// Store-assigned event id (0 until recorded)
    pub id: i64,
    pub equipment_id: EquipmentId,
    pub entry_id: EntryId,
    pub member_id: MemberId,
    pub event_type: EventType,
    /// Free-form detail, e.g. a delivery error
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueueEvent {
    /// Create a new, unrecorded event
    #[must_use]
    pub fn new(
        equipment_id: EquipmentId,
        entry_id: EntryId,
        member_id: MemberId,
        event_type: EventType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            equipment_id,
            entry_id,
            member_id,
            event_type,
            details: None,
            created_at,
        }
    }

    /// Attach details to this event
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// A row in the `queue_events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct QueueEventRow {
    pub id: i64,
    pub equipment_id: String,
    pub entry_id: i64,
    pub member_id: String,
    #[sqlx(try_from = "String")]
    pub event_type: EventType,
    pub details: Option<String>,
    pub created_at: i64,
}

impl TryFrom<QueueEventRow> for QueueEvent {
    type Error = Error;

    fn try_from(row: QueueEventRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            equipment_id: EquipmentId::new(row.equipment_id),
            entry_id: EntryId::new(row.entry_id),
            member_id: MemberId::new(row.member_id),
            event_type: row.event_type,
            details: row.details,
            created_at: from_millis(row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_display_matches_serde() -> std::result::Result<(), serde_json::Error> {
        let json = serde_json::to_string(&EventType::NotificationFailed)?;
        assert_eq!(json.trim_matches('"'), EventType::NotificationFailed.to_string());
        Ok(())
    }

    #[test]
    fn test_every_status_has_an_event() {
        for status in EntryStatus::all() {
            let event = EventType::for_status(*status);
            assert_eq!(event.as_str().parse::<EventType>().ok(), Some(event));
        }
    }
}
