//! Error types for waitlist-core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    ids::{EquipmentId, MemberId},
    status::TransitionError,
};

/// Core error type for waitlist operations
#[derive(Debug, Error)]
pub enum Error {
    /// Member already holds a waiting or notified entry for this equipment
    #[error("Member '{member_id}' is already queued for '{equipment_id}'")]
    AlreadyQueued {
        equipment_id: EquipmentId,
        member_id: MemberId,
    },

    /// Member has no active entry for this equipment
    #[error("Member '{member_id}' is not in the queue for '{equipment_id}'")]
    NotInQueue {
        equipment_id: EquipmentId,
        member_id: MemberId,
    },

    /// Member is waiting but has not been notified yet
    #[error("Not your turn yet: position {position} in the queue for '{equipment_id}'")]
    NotYourTurn {
        equipment_id: EquipmentId,
        position: u32,
    },

    /// Claim arrived after the claim deadline
    #[error("Claim window expired at {expires_at}")]
    ClaimWindowExpired { expires_at: DateTime<Utc> },

    /// Illegal state machine move
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// Notification transport failed (never fails a queue transition)
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed client request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Discriminator carried in API error payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    AlreadyQueued,
    NotInQueue,
    NotYourTurn,
    ClaimWindowExpired,
    InvalidTransition,
    DeliveryFailed,
    NotFound,
    InvalidRequest,
    Database,
    InvalidConfig,
}

impl Error {
    pub fn already_queued(equipment_id: &EquipmentId, member_id: &MemberId) -> Self {
        Self::AlreadyQueued {
            equipment_id: equipment_id.clone(),
            member_id: member_id.clone(),
        }
    }

    pub fn not_in_queue(equipment_id: &EquipmentId, member_id: &MemberId) -> Self {
        Self::NotInQueue {
            equipment_id: equipment_id.clone(),
            member_id: member_id.clone(),
        }
    }

    /// Create a database error with context
    pub fn database(context: &str, source: impl std::fmt::Display) -> Self {
        Self::Database(format!("{context}: {source}"))
    }

    /// Get the discriminator for this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyQueued { .. } => ErrorKind::AlreadyQueued,
            Self::NotInQueue { .. } => ErrorKind::NotInQueue,
            Self::NotYourTurn { .. } => ErrorKind::NotYourTurn,
            Self::ClaimWindowExpired { .. } => ErrorKind::ClaimWindowExpired,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
            Self::DeliveryFailed(_) => ErrorKind::DeliveryFailed,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Database(_) => ErrorKind::Database,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// Expected, client-facing conditions (as opposed to infrastructure faults)
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::InvalidConfig(_) | Self::DeliveryFailed(_)
        )
    }
}

/// Result type alias for waitlist-core operations
pub type Result<T> = std::result::Result<T, Error>;
