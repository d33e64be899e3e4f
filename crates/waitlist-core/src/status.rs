//! Entry Status State Machine (Pure Domain Logic)
//!
//! Pure transition validation for waitlist entries. No DB, no async.
//!
//! # State Machine
//!
//! ```text
//! waiting --(head of queue, equipment freed)--> notified
//! waiting --(member leaves)-------------------> left
//! notified --(claimed before expires_at)------> claimed
//! notified --(expires_at elapsed)-------------> expired
//! notified --(member leaves)------------------> left
//! ```
//!
//! Terminal states: `claimed`, `expired`, `left`

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Error;

/// Error type for invalid entry state transitions.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid state transition: cannot transition from {from} to {to}")]
pub struct TransitionError {
    pub from: EntryStatus,
    pub to: EntryStatus,
}

/// Lifecycle state of a queue entry.
///
/// Valid transitions:
/// - waiting -> notified
/// - waiting -> left
/// - notified -> claimed
/// - notified -> expired
/// - notified -> left
///
/// Terminal states (no outgoing transitions): claimed, expired, left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    /// Queued, not yet at the front or equipment not yet free.
    Waiting,
    /// Told the equipment is free; must claim before the deadline.
    Notified,
    /// Member took the equipment in time.
    Claimed,
    /// Claim window lapsed.
    Expired,
    /// Member left the queue voluntarily.
    Left,
}

impl EntryStatus {
    /// Returns the string representation stored in the database.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Notified => "notified",
            Self::Claimed => "claimed",
            Self::Expired => "expired",
            Self::Left => "left",
        }
    }

    /// Returns true if this status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Claimed | Self::Expired | Self::Left)
    }

    /// Returns true if entries in this status count toward queue positions.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Waiting | Self::Notified)
    }

    /// Returns true if a transition from `self` to `target` is valid.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        self.validate_transition(target).is_ok()
    }

    /// Validates that a transition from `self` to `target` is allowed.
    ///
    /// Staying in the same state is not a transition and is rejected.
    pub fn validate_transition(&self, target: Self) -> std::result::Result<(), TransitionError> {
        let is_valid = match self {
            Self::Waiting => matches!(target, Self::Notified | Self::Left),
            Self::Notified => matches!(target, Self::Claimed | Self::Expired | Self::Left),
            Self::Claimed | Self::Expired | Self::Left => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError {
                from: *self,
                to: target,
            })
        }
    }

    /// Returns all statuses.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Waiting,
            Self::Notified,
            Self::Claimed,
            Self::Expired,
            Self::Left,
        ]
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "notified" => Ok(Self::Notified),
            "claimed" => Ok(Self::Claimed),
            "expired" => Ok(Self::Expired),
            "left" => Ok(Self::Left),
            _ => Err(Error::Database(format!("Invalid entry status: {s}"))),
        }
    }
}

impl TryFrom<String> for EntryStatus {
    type Error = Error;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}
