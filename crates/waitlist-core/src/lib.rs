//! Waitlist-core - Equipment queue types and coordination logic
//!
//! This crate provides:
//! - Queue entry types and the entry status state machine
//! - The `QueueStore` persistence boundary and its `SQLite` implementation
//! - The `QueueCoordinator` (join, leave, claim, promotion, expiry sweep)
//! - Read-only queue projections
//! - The notification gateway boundary

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod coordinator;
pub mod entry;
pub mod error;
pub mod events;
pub mod ids;
pub mod lock;
pub mod notify;
pub mod query;
pub mod settings;
pub mod status;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{JoinOutcome, QueueCoordinator, SweepReport};
pub use entry::{NewEntry, QueueEntry, StatusChange};
pub use error::{Error, ErrorKind, Result};
pub use events::{EventType, QueueEvent};
pub use ids::{EntryId, EquipmentId, MemberId};
pub use lock::{EquipmentGuard, EquipmentLocks};
pub use notify::{LogGateway, NotificationGateway, TurnNotice};
pub use query::{PositionView, QueueQuery, QueueView, QueueViewEntry};
pub use settings::QueueSettings;
pub use status::{EntryStatus, TransitionError};
pub use store::{QueueStore, SqliteQueueStore};
