//! # tabpulse-presence
//!
//! Presence engine for tabpulse: tracks which tabs a user has open across
//! devices and how recently each was used, classifying every tab as
//! `Active`, `Idle`, or `Stale` without visible flicker.
//!
//! ## Design principles
//!
//! - **Synchronous**: no async runtime; two plain threads per session.
//! - **Self-correcting**: state is recomputed from absolute elapsed time on
//!   every heartbeat, so missed ticks cannot desynchronize it.
//! - **Graceful degradation**: failed writes drop and heal on the next
//!   tick; failed reads keep the previous registry view; unavailable
//!   identity slots degrade to ephemeral ids.
//! - **Owned, not ambient**: timers and activity state live in a
//!   [`PresenceSession`] constructed per signed-in user and torn down on
//!   sign-out.

pub mod activity;
pub mod classify;
pub mod error;
pub mod identity;
pub mod registry;
pub mod session;
pub mod store;
pub mod sync;

pub use activity::{ActivityMonitor, ActivitySnapshot, InteractionKind};
pub use classify::{classify, classify_last_seen, IDLE_THRESHOLD_SECS, STALE_THRESHOLD_SECS};
pub use error::{PresenceError, Result};
pub use identity::{FileSlot, IdentitySlot, IdentityStore, SessionSlot};
pub use registry::{group_by_device, DeviceGroup, Registry, RegistryEntry, RegistryView};
pub use session::{PresenceSession, SessionConfig, HEARTBEAT_INTERVAL, REGISTRY_POLL_INTERVAL};
pub use store::{MemoryStore, PresenceStore, SqliteStore};
pub use sync::RemoteSynchronizer;

pub use tabpulse_protocol::{PresenceRecord, PresenceState};
