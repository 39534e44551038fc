//! Shared types for the strata workspace.
//!
//! # Invariants
//! - A `Snapshot` is an ordered mapping; iteration follows insertion order.
//! - Every copy handed out of the container is an independent clone.

pub mod clock;
pub mod types;

pub fn crate_info() -> &'static str {
    "strata-common v0.1.0"
}

pub use clock::{Clock, ManualClock, SystemClock};
pub use types::{Snapshot, SnapshotError, SubscriberId, value_kind};

/// Re-exported so downstream crates agree on one value type.
pub use serde_json::{Map, Value, json};
