//! State Kernel: the authoritative snapshot, mutation, change notification,
//! and the action/effect binder.
//!
//! # Invariants
//! - All state mutations flow through explicit operations.
//! - Every mutation persists (when configured) before subscribers are notified.
//! - Subscribers only ever see independent copies of the state.

pub mod binder;
pub mod error;
pub mod options;
pub mod store;

pub fn crate_info() -> &'static str {
    "strata-kernel v0.1.0"
}

pub use binder::{
    ActionFn, ActionKind, ActionRecord, BoundAction, BoundEffect, BoxError, EffectContext,
    EffectFn,
};
pub use error::StoreError;
pub use options::{EffectMode, StoreBuilder, StoreOptions};
pub use store::{FieldUpdate, Store, Subscription};
