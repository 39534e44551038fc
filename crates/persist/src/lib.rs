//! Persistence: envelope codec, storage adapters, load/save with expiry.
//!
//! # Invariants
//! - Durability failures never propagate; in-memory state is authoritative.
//! - An expired envelope is treated as absent and its key is removed.
//! - The obfuscation applied by the codec is not encryption.

pub mod codec;
pub mod persistence;
pub mod storage;
pub mod store;

pub fn crate_info() -> &'static str {
    "strata-persist v0.1.0"
}

pub use codec::{CodecError, Envelope, decode, encode};
pub use persistence::Persistence;
pub use storage::{MemoryStorage, NoopStorage, StorageAdapter, StorageError};
pub use store::FileStorage;
