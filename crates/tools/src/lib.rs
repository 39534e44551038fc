//! Developer tooling: state inspector, bounded history with time travel,
//! structural diff, state search.
//!
//! # Invariants
//! - History length never exceeds its configured maximum.
//! - Recording after a time-travel step discards the entries after the pointer.
//! - Replaying history never grows it.
//! - Nothing here renders; views observe through [`InspectorView`].

pub mod config;
pub mod diff;
pub mod history;
pub mod inspector;
pub mod search;
pub mod view;

pub fn crate_info() -> &'static str {
    "strata-tools v0.1.0"
}

pub use config::{ConfigError, InspectorConfig, KeyChord};
pub use diff::{ChangeKind, DiffEntry, diff};
pub use history::{Direction, History, HistoryEntry};
pub use inspector::{ActionLogEntry, ExportError, Inspector, LogFilter, instrument};
pub use search::{SearchHit, search};
pub use view::{ClipboardSink, InspectorView, NullView};
