use crate::diff::DiffEntry;
use crate::inspector::ActionLogEntry;
use strata_common::Snapshot;
use strata_kernel::BoxError;

/// Rendering surface for an inspector.
///
/// The inspector calls these after its own bookkeeping is done and its
/// locks are released. Every method defaults to doing nothing.
pub trait InspectorView: Send + Sync {
    fn render_state(&self, _state: &Snapshot) {}
    fn render_diff(&self, _diff: &[DiffEntry]) {}
    fn render_log(&self, _log: &[ActionLogEntry]) {}
    /// `pointer` is zero-based; `len` is the history length.
    fn render_position(&self, _pointer: usize, _len: usize) {}
    fn set_visible(&self, _visible: bool) {}
    fn set_pinned(&self, _pinned: bool) {}
    /// Release rendering resources. Called once by `Inspector::destroy`.
    fn detach(&self) {}
}

/// A view that renders nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullView;

impl InspectorView for NullView {}

/// Destination for `Inspector::copy_state`.
pub trait ClipboardSink {
    fn set_text(&self, text: String) -> Result<(), BoxError>;
}
