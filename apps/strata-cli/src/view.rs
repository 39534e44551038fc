use strata_common::Snapshot;
use strata_kernel::BoxError;
use strata_tools::{ActionLogEntry, ClipboardSink, DiffEntry, InspectorView};

/// Inspector view that prints to stdout.
pub struct PrintView;

impl InspectorView for PrintView {
    fn render_state(&self, state: &Snapshot) {
        println!("  state: {state}");
    }

    fn render_diff(&self, diff: &[DiffEntry]) {
        for entry in diff {
            println!("  diff: {entry}");
        }
    }

    fn render_log(&self, log: &[ActionLogEntry]) {
        if let Some(last) = log.last() {
            println!("  log[{}]: {}", log.len(), last.record);
        }
    }

    fn render_position(&self, pointer: usize, len: usize) {
        println!("  history: {}/{len}", pointer + 1);
    }

    fn set_visible(&self, visible: bool) {
        println!("  panel {}", if visible { "opened" } else { "closed" });
    }

    fn detach(&self) {
        println!("  inspector detached");
    }
}

/// The system clipboard.
pub struct SystemClipboard;

impl ClipboardSink for SystemClipboard {
    fn set_text(&self, text: String) -> Result<(), BoxError> {
        let mut clipboard = arboard::Clipboard::new()?;
        clipboard.set_text(text)?;
        Ok(())
    }
}
