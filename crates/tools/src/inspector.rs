use crate::config::{InspectorConfig, KeyChord};
use crate::diff::DiffEntry;
use crate::history::{Direction, History, HistoryEntry};
use crate::search::{SearchHit, search};
use crate::view::{ClipboardSink, InspectorView};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_common::{Clock, Snapshot, SystemClock};
use strata_kernel::{ActionRecord, BoxError, Store, Subscription};

/// Errors writing an exported state file. Logged, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One action or effect seen by the inspector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionLogEntry {
    pub record: ActionRecord,
    pub timestamp_ms: u64,
}

/// Which action log entries to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFilter {
    #[default]
    All,
    Actions,
    Effects,
}

impl LogFilter {
    pub fn admits(&self, record: &ActionRecord) -> bool {
        match self {
            Self::All => true,
            Self::Actions => !record.is_effect(),
            Self::Effects => record.is_effect(),
        }
    }
}

struct InspectorState {
    history: History,
    log: VecDeque<ActionLogEntry>,
    filter: LogFilter,
    /// The snapshot a time-travel write is pushing into the store. Its own
    /// notification is skipped once; any other change made while it is in
    /// flight is recorded as usual.
    replaying: Option<Snapshot>,
    open: bool,
    pinned: bool,
}

impl InspectorState {
    fn filtered_log(&self) -> Vec<ActionLogEntry> {
        self.log
            .iter()
            .filter(|entry| self.filter.admits(&entry.record))
            .cloned()
            .collect()
    }
}

struct Shared {
    state: Mutex<InspectorState>,
    view: Arc<dyn InspectorView>,
    clock: Arc<dyn Clock>,
    log_actions: bool,
    log_capacity: usize,
}

impl Shared {
    fn on_change(&self, snapshot: Snapshot, cause: Option<&ActionRecord>) {
        let (pointer, len, log) = {
            let mut state = self.state.lock();
            let mut log = None;
            let replayed = state
                .replaying
                .take_if(|target| *target == snapshot)
                .is_some();
            if !replayed {
                state.history.record(snapshot.clone(), cause.cloned());
                if let Some(record) = cause.filter(|_| self.log_actions) {
                    state.log.push_back(ActionLogEntry {
                        record: record.clone(),
                        timestamp_ms: self.clock.now_millis(),
                    });
                    if state.log.len() > self.log_capacity {
                        state.log.pop_front();
                    }
                    log = Some(state.filtered_log());
                }
            }
            (state.history.pointer(), state.history.len(), log)
        };

        self.view.render_state(&snapshot);
        self.view.render_position(pointer, len);
        if let Some(log) = log {
            self.view.render_log(&log);
        }
    }
}

/// Records a store's history and replays it on request.
///
/// Attaching subscribes to the store; the subscription's immediate first
/// call seeds the history with the current state. Note that `Store::clear`
/// drops every subscriber, this one included.
pub struct Inspector {
    store: Store,
    config: InspectorConfig,
    shared: Arc<Shared>,
    subscription: Mutex<Option<Subscription>>,
}

impl Inspector {
    pub fn attach(store: &Store, config: InspectorConfig, view: Arc<dyn InspectorView>) -> Self {
        Self::attach_with_clock(store, config, view, Arc::new(SystemClock))
    }

    /// Attach using `clock` for log timestamps and export file names.
    pub fn attach_with_clock(
        store: &Store,
        config: InspectorConfig,
        view: Arc<dyn InspectorView>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(InspectorState {
                history: History::new(config.max_history),
                log: VecDeque::new(),
                filter: LogFilter::All,
                replaying: None,
                open: false,
                pinned: false,
            }),
            view,
            clock,
            log_actions: config.log_actions,
            log_capacity: config.max_history.max(1),
        });

        let listener = shared.clone();
        let subscription =
            store.subscribe_changes(move |snapshot, cause| listener.on_change(snapshot, cause));
        tracing::debug!(name = %config.name, max_history = config.max_history, "inspector attached");

        Self {
            store: store.clone(),
            config,
            shared,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    pub fn config(&self) -> &InspectorConfig {
        &self.config
    }

    /// Step through history and write the selected snapshot back into the
    /// store. Returns false when already at that end of the history.
    ///
    /// Only the replayed snapshot itself is kept out of the history. If
    /// another subscriber reacts to it by writing to the store, that write is
    /// recorded like any other change and discards the entries after the
    /// pointer, so the entry under the pointer keeps matching the store.
    pub fn time_travel(&self, direction: Direction) -> bool {
        let target = {
            let mut state = self.shared.state.lock();
            let Some(snapshot) = state.history.step(direction).cloned() else {
                return false;
            };
            state.replaying = Some(snapshot.clone());
            snapshot
        };

        tracing::debug!(?direction, "time travel");
        self.store.replace(target);

        let (pointer, len, diff) = {
            let mut state = self.shared.state.lock();
            state.replaying = None;
            (
                state.history.pointer(),
                state.history.len(),
                state.history.diff_at_pointer(),
            )
        };
        self.shared.view.render_diff(&diff);
        self.shared.view.render_position(pointer, len);
        true
    }

    /// Reset history to the current live state and empty the action log.
    pub fn clear_history(&self) {
        let current = self.store.get();
        {
            let mut state = self.shared.state.lock();
            state.history.reset(current.clone());
            state.log.clear();
        }
        let view = &self.shared.view;
        view.render_state(&current);
        view.render_position(0, 1);
        view.render_log(&[]);
        view.render_diff(&[]);
    }

    /// Changes introduced by the entry under the pointer.
    pub fn diff(&self) -> Vec<DiffEntry> {
        self.shared.state.lock().history.diff_at_pointer()
    }

    /// Search the live state.
    pub fn search(&self, term: &str) -> Vec<SearchHit> {
        search(&self.store.get(), term)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.shared.state.lock().history.entries().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.shared.state.lock().history.len()
    }

    pub fn pointer(&self) -> usize {
        self.shared.state.lock().history.pointer()
    }

    pub fn can_step(&self, direction: Direction) -> bool {
        self.shared.state.lock().history.can_step(direction)
    }

    /// Action log entries admitted by the current filter, oldest first.
    pub fn action_log(&self) -> Vec<ActionLogEntry> {
        self.shared.state.lock().filtered_log()
    }

    pub fn set_log_filter(&self, filter: LogFilter) {
        let log = {
            let mut state = self.shared.state.lock();
            state.filter = filter;
            state.filtered_log()
        };
        self.shared.view.render_log(&log);
    }

    /// Show or hide the panel. Returns whether it is now open.
    pub fn toggle_panel(&self) -> bool {
        let open = {
            let mut state = self.shared.state.lock();
            state.open = !state.open;
            state.open
        };
        self.shared.view.set_visible(open);
        open
    }

    pub fn is_open(&self) -> bool {
        self.shared.state.lock().open
    }

    pub fn toggle_pin(&self) -> bool {
        let pinned = {
            let mut state = self.shared.state.lock();
            state.pinned = !state.pinned;
            state.pinned
        };
        self.shared.view.set_pinned(pinned);
        pinned
    }

    /// Feed a key press. Toggles the panel and returns true when it matches
    /// the configured shortcut.
    pub fn handle_key(&self, pressed: KeyChord) -> bool {
        if !self.config.toggle_key.matches(&pressed) {
            return false;
        }
        self.toggle_panel();
        true
    }

    /// Write the live state as pretty JSON into `dir`. Returns the file path,
    /// or `None` after logging a warning if writing failed.
    pub fn export_state(&self, dir: impl AsRef<Path>) -> Option<PathBuf> {
        match self.write_export(dir.as_ref()) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "exported state");
                Some(path)
            }
            Err(err) => {
                tracing::warn!(%err, "failed to export state");
                None
            }
        }
    }

    /// `<name>-state-<epoch millis>.json`, with the name reduced to
    /// lowercase ASCII alphanumerics and dashes.
    pub fn export_file_name(&self) -> String {
        let stem: String = self
            .config
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        format!("{stem}-state-{}.json", self.shared.clock.now_millis())
    }

    fn write_export(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let text = serde_json::to_string_pretty(&self.store.get())?;
        let path = dir.join(self.export_file_name());
        std::fs::write(&path, text)?;
        Ok(path)
    }

    /// Put the live state on the clipboard as pretty JSON. Returns false
    /// after logging a warning if that failed.
    pub fn copy_state(&self, sink: &dyn ClipboardSink) -> bool {
        let result = serde_json::to_string_pretty(&self.store.get())
            .map_err(BoxError::from)
            .and_then(|text| sink.set_text(text));
        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%err, "failed to copy state");
                false
            }
        }
    }

    /// Unsubscribe from the store and detach the view. Idempotent.
    pub fn destroy(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
            self.shared.view.detach();
            tracing::debug!(name = %self.config.name, "inspector destroyed");
        }
    }

    /// Whether the inspector is still subscribed to its store.
    pub fn is_attached(&self) -> bool {
        self.subscription
            .lock()
            .as_ref()
            .is_some_and(Subscription::is_active)
    }
}

/// Attach an inspector when the configuration enables one.
pub fn instrument(
    store: &Store,
    config: InspectorConfig,
    view: Arc<dyn InspectorView>,
) -> Option<Inspector> {
    if !config.enabled {
        tracing::debug!(name = %config.name, "inspector disabled");
        return None;
    }
    Some(Inspector::attach(store, config, view))
}
