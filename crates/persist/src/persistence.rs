use crate::codec::{self, Envelope};
use crate::storage::{NoopStorage, StorageAdapter};
use std::sync::Arc;
use std::time::Duration;
use strata_common::{Clock, Snapshot, SystemClock};

/// Persistence protocol for one key: encode on write, decode and check
/// expiry on read.
///
/// None of the methods fail. Storage errors are logged as warnings and the
/// call becomes a no-op, so in-memory state never depends on the backend.
pub struct Persistence {
    key: String,
    storage: Arc<dyn StorageAdapter>,
    ttl: Option<Duration>,
    secret: String,
    clock: Arc<dyn Clock>,
}

impl Persistence {
    pub fn new(key: impl Into<String>, storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            key: key.into(),
            storage,
            ttl: None,
            secret: String::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// A persistence layer that writes nowhere.
    pub fn noop(key: impl Into<String>) -> Self {
        Self::new(key, Arc::new(NoopStorage))
    }

    /// Stored envelopes expire `ttl` after each write.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Obfuscation prefix. Not a security measure.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Load the persisted snapshot, if present, readable and not expired.
    ///
    /// An expired envelope causes the key to be removed from storage.
    pub fn load(&self) -> Option<Snapshot> {
        let raw = match self.storage.get(&self.key) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key = %self.key, %err, "failed to read persisted state");
                return None;
            }
        };
        let envelope = codec::decode(raw.as_deref(), &self.secret)?;
        let now = self.clock.now_millis();
        if envelope.is_expired(now) {
            tracing::debug!(key = %self.key, expiry = ?envelope.expiry, now, "persisted state expired");
            self.remove();
            return None;
        }
        Some(envelope.data)
    }

    /// Write the snapshot, stamping an expiry when a ttl is configured.
    pub fn save(&self, state: &Snapshot) {
        let envelope = Envelope::new(state.clone(), self.ttl, self.clock.now_millis());
        self.write_encoded(codec::encode(&envelope, &self.secret));
    }

    /// Store encoded text. `None` means encoding failed and the previous
    /// record is left in place.
    fn write_encoded(&self, encoded: Option<String>) {
        let Some(encoded) = encoded else {
            tracing::warn!(key = %self.key, "skipping persist of unencodable state");
            return;
        };
        if let Err(err) = self.storage.set(&self.key, encoded) {
            tracing::warn!(key = %self.key, %err, "failed to persist state");
        }
    }

    /// Remove the persisted snapshot.
    pub fn remove(&self) {
        if let Err(err) = self.storage.remove(&self.key) {
            tracing::warn!(key = %self.key, %err, "failed to remove persisted state");
        }
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use strata_common::ManualClock;

    fn state() -> Snapshot {
        Snapshot::from_value(json!({"count": 7})).unwrap()
    }

    #[test]
    fn save_then_load() {
        let storage = Arc::new(MemoryStorage::new());
        let persistence = Persistence::new("app", storage.clone()).with_secret("k");
        persistence.save(&state());

        assert!(storage.get("app").unwrap().is_some());
        assert_eq!(persistence.load(), Some(state()));
    }

    #[test]
    fn expired_state_is_absent_and_removed() {
        let clock = ManualClock::new(1_000);
        let storage = Arc::new(MemoryStorage::new());
        let persistence = Persistence::new("app", storage.clone())
            .with_ttl(Some(Duration::from_millis(10)))
            .with_clock(Arc::new(clock.clone()));

        persistence.save(&state());
        clock.advance(10);
        assert_eq!(persistence.load(), Some(state()));

        clock.advance(1);
        assert_eq!(persistence.load(), None);
        assert!(storage.get("app").unwrap().is_none());
    }

    #[test]
    fn storage_failure_is_swallowed() {
        let storage = Arc::new(MemoryStorage::new());
        let persistence = Persistence::new("app", storage.clone());
        storage.fail_writes(true);

        persistence.save(&state());
        persistence.remove();
        assert_eq!(persistence.load(), None);
    }

    #[test]
    fn quota_exceeded_keeps_previous_value() {
        let storage = Arc::new(MemoryStorage::with_quota(64));
        let persistence = Persistence::new("app", storage.clone());
        persistence.save(&state());

        let big = Snapshot::from_value(json!({"blob": "x".repeat(256)})).unwrap();
        persistence.save(&big);
        assert_eq!(persistence.load(), Some(state()));
    }

    #[test]
    fn failed_encoding_keeps_previous_record() {
        let storage = Arc::new(MemoryStorage::new());
        let persistence = Persistence::new("app", storage.clone()).with_secret("k");
        persistence.save(&state());
        let before = storage.get("app").unwrap();

        persistence.write_encoded(None);
        assert_eq!(storage.get("app").unwrap(), before);
        assert_eq!(persistence.load(), Some(state()));
    }

    #[test]
    fn corrupt_value_loads_as_absent() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("app", "%%%corrupt%%%".into()).unwrap();
        let persistence = Persistence::new("app", storage);
        assert_eq!(persistence.load(), None);
    }

    #[test]
    fn noop_never_loads() {
        let persistence = Persistence::noop("app");
        persistence.save(&state());
        assert_eq!(persistence.load(), None);
    }
}
