use crate::binder::{ActionFn, BoxError, EffectContext, EffectFn};
use crate::store::Store;
use futures::FutureExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use strata_common::{Clock, Snapshot, SystemClock};
use strata_persist::StorageAdapter;

/// How concurrent effect invocations relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EffectMode {
    /// Effects run independently. Two effects that read, await, then write
    /// the same field can lose one of the updates; sequence them yourself or
    /// use `Serialized`.
    #[default]
    Concurrent,
    /// Effects are queued: each runs to completion before the next starts.
    Serialized,
}

/// Construction options for a [`Store`].
pub struct StoreOptions {
    /// Key under which the state is persisted. `None` disables persistence.
    pub persist_key: Option<String>,
    /// Backend for persistence. Defaults to a no-op store.
    pub storage: Option<Arc<dyn StorageAdapter>>,
    /// Persisted state expires this long after each write.
    pub ttl: Option<Duration>,
    /// Obfuscation prefix for the persisted text. This is not encryption and
    /// offers no confidentiality.
    pub secret: String,
    pub clock: Arc<dyn Clock>,
    pub actions: BTreeMap<String, ActionFn>,
    pub effects: BTreeMap<String, EffectFn>,
    pub effect_mode: EffectMode,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            persist_key: None,
            storage: None,
            ttl: None,
            secret: String::new(),
            clock: Arc::new(SystemClock),
            actions: BTreeMap::new(),
            effects: BTreeMap::new(),
            effect_mode: EffectMode::default(),
        }
    }
}

/// Fluent construction of a [`Store`].
pub struct StoreBuilder {
    initial: Snapshot,
    options: StoreOptions,
}

impl StoreBuilder {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            initial,
            options: StoreOptions::default(),
        }
    }

    pub fn persist_key(mut self, key: impl Into<String>) -> Self {
        self.options.persist_key = Some(key.into());
        self
    }

    pub fn storage(mut self, storage: Arc<dyn StorageAdapter>) -> Self {
        self.options.storage = Some(storage);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.options.ttl = Some(ttl);
        self
    }

    /// Obfuscation prefix for persisted text.
    ///
    /// Deters casual reading of the backing store only. It is not a key and
    /// the persisted state is not encrypted.
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.options.secret = secret.into();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.options.clock = clock;
        self
    }

    pub fn effect_mode(mut self, mode: EffectMode) -> Self {
        self.options.effect_mode = mode;
        self
    }

    /// Register a pure action. It receives the current state and the payload
    /// and must return the complete next state.
    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&Snapshot, &Value) -> Result<Snapshot, BoxError> + Send + Sync + 'static,
    {
        self.options.actions.insert(name.into(), Arc::new(action));
        self
    }

    /// Register an asynchronous effect.
    pub fn effect<F, Fut>(mut self, name: impl Into<String>, effect: F) -> Self
    where
        F: Fn(EffectContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let effect: EffectFn = Arc::new(move |ctx, payload| effect(ctx, payload).boxed());
        self.options.effects.insert(name.into(), effect);
        self
    }

    pub fn build(self) -> Store {
        Store::new(self.initial, self.options)
    }
}
