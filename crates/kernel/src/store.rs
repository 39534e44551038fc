use crate::binder::{
    ActionFn, ActionRecord, BoundAction, BoundEffect, EffectContext, EffectFn,
};
use crate::error::StoreError;
use crate::options::{EffectMode, StoreBuilder, StoreOptions};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use strata_common::{Snapshot, SubscriberId};
use strata_persist::{NoopStorage, Persistence};

type Listener = Arc<dyn Fn(Snapshot, Option<&ActionRecord>) + Send + Sync>;

/// A new value for one field: either a replacement or a function of the
/// previous value.
pub enum FieldUpdate {
    Replace(Value),
    Update(Box<dyn FnOnce(Option<&Value>) -> Value + Send>),
}

impl FieldUpdate {
    /// Build an updater. It runs while the state is locked, so it must not
    /// call back into the store.
    pub fn with<F>(update: F) -> Self
    where
        F: FnOnce(Option<&Value>) -> Value + Send + 'static,
    {
        Self::Update(Box::new(update))
    }

    fn apply(self, previous: Option<&Value>) -> Value {
        match self {
            Self::Replace(value) => value,
            Self::Update(update) => update(previous),
        }
    }
}

impl From<Value> for FieldUpdate {
    fn from(value: Value) -> Self {
        Self::Replace(value)
    }
}

impl std::fmt::Debug for FieldUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Replace(value) => f.debug_tuple("Replace").field(value).finish(),
            Self::Update(_) => f.write_str("Update(..)"),
        }
    }
}

struct StoreInner {
    state: Mutex<Snapshot>,
    listeners: Mutex<Vec<(SubscriberId, Listener)>>,
    persistence: Option<Persistence>,
    actions: BTreeMap<String, ActionFn>,
    effects: BTreeMap<String, EffectFn>,
    /// Present in `EffectMode::Serialized`; held for the whole effect.
    effect_gate: Option<futures::lock::Mutex<()>>,
}

/// The observable state container.
///
/// `Store` is a cheap handle; clones share the same state. Every mutating
/// call runs mutate, persist, notify to completion before returning.
/// Subscribers are invoked in registration order after the state lock is
/// released, so they may read the store again.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create a store. With a persistence key, a valid unexpired persisted
    /// snapshot takes precedence over `initial`.
    pub fn new(initial: Snapshot, options: StoreOptions) -> Self {
        let StoreOptions {
            persist_key,
            storage,
            ttl,
            secret,
            clock,
            actions,
            effects,
            effect_mode,
        } = options;

        let persistence = persist_key.map(|key| {
            let storage = storage.unwrap_or_else(|| Arc::new(NoopStorage));
            Persistence::new(key, storage)
                .with_ttl(ttl)
                .with_secret(secret)
                .with_clock(clock)
        });

        let state = match persistence.as_ref().and_then(Persistence::load) {
            Some(restored) => {
                tracing::debug!(fields = restored.len(), "restored persisted state");
                restored
            }
            None => initial,
        };

        let effect_gate = match effect_mode {
            EffectMode::Concurrent => None,
            EffectMode::Serialized => Some(futures::lock::Mutex::new(())),
        };

        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(state),
                listeners: Mutex::new(Vec::new()),
                persistence,
                actions,
                effects,
                effect_gate,
            }),
        }
    }

    pub fn builder(initial: Snapshot) -> StoreBuilder {
        StoreBuilder::new(initial)
    }

    /// An independent copy of the whole state.
    pub fn get(&self) -> Snapshot {
        self.inner.state.lock().clone()
    }

    /// An independent copy of one field.
    pub fn get_field(&self, key: &str) -> Option<Value> {
        self.inner.state.lock().get(key).cloned()
    }

    /// Set one field, then persist and notify.
    pub fn set_field(&self, key: impl Into<String>, update: impl Into<FieldUpdate>) {
        let key = key.into();
        let update = update.into();
        tracing::debug!(field = %key, "set field");
        self.commit(
            move |state| {
                let next = update.apply(state.get(&key));
                state.insert(key, next);
            },
            None,
        );
    }

    /// Shorthand for `set_field(key, FieldUpdate::with(update))`.
    pub fn update_field<F>(&self, key: impl Into<String>, update: F)
    where
        F: FnOnce(Option<&Value>) -> Value + Send + 'static,
    {
        self.set_field(key, FieldUpdate::with(update));
    }

    /// Apply every update in order, then persist and notify once.
    pub fn set_fields<I, K>(&self, updates: I)
    where
        I: IntoIterator<Item = (K, FieldUpdate)>,
        K: Into<String>,
    {
        self.commit(
            |state| {
                for (key, update) in updates {
                    let key = key.into();
                    let next = update.apply(state.get(&key));
                    state.insert(key, next);
                }
            },
            None,
        );
    }

    /// Replace the whole state, then persist and notify.
    pub fn replace(&self, next: Snapshot) {
        self.commit(|state| *state = next, None);
    }

    /// Register a callback. It is invoked once immediately with the current
    /// state, then once per change until unsubscribed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Snapshot) + Send + Sync + 'static,
    {
        self.subscribe_changes(move |snapshot, _| callback(snapshot))
    }

    /// Like [`Store::subscribe`], but the callback also learns which action or
    /// effect caused the change. The immediate first call carries `None`.
    pub fn subscribe_changes<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Snapshot, Option<&ActionRecord>) + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        let listener: Listener = Arc::new(callback);
        self.inner.listeners.lock().push((id, listener.clone()));
        listener(self.get(), None);
        Subscription {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Reset to an empty state, remove the persisted copy, and drop every
    /// subscriber. Observers must subscribe again to keep watching.
    pub fn clear(&self) {
        {
            let mut state = self.inner.state.lock();
            *state = Snapshot::new();
            if let Some(persistence) = &self.inner.persistence {
                persistence.remove();
            }
        }
        let dropped = std::mem::take(&mut *self.inner.listeners.lock());
        tracing::debug!(subscribers = dropped.len(), "store cleared");
    }

    pub fn persist_key(&self) -> Option<&str> {
        self.inner.persistence.as_ref().map(Persistence::key)
    }

    /// Run a registered action against the current state and commit its
    /// result. A failing action leaves the state untouched and notifies
    /// nobody.
    pub fn dispatch(&self, name: &str, payload: Value) -> Result<(), StoreError> {
        let action = self
            .inner
            .actions
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownAction(name.to_string()))?;

        let next = action(&self.get(), &payload).map_err(|source| StoreError::Action {
            name: name.to_string(),
            source,
        })?;

        tracing::debug!(action = name, "dispatched action");
        let record = ActionRecord::action(name, payload);
        self.commit(|state| *state = next, Some(&record));
        Ok(())
    }

    /// Await a registered effect, then persist and notify once more.
    ///
    /// A failing effect skips the final persist and notify. Writes it made
    /// before failing stay in place.
    pub async fn run_effect(&self, name: &str, payload: Value) -> Result<(), StoreError> {
        let effect = self
            .inner
            .effects
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownEffect(name.to_string()))?;

        let _turn = match &self.inner.effect_gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        tracing::debug!(effect = name, "running effect");
        effect(EffectContext::new(self.clone()), payload.clone())
            .await
            .map_err(|source| StoreError::Effect {
                name: name.to_string(),
                source,
            })?;

        let record = ActionRecord::effect(name, payload);
        self.commit(|_| {}, Some(&record));
        Ok(())
    }

    /// Callable handle for a registered action.
    pub fn action(&self, name: &str) -> Option<BoundAction> {
        self.inner
            .actions
            .contains_key(name)
            .then(|| BoundAction::new(self.clone(), name.to_string()))
    }

    /// Callable handle for a registered effect.
    pub fn effect(&self, name: &str) -> Option<BoundEffect> {
        self.inner
            .effects
            .contains_key(name)
            .then(|| BoundEffect::new(self.clone(), name.to_string()))
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.inner.actions.keys().map(String::as_str)
    }

    pub fn effect_names(&self) -> impl Iterator<Item = &str> {
        self.inner.effects.keys().map(String::as_str)
    }

    fn commit<F>(&self, mutate: F, cause: Option<&ActionRecord>)
    where
        F: FnOnce(&mut Snapshot),
    {
        let snapshot = {
            let mut state = self.inner.state.lock();
            mutate(&mut state);
            if let Some(persistence) = &self.inner.persistence {
                persistence.save(&state);
            }
            state.clone()
        };
        self.notify(snapshot, cause);
    }

    fn notify(&self, snapshot: Snapshot, cause: Option<&ActionRecord>) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(snapshot.clone(), cause);
        }
    }
}

/// Handle returned by [`Store::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    store: Weak<StoreInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Stop receiving notifications. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.store.upgrade() {
            inner.listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }

    /// Whether the callback is still registered.
    pub fn is_active(&self) -> bool {
        self.store
            .upgrade()
            .is_some_and(|inner| inner.listeners.lock().iter().any(|(id, _)| *id == self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::BoxError;
    use serde_json::json;
    use std::time::Duration;
    use strata_common::ManualClock;
    use strata_persist::{MemoryStorage, StorageAdapter};

    fn snap(value: Value) -> Snapshot {
        Snapshot::from_value(value).unwrap()
    }

    fn counter() -> Store {
        Store::builder(snap(json!({"count": 0})))
            .action("increment", |state, payload| {
                let by = payload.as_i64().unwrap_or(1);
                let count = state.get("count").and_then(Value::as_i64).unwrap_or(0);
                let mut next = state.clone();
                next.insert("count", json!(count + by));
                Ok(next)
            })
            .action("fail", |_, _| Err("refused".into()))
            .build()
    }

    fn recorder(store: &Store) -> (Arc<Mutex<Vec<Snapshot>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = store.subscribe(move |snapshot| sink.lock().push(snapshot));
        (seen, sub)
    }

    #[test]
    fn get_returns_independent_copy() {
        let store = Store::new(snap(json!({"user": {"name": "a"}})), StoreOptions::default());
        let mut copy = store.get();
        copy.insert("user", json!({"name": "changed"}));
        copy.insert("extra", json!(true));
        assert_eq!(store.get(), snap(json!({"user": {"name": "a"}})));

        let mut field = store.get_field("user").unwrap();
        field["name"] = json!("changed");
        assert_eq!(store.get_field("user"), Some(json!({"name": "a"})));
    }

    #[test]
    fn set_field_replaces_and_updates() {
        let store = counter();
        store.set_field("count", json!(5));
        assert_eq!(store.get_field("count"), Some(json!(5)));

        store.update_field("count", |prev| {
            json!(prev.and_then(Value::as_i64).unwrap_or(0) * 2)
        });
        assert_eq!(store.get_field("count"), Some(json!(10)));

        store.update_field("missing", |prev| json!(prev.is_none()));
        assert_eq!(store.get_field("missing"), Some(json!(true)));
    }

    #[test]
    fn subscribe_replays_current_state_once() {
        let store = counter();
        let (seen, _sub) = recorder(&store);
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0], snap(json!({"count": 0})));
    }

    #[test]
    fn set_fields_notifies_once_after_all_updates() {
        let store = counter();
        let (seen, _sub) = recorder(&store);
        store.set_fields([
            ("count", FieldUpdate::from(json!(1))),
            ("name", FieldUpdate::from(json!("x"))),
            ("count", FieldUpdate::with(|prev| json!(prev.and_then(Value::as_i64).unwrap_or(0) + 1))),
        ]);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], snap(json!({"count": 2, "name": "x"})));
    }

    #[test]
    fn subscribers_notified_in_registration_order() {
        let store = counter();
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = order.clone();
        let second = order.clone();
        let _a = store.subscribe(move |_| first.lock().push("a"));
        let _b = store.subscribe(move |_| second.lock().push("b"));
        order.lock().clear();

        store.set_field("count", json!(1));
        assert_eq!(*order.lock(), ["a", "b"]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let store = counter();
        let (seen, sub) = recorder(&store);
        assert!(sub.is_active());
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());

        store.set_field("count", json!(9));
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn subscriber_may_read_store_during_notification() {
        let store = counter();
        let reader = store.clone();
        let reads = Arc::new(Mutex::new(Vec::new()));
        let sink = reads.clone();
        let _sub = store.subscribe(move |_| sink.lock().push(reader.get_field("count")));
        store.set_field("count", json!(3));
        assert_eq!(reads.lock().last(), Some(&Some(json!(3))));
    }

    #[test]
    fn replace_drops_missing_keys() {
        let store = Store::new(snap(json!({"a": 1, "b": 2})), StoreOptions::default());
        store.replace(snap(json!({"a": 5})));
        assert_eq!(store.get(), snap(json!({"a": 5})));
    }

    #[test]
    fn clear_empties_state_and_drops_subscribers() {
        let storage = Arc::new(MemoryStorage::new());
        let store = Store::builder(snap(json!({"count": 1})))
            .persist_key("app")
            .storage(storage.clone())
            .build();
        store.set_field("count", json!(2));
        assert!(storage.get("app").unwrap().is_some());

        let (seen, sub) = recorder(&store);
        store.clear();

        assert!(store.get().is_empty());
        assert!(storage.get("app").unwrap().is_none());
        assert!(!sub.is_active());

        store.set_field("count", json!(3));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn persisted_state_restored_on_construction() {
        let storage = Arc::new(MemoryStorage::new());
        let first = Store::builder(snap(json!({"count": 0})))
            .persist_key("app")
            .secret("s")
            .storage(storage.clone())
            .build();
        first.set_field("count", json!(42));

        let second = Store::builder(snap(json!({"count": 0})))
            .persist_key("app")
            .secret("s")
            .storage(storage.clone())
            .build();
        assert_eq!(second.get_field("count"), Some(json!(42)));
        assert_eq!(second.persist_key(), Some("app"));
    }

    #[test]
    fn expired_state_falls_back_to_initial() {
        let clock = ManualClock::new(10_000);
        let storage = Arc::new(MemoryStorage::new());
        let build = || {
            Store::builder(snap(json!({"count": 0})))
                .persist_key("app")
                .ttl(Duration::from_millis(10))
                .clock(Arc::new(clock.clone()))
                .storage(storage.clone())
                .build()
        };
        build().set_field("count", json!(7));

        clock.advance(11);
        let reopened = build();
        assert_eq!(reopened.get_field("count"), Some(json!(0)));
        assert!(storage.get("app").unwrap().is_none());
    }

    #[test]
    fn corrupt_persisted_state_falls_back_to_initial() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("app", "garbage".into()).unwrap();
        let store = Store::builder(snap(json!({"count": 0})))
            .persist_key("app")
            .storage(storage)
            .build();
        assert_eq!(store.get(), snap(json!({"count": 0})));
    }

    #[test]
    fn storage_failure_does_not_block_mutation() {
        let storage = Arc::new(MemoryStorage::new());
        storage.fail_writes(true);
        let store = Store::builder(snap(json!({"count": 0})))
            .persist_key("app")
            .storage(storage.clone())
            .build();
        let (seen, _sub) = recorder(&store);

        store.set_field("count", json!(1));
        assert_eq!(store.get_field("count"), Some(json!(1)));
        assert_eq!(seen.lock().len(), 2);
        assert!(storage.is_empty());
    }

    #[test]
    fn persist_key_without_storage_is_harmless() {
        let store = Store::builder(snap(json!({"count": 0})))
            .persist_key("app")
            .build();
        store.set_field("count", json!(1));
        store.clear();
        assert!(store.get().is_empty());
    }

    #[test]
    fn dispatch_applies_action_and_tags_change() {
        let store = counter();
        let causes = Arc::new(Mutex::new(Vec::new()));
        let sink = causes.clone();
        let _sub = store.subscribe_changes(move |_, cause| sink.lock().push(cause.cloned()));

        store.dispatch("increment", json!(3)).unwrap();
        assert_eq!(store.get_field("count"), Some(json!(3)));

        let causes = causes.lock();
        assert_eq!(causes.len(), 2);
        assert_eq!(causes[0], None);
        assert_eq!(causes[1], Some(ActionRecord::action("increment", json!(3))));
    }

    #[test]
    fn bound_action_handle_calls_through() {
        let store = counter();
        let increment = store.action("increment").unwrap();
        increment.call(Value::Null).unwrap();
        increment.call(json!(2)).unwrap();
        assert_eq!(store.get_field("count"), Some(json!(3)));
        assert!(store.action("nope").is_none());
        assert_eq!(store.action_names().collect::<Vec<_>>(), ["fail", "increment"]);
    }

    #[test]
    fn failing_action_leaves_state_and_skips_notify() {
        let store = counter();
        let (seen, _sub) = recorder(&store);
        let err = store.dispatch("fail", Value::Null).unwrap_err();
        assert!(matches!(err, StoreError::Action { ref name, .. } if name == "fail"));
        assert!(err.to_string().contains("refused"));
        assert_eq!(store.get(), snap(json!({"count": 0})));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn unknown_action_is_an_error() {
        let store = counter();
        assert!(matches!(
            store.dispatch("missing", Value::Null),
            Err(StoreError::UnknownAction(_))
        ));
    }

    fn effects_store(mode: EffectMode) -> Store {
        Store::builder(snap(json!({"count": 0})))
            .effect_mode(mode)
            .action("increment", |state, _| {
                let count = state.get("count").and_then(Value::as_i64).unwrap_or(0);
                let mut next = state.clone();
                next.insert("count", json!(count + 1));
                Ok(next)
            })
            .effect("bump", |ctx, _| async move {
                let count = ctx.get_field("count").and_then(|v| v.as_i64()).unwrap_or(0);
                tokio::task::yield_now().await;
                ctx.set_field("count", json!(count + 1));
                Ok::<(), BoxError>(())
            })
            .effect("load", |ctx, payload| async move {
                ctx.set_field("loading", json!(true));
                tokio::task::yield_now().await;
                ctx.dispatch("increment", Value::Null)?;
                ctx.set_fields([
                    ("items", FieldUpdate::from(payload)),
                    ("loading", FieldUpdate::from(json!(false))),
                ]);
                Ok::<(), BoxError>(())
            })
            .effect("broken", |ctx, _| async move {
                ctx.set_field("touched", json!(true));
                Err::<(), BoxError>("network down".into())
            })
            .build()
    }

    #[tokio::test]
    async fn effect_runs_and_notifies_after_settling() {
        let store = effects_store(EffectMode::Concurrent);
        let causes = Arc::new(Mutex::new(Vec::new()));
        let sink = causes.clone();
        let _sub = store.subscribe_changes(move |_, cause| sink.lock().push(cause.cloned()));

        store.run_effect("load", json!([1, 2])).await.unwrap();
        assert_eq!(
            store.get(),
            snap(json!({"count": 1, "loading": false, "items": [1, 2]}))
        );

        let causes = causes.lock();
        // replay, loading=true, increment, bulk set, trailing effect notify
        assert_eq!(causes.len(), 5);
        assert_eq!(causes[2], Some(ActionRecord::action("increment", Value::Null)));
        assert_eq!(causes[4], Some(ActionRecord::effect("load", json!([1, 2]))));
    }

    #[tokio::test]
    async fn failing_effect_skips_trailing_notify() {
        let store = effects_store(EffectMode::Concurrent);
        let (seen, _sub) = recorder(&store);
        let err = store.run_effect("broken", Value::Null).await.unwrap_err();
        assert!(matches!(err, StoreError::Effect { .. }));
        // replay + the write made inside the effect, no trailing notify
        assert_eq!(seen.lock().len(), 2);
        assert_eq!(store.get_field("touched"), Some(json!(true)));
    }

    #[tokio::test]
    async fn concurrent_effects_can_lose_updates() {
        let store = effects_store(EffectMode::Concurrent);
        let (a, b) = tokio::join!(
            store.run_effect("bump", Value::Null),
            store.run_effect("bump", Value::Null)
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(store.get_field("count"), Some(json!(1)));
    }

    #[tokio::test]
    async fn serialized_effects_do_not_interleave() {
        let store = effects_store(EffectMode::Serialized);
        let bump = store.effect("bump").unwrap();
        let (a, b) = tokio::join!(bump.call(Value::Null), bump.call(Value::Null));
        a.unwrap();
        b.unwrap();
        assert_eq!(store.get_field("count"), Some(json!(2)));
    }

    #[tokio::test]
    async fn unknown_effect_is_an_error() {
        let store = effects_store(EffectMode::Concurrent);
        assert!(matches!(
            store.run_effect("missing", Value::Null).await,
            Err(StoreError::UnknownEffect(_))
        ));
        assert!(store.effect("missing").is_none());
    }
}
