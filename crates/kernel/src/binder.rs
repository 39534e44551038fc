//! Actions and effects bound to a store.
//!
//! An action is a pure function from the current state and a payload to the
//! complete next state. An effect is an async function that drives the store
//! through an [`EffectContext`]; once it settles the store persists and
//! notifies one more time.

use crate::error::StoreError;
use crate::store::{FieldUpdate, Store};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use strata_common::Snapshot;

/// Error type returned by user-supplied actions and effects.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type ActionFn = Arc<dyn Fn(&Snapshot, &Value) -> Result<Snapshot, BoxError> + Send + Sync>;

pub type EffectFn =
    Arc<dyn Fn(EffectContext, Value) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Action,
    Effect,
}

/// What caused a notified change, for observers that record history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: ActionKind,
    pub name: String,
    pub payload: Value,
}

impl ActionRecord {
    pub fn action(name: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: ActionKind::Action,
            name: name.into(),
            payload,
        }
    }

    pub fn effect(name: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: ActionKind::Effect,
            name: name.into(),
            payload,
        }
    }

    pub fn is_effect(&self) -> bool {
        self.kind == ActionKind::Effect
    }
}

impl std::fmt::Display for ActionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.kind {
            ActionKind::Action => "action",
            ActionKind::Effect => "effect",
        };
        write!(f, "{prefix}:{} {}", self.name, self.payload)
    }
}

/// A callable handle for one registered action.
#[derive(Clone)]
pub struct BoundAction {
    store: Store,
    name: String,
}

impl BoundAction {
    pub(crate) fn new(store: Store, name: String) -> Self {
        Self { store, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, payload: Value) -> Result<(), StoreError> {
        self.store.dispatch(&self.name, payload)
    }
}

/// A callable handle for one registered effect.
#[derive(Clone)]
pub struct BoundEffect {
    store: Store,
    name: String,
}

impl BoundEffect {
    pub(crate) fn new(store: Store, name: String) -> Self {
        Self { store, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(&self, payload: Value) -> Result<(), StoreError> {
        self.store.run_effect(&self.name, payload).await
    }
}

/// The toolset an effect receives: reads, writes, and every bound action.
///
/// Each call goes through the same synchronous contract as direct store
/// calls, so every write inside an effect notifies on its own.
#[derive(Clone)]
pub struct EffectContext {
    store: Store,
}

impl EffectContext {
    pub(crate) fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn get(&self) -> Snapshot {
        self.store.get()
    }

    pub fn get_field(&self, key: &str) -> Option<Value> {
        self.store.get_field(key)
    }

    pub fn set_field(&self, key: impl Into<String>, update: impl Into<FieldUpdate>) {
        self.store.set_field(key, update);
    }

    pub fn set_fields<I, K>(&self, updates: I)
    where
        I: IntoIterator<Item = (K, FieldUpdate)>,
        K: Into<String>,
    {
        self.store.set_fields(updates);
    }

    pub fn replace(&self, next: Snapshot) {
        self.store.replace(next);
    }

    /// Run a bound action by name.
    pub fn dispatch(&self, action: &str, payload: Value) -> Result<(), StoreError> {
        self.store.dispatch(action, payload)
    }

    pub fn action(&self, name: &str) -> Option<BoundAction> {
        self.store.action(name)
    }
}
