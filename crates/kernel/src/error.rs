use crate::binder::BoxError;

/// Errors surfaced by store operations.
///
/// Only user logic fails loudly. Storage and decode problems are handled
/// inside the persistence layer and never appear here.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("unknown effect: {0}")]
    UnknownEffect(String),
    #[error("action `{name}` failed: {source}")]
    Action {
        name: String,
        #[source]
        source: BoxError,
    },
    #[error("effect `{name}` failed: {source}")]
    Effect {
        name: String,
        #[source]
        source: BoxError,
    },
}
