use std::error::Error as StdError;

use thiserror::Error;

/// A raw value was rejected by a state definition. The message is shown to
/// the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failures at the storage backend seam.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert hit an existing (scope, namespace, key) row.
    #[error("state record already exists")]
    Duplicate,
    #[error("{context}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl StoreError {
    #[must_use]
    pub fn backend(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Concurrent writers kept winning the insert race.
    #[error("write conflict on {key} after {attempts} attempts")]
    Conflict { key: String, attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode state value")]
    Serialization(#[from] serde_json::Error),
}
