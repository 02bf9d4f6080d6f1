//! Typed errors for the public query and mutation operations.

use crate::storage::StorageError;
use thiserror::Error;

/// Error returned by the definition and instance services.
///
/// Storage failures carry the operation that issued them; messages are
/// suitable for direct user display. Nothing at this layer is retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{op} failed: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("task definition not found: {id}")]
    DefinitionNotFound { id: String },

    #[error("task instance not found: {id}")]
    InstanceNotFound { id: String },

    /// A freshly written row came back without its id column. Reads soft-skip
    /// such rows; writes treat them as unrecoverable.
    #[error("{op} returned a malformed row (missing id)")]
    MalformedRow { op: &'static str },
}

impl Error {
    pub(crate) fn storage(op: &'static str) -> impl FnOnce(StorageError) -> Error {
        move |source| Error::Storage { op, source }
    }
}

/// Result alias for service operations.
pub type Result<T> = std::result::Result<T, Error>;
