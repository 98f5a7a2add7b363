//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A flag update targeted a record that does not exist.
    #[error("item not found: {0}")]
    ItemNotFound(Uuid),

    /// A write would have given a second record the same flag.
    #[error("flag conflict: {0}")]
    Conflict(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// The history store could not be read or written (including timeouts).
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}
