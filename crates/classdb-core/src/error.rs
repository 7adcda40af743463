//! Core error types.

use crate::security::SecurityError;
use std::time::Duration;
use thiserror::Error;

/// Schema catalog errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested change violates a schema rule.
    #[error("schema error: {0}")]
    Schema(String),

    /// Adding the super class would make the inheritance graph cyclic.
    #[error("cannot add base class '{super_class}' to '{class}', because of recursion")]
    Cycle {
        /// Class receiving the super class.
        class: String,
        /// Super class that is already a descendant.
        super_class: String,
    },

    /// Stored records contradict a new property declaration.
    #[error(
        "the database contains some schema-less data in the property '{class}.{property}' \
         that is not compatible with {detail}. Fix those records and change the schema again"
    )]
    DataIncompatibility {
        /// Class owning the property.
        class: String,
        /// Property name.
        property: String,
        /// Violated constraint.
        detail: String,
    },

    /// The persisted catalog cannot be used by this build.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Schema changes are not allowed while a data transaction is open.
    #[error("transaction state error: {0}")]
    TransactionState(String),

    /// The catalog lock could not be taken in time.
    #[error("timed out after {waited:?} waiting for the schema lock")]
    LockTimeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// The calling thread already holds the schema write guard.
    #[error("schema write lock is already held by this thread; nest through the held guard")]
    NestedWrite,

    /// The session handle is closed.
    #[error("session is closed")]
    SessionClosed,

    /// Mutation attempted on a catalog that mirrors a remote server.
    #[error("read-only catalog: {0}")]
    ReadOnly(String),

    /// Permission check failed.
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// Index manager failure.
    #[error("index error: {0}")]
    Index(String),

    /// Collection store failure.
    #[error("collection error: {0}")]
    Collection(String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Class, property or record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error is a schema rule violation, cycles included.
    pub fn is_schema_violation(&self) -> bool {
        matches!(self, Error::Schema(_) | Error::Cycle { .. })
    }
}
