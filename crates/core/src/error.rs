//! Unified error types for shardlink.
//!
//! Every failure surfaced by the data-access layer collapses onto one of the
//! kinds in [`ErrorKind`]; transport layers map those kinds onto their own
//! status codes.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The record is absent from its backing store.
    NotFound,
    /// A record with the same short code already exists.
    AlreadyExists,
    /// The input was rejected before any I/O took place.
    Validation,
    /// A store or cache was unreachable, failed, or timed out.
    TransientIo,
    /// The deployment is misconfigured (no shards, shard failed to open).
    Configuration,
}

/// Unified error type for the shardlink data-access layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No record for the given short code or id.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Unique-constraint violation on create.
    #[error("ALREADY_EXISTS: {0}")]
    AlreadyExists(String),

    /// Malformed record or parameter.
    #[error("VALIDATION_FAILED: {0}")]
    Validation(String),

    /// Partition store operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Remote cache operation failed.
    #[error("CACHE_ERROR: {0}")]
    Cache(String),

    /// Cache payload could not be encoded or decoded.
    #[error("CACHE_ERROR: serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An outbound call exceeded its deadline.
    #[error("TIMEOUT: {0}")]
    Timeout(String),

    /// Invalid shard or cache configuration.
    #[error("CONFIG_ERROR: {0}")]
    Config(String),

    /// A single partition failed during a routed or scatter-gather call.
    #[error("shard {index}: {source}")]
    Shard {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    /// A fan-out aborted after `completed` units had already been applied.
    #[error("shard {shard} failed after {completed} applied: {source}")]
    PartialFailure {
        shard: usize,
        completed: u64,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Classify this error onto the taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Config(_) | Error::MigrationFailed(_) => ErrorKind::Configuration,
            Error::Database(_) | Error::Cache(_) | Error::Serialization(_) | Error::Timeout(_) => {
                ErrorKind::TransientIo
            }
            Error::Shard { source, .. } | Error::PartialFailure { source, .. } => source.kind(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Wrap an error with the index of the partition it came from.
    pub fn in_shard(self, index: usize) -> Self {
        Error::Shard { index, source: Box::new(self) }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<deadpool_redis::PoolError> for Error {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Error::Cache(err.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for Error {
    fn from(err: deadpool_redis::redis::RedisError) -> Self {
        Error::Cache(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match err.kind() {
            ErrorKind::Validation => -32602,
            ErrorKind::NotFound => -32001,
            ErrorKind::AlreadyExists => -32002,
            ErrorKind::TransientIo => -32003,
            ErrorKind::Configuration => -32004,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
