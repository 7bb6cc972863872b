//! Error types for mailstore-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Unknown identity and wrong secret are deliberately the same variant.
    #[error("authentication failed")]
    AuthFailed,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// A blocking worker (hashing, verification) panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failures reported by the message store gateway.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique constraint rejected the write (e.g. the address is taken).
    #[error("duplicate entry: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("store unavailable")]
    Unavailable,

    /// Fan-out stopped part way; rows already written are kept.
    #[error("delivered to {delivered} of {total} recipients: {source}")]
    PartialDelivery {
        delivered: usize,
        total: usize,
        #[source]
        source: Box<StoreError>,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                StoreError::Duplicate(e.to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn panicked_worker_is_not_reported_as_bad_credentials() {
        let join_err = tokio::task::spawn_blocking(|| panic!("worker died"))
            .await
            .unwrap_err();
        let err = Error::from(join_err);
        assert!(matches!(err, Error::Task(_)));
        assert!(!matches!(err, Error::AuthFailed));
    }
}
