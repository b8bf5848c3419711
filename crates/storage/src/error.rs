use serde::{Serialize, Serializer};
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Storage error
#[derive(Debug, Error)]
pub enum StorageError {
    /// A record with the same unique key already exists
    #[error("duplicate {key}")]
    Duplicate {
        /// The conflicting key
        key: String,
    },

    /// The record to update does not exist
    #[error("{key} not found")]
    NotFound {
        /// The missing key
        key: String,
    },

    /// Database error
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl StorageError {
    pub fn duplicate(key: impl ToString) -> Self {
        Self::Duplicate { key: key.to_string() }
    }

    pub fn not_found(key: impl ToString) -> Self {
        Self::NotFound { key: key.to_string() }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

impl Serialize for StorageError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Embedded database error
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

macro_rules! storage_error_from {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for StorageError {
                fn from(err: $err) -> Self {
                    Self::Database(DatabaseError::from(err))
                }
            }
        )*
    };
}

storage_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    serde_json::Error,
    std::io::Error,
);
