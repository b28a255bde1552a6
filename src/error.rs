use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("pattern store error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("term '{term}' failed: {source}")]
    TermFailed {
        term: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{collaborator} failure: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("duplicate record id {0}")]
    DuplicateRecord(u64),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl Error {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedQuery(message.into())
    }

    pub(crate) fn collaborator(
        collaborator: &'static str,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Collaborator {
            collaborator,
            message: message.to_string(),
        }
    }

    /// Whether the failure was caused by the request rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MalformedQuery(_))
    }
}
