use thiserror::Error;

/// Errors surfaced by the repository boundary.
#[derive(Error, Debug)]
pub enum RepoError {
    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("no such revision: {0}")]
    NoSuchRevision(u64),

    #[error("no such transaction: {0}")]
    NoSuchTransaction(String),

    #[error("conflict at '{path}': {message}")]
    Conflict { path: String, message: String },

    #[error("lock conflict at '{path}': {message}")]
    LockConflict { path: String, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type RepoResult<T> = std::result::Result<T, RepoError>;
