use thiserror::Error;

use cairn_proto::dav::parse::ParseError;
use cairn_repo::RepoError;

/// Errors surfaced by the protocol services.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Request XML did not match the expected shape. Surfaced before any
    /// repository call.
    #[error(transparent)]
    Malformed(#[from] ParseError),

    /// The verb is invalid for the resource's current state.
    #[error("{message}")]
    ResourceState { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// A repository or transaction call failed; the message is preserved.
    #[error(transparent)]
    Repo(RepoError),

    /// The client went away mid-stream; the document was aborted.
    #[error("request cancelled")]
    Cancelled,

    #[error("XML write error: {0}")]
    Xml(String),
}

impl ServiceError {
    /// A 409-class resource-state error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::ResourceState {
            status: 409,
            message: message.into(),
        }
    }

    /// A 405-class resource-state error.
    #[must_use]
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::ResourceState {
            status: 405,
            message: message.into(),
        }
    }

    /// The HTTP status this error surfaces as.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Malformed(_) => 400,
            Self::ResourceState { status, .. } => *status,
            Self::NotFound(_) => 404,
            Self::Repo(err) => match err {
                RepoError::PathNotFound(_) | RepoError::NoSuchRevision(_) => 404,
                RepoError::Conflict { .. } | RepoError::LockConflict { .. } => 409,
                RepoError::NoSuchTransaction(_) => 409,
                RepoError::Cancelled
                | RepoError::Storage(_)
                | RepoError::Io(_) => 500,
            },
            Self::Cancelled | Self::Xml(_) => 500,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Cancelled => Self::Cancelled,
            other => Self::Repo(other),
        }
    }
}

impl From<quick_xml::Error> for ServiceError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err.to_string())
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
