use thiserror::Error;

/// Application-level errors (HTTP layer)
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    ServiceError(#[from] cairn_service::ServiceError),

    #[error(transparent)]
    RepoError(#[from] cairn_repo::RepoError),

    #[error(transparent)]
    CoreError(#[from] cairn_core::error::CoreError),
}

pub type AppResult<T> = std::result::Result<T, AppError>;
