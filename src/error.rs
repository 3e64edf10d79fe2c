use crate::models::ValidationError;
use crate::storage::StorageError;

/// Error returned by model mutators.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("reminder error: {0}")]
    Reminder(String),
    #[error("background write failed: {0}")]
    Background(String),
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(value: tokio::task::JoinError) -> Self {
        CoreError::Background(value.to_string())
    }
}
