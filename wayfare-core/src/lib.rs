pub mod airport;
pub mod alert;
pub mod analytics;
pub mod cache;
pub mod destination;
pub mod geo;
pub mod iata;
pub mod inventory;
pub mod memory;
pub mod money;
pub mod offer;
pub mod price;
pub mod repository;
pub mod search;
pub mod session;
pub mod supplier;
pub mod tracking;
pub mod ugc;
pub mod validation;

use wayfare_shared::AppError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => AppError::validation(msg),
            CoreError::InvalidFormat(msg) => AppError::invalid_format(msg),
            CoreError::InvariantViolation(msg) => AppError::internal(msg),
        }
    }
}
