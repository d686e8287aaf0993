pub mod error;
pub mod pii;
pub mod request_id;
pub mod models;

pub use error::{codes, AppError, AppResult, ErrorEnvelope, ErrorKind, Severity};
pub use pii::Masked;
