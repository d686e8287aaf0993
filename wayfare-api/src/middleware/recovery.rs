use axum::response::{IntoResponse, Response};
use std::any::Any;
use tracing::error;

use crate::error::ApiError;
use wayfare_shared::AppError;

/// Panic hook for `CatchPanicLayer`: the panic becomes a 500 envelope.
/// The message is logged; the response carries no trace.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!(panic = %detail, "handler panicked");
    ApiError(AppError::internal(format!("handler panicked: {}", detail)).with_operation("recovery")).into_response()
}
