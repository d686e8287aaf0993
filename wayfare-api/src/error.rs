use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};

use crate::state::ApiSettings;
use wayfare_shared::AppError;

/// HTTP face of [`AppError`]. Handlers return `Result<_, ApiError>` and use
/// `?` on anything that yields an `AppError`.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(AppError::invalid_format(rejection.body_text()).with_status(rejection.status().as_u16()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(AppError::validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(AppError::validation(rejection.body_text()))
    }
}

fn status_of(err: &AppError) -> StatusCode {
    StatusCode::from_u16(err.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn envelope_response(err: &AppError, production: bool) -> Response {
    let mut response = (status_of(err), Json(err.to_envelope(production))).into_response();
    if let Some(seconds) = err.retry_after_seconds() {
        response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(seconds));
    }
    response
}

impl IntoResponse for ApiError {
    /// Renders a provisional envelope and stashes the error so the
    /// request-id middleware can stamp it with the request context.
    fn into_response(self) -> Response {
        let mut response = envelope_response(&self.0, false);
        response.extensions_mut().insert(self.0);
        response
    }
}

/// Re-render an error response with the request id, the service name and
/// the production redaction rule. Other headers survive.
pub fn finalize(mut response: Response, request_id: &str, settings: &ApiSettings) -> Response {
    let Some(err) = response.extensions_mut().remove::<AppError>() else {
        return response;
    };
    let err = err.with_request_id(request_id).with_service(&settings.service_name);

    let status = status_of(&err);
    if status.is_server_error() {
        error!(
            request_id = %request_id,
            code = %err.code,
            operation = ?err.operation,
            error = %err.message,
            "request failed"
        );
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        warn!(request_id = %request_id, "request rate limited");
    }

    let rendered = envelope_response(&err, settings.production);
    let (mut parts, _) = response.into_parts();
    let (rendered_parts, body) = rendered.into_parts();
    parts.status = rendered_parts.status;
    for (name, value) in rendered_parts.headers.iter() {
        parts.headers.insert(name.clone(), value.clone());
    }
    Response::from_parts(parts, body)
}
