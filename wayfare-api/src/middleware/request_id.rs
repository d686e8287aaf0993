use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};

use crate::error::finalize;
use crate::state::AppState;
use wayfare_shared::request_id::{self, REQUEST_ID_HEADER};

/// The id this request is known by, available to handlers as an extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Honors an incoming `X-Request-ID` or mints one, echoes it on the
/// response and stamps it into any error envelope.
pub async fn request_id_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let incoming = req.headers().get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok());
    let id = request_id::resolve(incoming);
    req.extensions_mut().insert(RequestId(id.clone()));

    let response = next.run(req).await;
    let mut response = finalize(response, &id, &state.settings);
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
