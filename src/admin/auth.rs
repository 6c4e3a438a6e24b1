use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::admin::state::ManagementState;

pub async fn admin_auth_middleware(
    State(state): State<ManagementState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if token == state.api_key() => Ok(next.run(request).await),
        _ => {
            tracing::debug!(path = %request.uri().path(), "Rejected management request");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
