use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::{app_error::AppError, app_state::AppState};

/// Rejects requests whose bearer token does not match the configured API token.
pub async fn bearer_authorization(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".into()))?;

    if token != state.config.server.api_token {
        return Err(AppError::Unauthorized("Invalid bearer token".into()));
    }

    Ok(next.run(req).await)
}

/// Resolves the current customer identity. Authentication itself is an
/// external collaborator; the upstream proxy forwards the verified identity
/// in the `x-customer-id` header.
pub async fn customer_identity(mut req: Request, next: Next) -> Result<Response, AppError> {
    let customer_id: i32 = req
        .headers()
        .get("x-customer-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing customer identity".into()))?;

    req.extensions_mut().insert(customer_id);
    Ok(next.run(req).await)
}
