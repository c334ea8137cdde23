use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use huddle_gateway::session;

use crate::auth::AppState;
use crate::error::ApiError;

/// Resolve the bearer token into a `SessionContext` and attach it to the
/// request. Tokens for signed-out sessions are rejected.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let ctx = session::resolve(state.db.clone(), state.jwt_secret.clone(), token)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}
