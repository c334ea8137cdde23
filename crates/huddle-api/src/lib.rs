pub mod auth;
pub mod error;
pub mod feedback;
pub mod middleware;
pub mod profiles;
pub mod rooms;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// REST routes. The gateway WebSocket is mounted by the server binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/profiles/me", get(profiles::get_me).patch(profiles::update_me))
        .route("/profiles/{profile_id}", get(profiles::get_profile))
        .route("/profiles/{profile_id}/role", put(profiles::set_role))
        .route("/profiles/{profile_id}/feedback", get(profiles::received_feedback))
        .route("/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route("/rooms/{room_id}", get(rooms::get_room))
        .route("/rooms/{room_id}/join", post(rooms::join_room))
        .route("/rooms/{room_id}/leave", post(rooms::leave_room))
        .route("/rooms/{room_id}/close", post(rooms::close_room))
        .route(
            "/rooms/{room_id}/feedback",
            get(feedback::list_room_feedback).post(feedback::submit_feedback),
        )
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
