use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use tracing::{info, warn};
use uuid::Uuid;

use huddle_db::Database;
use huddle_gateway::dispatcher::Dispatcher;
use huddle_gateway::session::SessionContext;
use huddle_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};
use huddle_types::models::Role;

use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    /// Username that is granted the admin role when it registers.
    pub bootstrap_admin: Option<String>,
}

impl AppStateInner {
    /// Run a blocking store call off the async runtime.
    pub async fn db_call<F, T>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || f(&db)).await??)
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::validation("username must be 3-32 characters"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::validation("password must be at least 8 characters"));
    }
    let display_name = validate_display_name(&req.display_name)?;

    let is_bootstrap_admin = state.bootstrap_admin.as_deref() == Some(req.username.as_str());
    let role = match req.role {
        _ if is_bootstrap_admin => Role::Admin,
        Some(Role::Admin) => return Err(ApiError::Forbidden),
        Some(role) => role,
        None => Role::Student,
    };

    // Check if username is taken
    let username = req.username.clone();
    if state
        .db_call(move |db| db.get_account_by_username(&username))
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("username is taken".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let profile_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();
    let username = req.username.clone();
    let profile = state
        .db_call(move |db| {
            db.register_account(profile_id, &username, &password_hash, &display_name, role, session_id)
        })
        .await?;

    let token = create_token(&state, profile_id, session_id)?;
    info!("Registered {} as {} ({})", req.username, profile.role, profile_id);

    Ok((StatusCode::CREATED, Json(AuthResponse { token, profile })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let username = req.username.clone();
    let account = state
        .db_call(move |db| db.get_account_by_username(&username))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&account.password)
        .map_err(|e| anyhow::anyhow!("corrupt password hash for {}: {}", account.username, e))?;
    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        warn!("Failed login for {}", account.username);
        return Err(ApiError::Unauthorized);
    }

    let profile_id: Uuid = account
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt account id {:?}: {}", account.id, e))?;
    let session_id = Uuid::new_v4();

    let profile = state
        .db_call(move |db| {
            db.create_session(session_id, profile_id)?;
            db.get_profile(profile_id)
        })
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let token = create_token(&state, profile_id, session_id)?;
    info!("{} signed in ({})", account.username, session_id);

    Ok(Json(AuthResponse { token, profile }))
}

/// Ends the caller's session. Its token stops working immediately.
pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> ApiResult<StatusCode> {
    let session_id = ctx.session_id;
    state.db_call(move |db| db.delete_session(session_id)).await?;
    info!("{} ({}) signed out", ctx.name, ctx.profile_id);
    Ok(StatusCode::NO_CONTENT)
}

fn create_token(state: &AppStateInner, profile_id: Uuid, session_id: Uuid) -> anyhow::Result<String> {
    let expires_at = chrono::Duration::try_days(state.token_ttl_days)
        .and_then(|ttl| chrono::Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| anyhow::anyhow!("token lifetime of {} days is out of range", state.token_ttl_days))?;
    let claims = Claims {
        sub: profile_id,
        sid: session_id,
        exp: usize::try_from(expires_at.timestamp())?,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )?;

    Ok(token)
}

pub(crate) fn validate_display_name(raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > 64 {
        return Err(ApiError::validation("name must be 1-64 characters"));
    }
    Ok(name.to_string())
}
