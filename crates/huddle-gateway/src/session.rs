use std::sync::Arc;

use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{debug, warn};
use uuid::Uuid;

use huddle_db::Database;
use huddle_types::api::Claims;
use huddle_types::models::{Participant, Profile, Role};

/// The caller's identity, resolved once per request or connection and
/// passed explicitly to whatever needs it. Created at sign-in, invalid once
/// the session row is deleted at sign-out.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub profile_id: Uuid,
    pub name: String,
    pub role: Role,
}

impl SessionContext {
    pub fn new(session_id: Uuid, profile: &Profile) -> Self {
        Self {
            session_id,
            profile_id: profile.id,
            name: profile.name.clone(),
            role: profile.role,
        }
    }

    /// Roster entry for this caller as of now.
    pub fn participant(&self) -> Participant {
        Participant {
            id: self.profile_id,
            name: self.name.clone(),
            role: self.role,
        }
    }
}

pub fn decode_claims(token: &str, jwt_secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| debug!("Rejected token: {}", e))
    .ok()
}

/// Resolve a bearer token against the store. `Ok(None)` means the token is
/// invalid, expired, signed out, or its profile is gone.
pub fn resolve_blocking(
    db: &Database,
    jwt_secret: &str,
    token: &str,
) -> anyhow::Result<Option<SessionContext>> {
    let Some(claims) = decode_claims(token, jwt_secret) else {
        return Ok(None);
    };
    if !db.session_is_active(claims.sid, claims.sub)? {
        debug!("Session {} is no longer active", claims.sid);
        return Ok(None);
    }
    let Some(profile) = db.get_profile(claims.sub)? else {
        warn!("Session {} points at missing profile {}", claims.sid, claims.sub);
        return Ok(None);
    };
    Ok(Some(SessionContext::new(claims.sid, &profile)))
}

/// [`resolve_blocking`] off the async runtime.
pub async fn resolve(
    db: Arc<Database>,
    jwt_secret: String,
    token: String,
) -> anyhow::Result<Option<SessionContext>> {
    tokio::task::spawn_blocking(move || resolve_blocking(&db, &jwt_secret, &token)).await?
}
