use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Feedback, Profile, Role, Room};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway handshake.
/// `sid` names the server-side session row; a token is only honoured while
/// that row exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub sid: Uuid,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub display_name: String,
    /// Defaults to student. Admin cannot be self-assigned.
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub profile: Profile,
}

// -- Profiles --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetRoleRequest {
    pub role: Role,
}

// -- Rooms --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomRequest {
    pub topic: String,
    pub domain: String,
    #[serde(default)]
    pub meeting_url: Option<String>,
}

/// Result of an admission. The meeting link is only handed out here, after
/// the caller is on the roster.
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinResponse {
    pub admitted: bool,
    pub room: Room,
    pub meeting_url: Option<String>,
}

// -- Feedback --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitFeedbackRequest {
    pub student_id: Uuid,
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub feedback: Feedback,
    /// Rated profile's balance after this rating.
    pub points: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
