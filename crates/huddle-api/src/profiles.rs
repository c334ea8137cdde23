use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;
use uuid::Uuid;

use huddle_gateway::session::SessionContext;
use huddle_types::api::{SetRoleRequest, UpdateProfileRequest};
use huddle_types::models::{Feedback, Profile, Role};

use crate::auth::{AppState, validate_display_name};
use crate::error::{ApiError, ApiResult};

pub async fn get_me(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> ApiResult<Json<Profile>> {
    let id = ctx.profile_id;
    let profile = state
        .db_call(move |db| db.get_profile(id))
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(profile))
}

/// Rename self. Rooms joined earlier keep the old name on their rosters.
pub async fn update_me(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<Profile>> {
    let name = validate_display_name(&req.name)?;
    let id = ctx.profile_id;
    let profile = state
        .db_call(move |db| db.update_profile_name(id, &name))
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(profile))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(profile_id): Path<Uuid>,
) -> ApiResult<Json<Profile>> {
    let profile = state
        .db_call(move |db| db.get_profile(profile_id))
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(profile))
}

pub async fn set_role(
    State(state): State<AppState>,
    Path(profile_id): Path<Uuid>,
    Extension(ctx): Extension<SessionContext>,
    Json(req): Json<SetRoleRequest>,
) -> ApiResult<Json<Profile>> {
    if ctx.role != Role::Admin {
        return Err(ApiError::Forbidden);
    }

    let role = req.role;
    let profile = state
        .db_call(move |db| db.set_profile_role(profile_id, role))
        .await?
        .ok_or(ApiError::NotFound)?;

    info!("{} set role of {} to {}", ctx.profile_id, profile_id, role);
    Ok(Json(profile))
}

/// Feedback the profile has received, newest first.
pub async fn received_feedback(
    State(state): State<AppState>,
    Path(profile_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Feedback>>> {
    let feedback = state
        .db_call(move |db| {
            if db.get_profile(profile_id)?.is_none() {
                return Ok(None);
            }
            db.list_feedback_for_student(profile_id).map(Some)
        })
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(feedback))
}
