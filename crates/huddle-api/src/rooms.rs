use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use huddle_db::roster::{AdmitOutcome, CloseOutcome, LeaveOutcome};
use huddle_gateway::session::SessionContext;
use huddle_gateway::view::load_room_view;
use huddle_types::api::{CreateRoomRequest, JoinResponse};
use huddle_types::events::ChangeEvent;
use huddle_types::models::{Role, Room, RoomStatus};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct RoomQuery {
    pub status: Option<RoomStatus>,
}

pub async fn list_rooms(
    State(state): State<AppState>,
    Query(query): Query<RoomQuery>,
) -> ApiResult<Json<Vec<Room>>> {
    let rooms = state.db_call(move |db| db.list_rooms(query.status)).await?;
    Ok(Json(rooms))
}

pub async fn create_room(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Json(req): Json<CreateRoomRequest>,
) -> ApiResult<impl IntoResponse> {
    if !ctx.role.can_evaluate() {
        return Err(ApiError::Forbidden);
    }

    let topic = req.topic.trim().to_string();
    let domain = req.domain.trim().to_string();
    if topic.is_empty() || topic.chars().count() > 200 {
        return Err(ApiError::validation("topic must be 1-200 characters"));
    }
    if domain.is_empty() || domain.chars().count() > 64 {
        return Err(ApiError::validation("domain must be 1-64 characters"));
    }
    let meeting_url = match req.meeting_url.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(url) if url.starts_with("https://") || url.starts_with("http://") => Some(url.to_string()),
        Some(_) => return Err(ApiError::validation("meeting_url must be an http(s) URL")),
    };

    let host_id = ctx.profile_id;
    let room = state
        .db_call(move |db| {
            db.create_room(Uuid::new_v4(), &topic, &domain, host_id, meeting_url.as_deref())
        })
        .await?;

    Ok((StatusCode::CREATED, Json(room)))
}

/// View load. The first load of a waiting room makes it live.
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<Json<Room>> {
    let dispatcher = state.dispatcher.clone();
    let (room, _feedback) = state
        .db_call(move |db| load_room_view(db, &dispatcher, room_id))
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(room))
}

/// Admission. The meeting link is returned only once the caller is on the
/// roster.
pub async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(ctx): Extension<SessionContext>,
) -> ApiResult<Json<JoinResponse>> {
    let candidate = ctx.participant();
    let outcome = state
        .db_call(move |db| db.admit_participant(room_id, &candidate))
        .await?;

    let (admitted, room) = match outcome {
        AdmitOutcome::Admitted(room) => {
            state.dispatcher.publish(ChangeEvent::RoomUpdated { room: room.clone() });
            (true, room)
        }
        AdmitOutcome::AlreadyPresent(room) => (false, room),
        AdmitOutcome::Closed(_) => {
            warn!("{} tried to join completed room {}", ctx.profile_id, room_id);
            return Err(ApiError::Conflict("room has ended".into()));
        }
        AdmitOutcome::NotFound => return Err(ApiError::NotFound),
    };

    Ok(Json(JoinResponse {
        admitted,
        meeting_url: room.meeting_url.clone(),
        room,
    }))
}

pub async fn leave_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(ctx): Extension<SessionContext>,
) -> ApiResult<Json<Room>> {
    let profile_id = ctx.profile_id;
    let outcome = state
        .db_call(move |db| db.remove_participant(room_id, profile_id))
        .await?;

    match outcome {
        LeaveOutcome::Left(room) => {
            state.dispatcher.publish(ChangeEvent::RoomUpdated { room: room.clone() });
            Ok(Json(room))
        }
        LeaveOutcome::NotPresent(_) => Err(ApiError::Conflict("not on the roster".into())),
        LeaveOutcome::NotFound => Err(ApiError::NotFound),
    }
}

/// Explicit close, by the host or an admin. Closing twice is not an error.
pub async fn close_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(ctx): Extension<SessionContext>,
) -> ApiResult<Json<Room>> {
    let room = state
        .db_call(move |db| db.get_room(room_id))
        .await?
        .ok_or(ApiError::NotFound)?;
    if room.host_id != ctx.profile_id && ctx.role != Role::Admin {
        return Err(ApiError::Forbidden);
    }

    match state.db_call(move |db| db.close_room(room_id)).await? {
        CloseOutcome::Closed(room) => {
            info!("{} closed room {}", ctx.profile_id, room_id);
            state.dispatcher.publish(ChangeEvent::RoomUpdated { room: room.clone() });
            Ok(Json(room))
        }
        CloseOutcome::AlreadyClosed(room) => Ok(Json(room)),
        CloseOutcome::NotFound => Err(ApiError::NotFound),
    }
}
