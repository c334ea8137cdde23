use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use huddle_db::feedback::NewFeedback;
use huddle_gateway::session::SessionContext;
use huddle_types::api::{FeedbackResponse, SubmitFeedbackRequest};
use huddle_types::events::ChangeEvent;
use huddle_types::models::{Feedback, MAX_RATING, MIN_RATING};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

const MAX_COMMENT_CHARS: usize = 2000;

pub async fn list_room_feedback(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Feedback>>> {
    let feedback = state
        .db_call(move |db| {
            if db.get_room(room_id)?.is_none() {
                return Ok(None);
            }
            db.list_feedback_for_room(room_id).map(Some)
        })
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(feedback))
}

/// Rate a participant. Only experts and admins may rate; the rated profile
/// earns ten points per star.
pub async fn submit_feedback(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(ctx): Extension<SessionContext>,
    Json(req): Json<SubmitFeedbackRequest>,
) -> ApiResult<impl IntoResponse> {
    if !ctx.role.can_evaluate() {
        return Err(ApiError::Forbidden);
    }

    // Validate before touching the store
    let rating = u8::try_from(req.rating)
        .ok()
        .filter(|r| (MIN_RATING..=MAX_RATING).contains(r))
        .ok_or_else(|| ApiError::validation("rating must be between 1 and 5"))?;
    if req.student_id.is_nil() {
        return Err(ApiError::validation("student_id is required"));
    }
    if req.student_id == ctx.profile_id {
        return Err(ApiError::validation("you cannot rate yourself"));
    }
    let comment = req
        .comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if comment.as_ref().is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS) {
        return Err(ApiError::validation("comment is too long"));
    }

    let author_id = ctx.profile_id;
    let student_id = req.student_id;
    let inserted = state
        .db_call(move |db| {
            if db.get_room(room_id)?.is_none() || db.get_profile(student_id)?.is_none() {
                return Ok(None);
            }
            db.insert_feedback(&NewFeedback {
                id: Uuid::new_v4(),
                room_id,
                student_id,
                author_id,
                rating,
                comment: comment.as_deref(),
            })
            .map(Some)
        })
        .await?;
    let (feedback, points) = inserted.ok_or(ApiError::NotFound)?;

    state.dispatcher.publish(ChangeEvent::FeedbackCreated {
        feedback: feedback.clone(),
        points,
    });

    Ok((StatusCode::CREATED, Json(FeedbackResponse { feedback, points })))
}
