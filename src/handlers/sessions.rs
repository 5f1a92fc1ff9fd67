//! Training sessions, trainee enrolments (user sessions) and attendance.

use axum::Json;
use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::instrument;

use super::util::{ExpectedVersion, JsonBody, ResourceId, created};
use crate::error::{AppError, AppResult};
use crate::filters::{Filters, ListSpec, QueryParams};
use crate::models::{
    Attendance, CreateAttendanceRequest, CreateSessionRequest, CreateUserSessionRequest, Session,
    UpdateAttendanceRequest, UpdateSessionRequest, UpdateUserSessionRequest, UserSession,
};
use crate::state::AppState;
use crate::store::matches_exact;
use crate::validation::Validator;

const SESSIONS: ListSpec = ListSpec {
    default_page_size: 10,
    sort_safe_list: &["id"],
};

const USER_SESSIONS: ListSpec = ListSpec {
    default_page_size: 10,
    sort_safe_list: &["id", "trainee_id", "session_id", "grade"],
};

// =============================================================================
// Sessions
// =============================================================================

#[instrument(skip(state, body))]
pub async fn create_session(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateSessionRequest>,
) -> AppResult<Response> {
    let session = Session {
        id: 0,
        course_id: body.course_id,
        formation_id: body.formation_id,
        facilitator_id: body.facilitator_id,
        created_at: Utc::now(),
    };

    let mut v = Validator::new();
    session.validate(&mut v);
    v.finish()?;

    let session = state.db.sessions.insert(session)?;
    Ok(created(
        format!("/v1/session/{}", session.id),
        json!({ "session": session }),
    ))
}

#[instrument(skip(state))]
pub async fn show_session(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> AppResult<Json<Value>> {
    let session = state.db.sessions.get(id)?;
    Ok(Json(json!({ "session": session })))
}

#[instrument(skip(state, body))]
pub async fn update_session(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
    JsonBody(body): JsonBody<UpdateSessionRequest>,
) -> AppResult<Json<Value>> {
    let mut session = state.db.sessions.get(id)?;
    body.apply(&mut session);

    let mut v = Validator::new();
    session.validate(&mut v);
    v.finish()?;

    let session = state.db.sessions.update(&session)?;
    Ok(Json(json!({ "session": session })))
}

#[instrument(skip(state))]
pub async fn delete_session(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> AppResult<Json<Value>> {
    state.db.sessions.delete(id)?;
    Ok(Json(json!({ "message": "session successfully deleted" })))
}

#[instrument(skip(state))]
pub async fn list_sessions(
    State(state): State<AppState>,
    query: QueryParams,
) -> AppResult<Json<Value>> {
    let mut v = Validator::new();
    let filters = Filters::parse(&query, &SESSIONS, &mut v);
    v.finish()?;

    let (sessions, metadata) = state.db.sessions.list(&filters, |_| true)?;
    Ok(Json(json!({ "sessions": sessions, "@metadata": metadata })))
}

// =============================================================================
// User Sessions
// =============================================================================

#[instrument(skip(state, body))]
pub async fn create_user_session(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateUserSessionRequest>,
) -> AppResult<Response> {
    let record = UserSession {
        id: 0,
        trainee_id: body.trainee_id,
        session_id: body.session_id,
        credithours_completed: body.credithours_completed,
        grade: body.grade,
        feedback: body.feedback,
        version: 0,
        created_at: Utc::now(),
    };

    let mut v = Validator::new();
    record.validate(&mut v);
    v.finish()?;

    let record = state.db.user_sessions.insert(record)?;
    Ok(created(
        format!("/v1/user_session/{}", record.id),
        json!({ "user_session": record }),
    ))
}

#[instrument(skip(state))]
pub async fn show_user_session(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> AppResult<Json<Value>> {
    let record = state.db.user_sessions.get(id)?;
    Ok(Json(json!({ "user_session": record })))
}

/// Partial update guarded by the record version; a concurrent writer gets 409.
///
/// With `X-Expected-Version` the check is made against the version the
/// client read instead of the one loaded here.
#[instrument(skip(state, body))]
pub async fn update_user_session(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
    ExpectedVersion(expected): ExpectedVersion,
    JsonBody(body): JsonBody<UpdateUserSessionRequest>,
) -> AppResult<Json<Value>> {
    let mut record = state.db.user_sessions.get(id)?;
    if let Some(expected) = expected {
        record.version = expected;
    }
    body.apply(&mut record);

    let mut v = Validator::new();
    record.validate(&mut v);
    v.finish()?;

    let record = state.db.user_sessions.update(&record)?;
    Ok(Json(json!({ "user_session": record })))
}

#[instrument(skip(state))]
pub async fn delete_user_session(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> AppResult<Json<Value>> {
    state.db.user_sessions.delete(id)?;
    Ok(Json(json!({
        "message": format!("user session {id} successfully deleted")
    })))
}

#[instrument(skip(state))]
pub async fn list_user_sessions(
    State(state): State<AppState>,
    query: QueryParams,
) -> AppResult<Json<Value>> {
    let mut v = Validator::new();
    let trainee_id = query.optional_integer("trainee_id", &mut v);
    let session_id = query.optional_integer("session_id", &mut v);
    let filters = Filters::parse(&query, &USER_SESSIONS, &mut v);
    v.finish()?;

    let (records, metadata) = state.db.user_sessions.list(&filters, |r| {
        matches_exact(trainee_id, r.trainee_id) && matches_exact(session_id, r.session_id)
    })?;

    Ok(Json(
        json!({ "user_sessions": records, "@metadata": metadata }),
    ))
}

// =============================================================================
// Attendance
// =============================================================================

#[instrument(skip(state, body))]
pub async fn create_attendance(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateAttendanceRequest>,
) -> AppResult<Response> {
    let mut v = Validator::new();
    body.validate(&mut v);
    v.finish()?;
    let date = body
        .date
        .ok_or_else(|| AppError::field("date", "must be provided"))?;

    let attendance = state.db.attendance.insert(Attendance {
        id: 0,
        user_session_id: body.user_session_id,
        attendance: body.attendance,
        date,
    })?;

    Ok(created(
        format!("/v1/attendance/{}", attendance.id),
        json!({ "attendance": attendance }),
    ))
}

#[instrument(skip(state))]
pub async fn show_attendance(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> AppResult<Json<Value>> {
    let attendance = state.db.attendance.get(id)?;
    Ok(Json(json!({ "attendance": attendance })))
}

#[instrument(skip(state, body))]
pub async fn update_attendance(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
    JsonBody(body): JsonBody<UpdateAttendanceRequest>,
) -> AppResult<Json<Value>> {
    let mut attendance = state.db.attendance.get(id)?;
    body.apply(&mut attendance);

    let mut v = Validator::new();
    v.positive_id("user_session_id", attendance.user_session_id);
    v.finish()?;

    let attendance = state.db.attendance.update(&attendance)?;
    Ok(Json(json!({ "attendance": attendance })))
}
