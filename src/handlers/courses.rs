//! Courses and the postings that make a course available to a rank.

use axum::Json;
use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::instrument;

use super::util::{JsonBody, ResourceId, created};
use crate::error::AppResult;
use crate::filters::{Filters, ListSpec, QueryParams};
use crate::models::{
    Course, CoursePosting, CreateCoursePostingRequest, CreateCourseRequest,
    UpdateCoursePostingRequest, UpdateCourseRequest,
};
use crate::state::AppState;
use crate::store::{matches_exact, text_matches};
use crate::validation::Validator;

const COURSES: ListSpec = ListSpec {
    default_page_size: 10,
    sort_safe_list: &["id", "course"],
};

const COURSE_POSTINGS: ListSpec = ListSpec {
    default_page_size: 10,
    sort_safe_list: &[
        "id",
        "course_id",
        "posting_id",
        "mandatory",
        "credithours",
        "rank_id",
    ],
};

// =============================================================================
// Courses
// =============================================================================

#[instrument(skip(state, body))]
pub async fn create_course(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateCourseRequest>,
) -> AppResult<Response> {
    let course = Course {
        id: 0,
        course: body.course,
        description: body.description,
        created_at: Utc::now(),
    };

    let mut v = Validator::new();
    course.validate(&mut v);
    v.finish()?;

    let course = state.db.courses.insert(course)?;
    Ok(created(
        format!("/v1/courses/{}", course.id),
        json!({ "course": course }),
    ))
}

#[instrument(skip(state))]
pub async fn show_course(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> AppResult<Json<Value>> {
    let course = state.db.courses.get(id)?;
    Ok(Json(json!({ "course": course })))
}

#[instrument(skip(state, body))]
pub async fn update_course(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
    JsonBody(body): JsonBody<UpdateCourseRequest>,
) -> AppResult<Json<Value>> {
    let mut course = state.db.courses.get(id)?;
    body.apply(&mut course);

    let mut v = Validator::new();
    course.validate(&mut v);
    v.finish()?;

    let course = state.db.courses.update(&course)?;
    Ok(Json(json!({ "course": course })))
}

#[instrument(skip(state))]
pub async fn delete_course(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> AppResult<Json<Value>> {
    state.db.courses.delete(id)?;
    Ok(Json(json!({ "message": "course successfully deleted" })))
}

/// List courses with full-text `course` and `description` filters.
#[instrument(skip(state))]
pub async fn list_courses(
    State(state): State<AppState>,
    query: QueryParams,
) -> AppResult<Json<Value>> {
    let mut v = Validator::new();
    let name = query.text("course");
    let description = query.text("description");
    let filters = Filters::parse(&query, &COURSES, &mut v);
    v.finish()?;

    let (courses, metadata) = state.db.courses.list(&filters, |c| {
        text_matches(&c.course, name) && text_matches(&c.description, description)
    })?;

    Ok(Json(json!({ "courses": courses, "@metadata": metadata })))
}

// =============================================================================
// Course Postings
// =============================================================================

#[instrument(skip(state, body))]
pub async fn create_course_posting(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateCoursePostingRequest>,
) -> AppResult<Response> {
    let posting = CoursePosting {
        id: 0,
        course_id: body.course_id,
        posting_id: body.posting_id,
        mandatory: body.mandatory,
        credithours: body.credithours,
        rank_id: body.rank_id,
    };

    let mut v = Validator::new();
    posting.validate(&mut v);
    v.finish()?;

    let posting = state.db.course_postings.insert(posting)?;
    Ok(created(
        format!("/v1/course/posting/{}", posting.id),
        json!({ "course_posting": posting }),
    ))
}

#[instrument(skip(state))]
pub async fn show_course_posting(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> AppResult<Json<Value>> {
    let posting = state.db.course_postings.get(id)?;
    Ok(Json(json!({ "course_posting": posting })))
}

#[instrument(skip(state, body))]
pub async fn update_course_posting(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
    JsonBody(body): JsonBody<UpdateCoursePostingRequest>,
) -> AppResult<Json<Value>> {
    let mut posting = state.db.course_postings.get(id)?;
    body.apply(&mut posting);

    let mut v = Validator::new();
    posting.validate(&mut v);
    v.finish()?;

    let posting = state.db.course_postings.update(&posting)?;
    Ok(Json(json!({ "course_posting": posting })))
}

#[instrument(skip(state))]
pub async fn delete_course_posting(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> AppResult<Json<Value>> {
    state.db.course_postings.delete(id)?;
    Ok(Json(
        json!({ "message": "course posting successfully deleted" }),
    ))
}

/// List postings; every column is an optional exact-match filter.
#[instrument(skip(state))]
pub async fn list_course_postings(
    State(state): State<AppState>,
    query: QueryParams,
) -> AppResult<Json<Value>> {
    let mut v = Validator::new();
    let course_id = query.optional_integer("course_id", &mut v);
    let posting_id = query.optional_integer("posting_id", &mut v);
    let mandatory = query.optional_bool("mandatory", &mut v);
    let credithours = query.optional_integer("credithours", &mut v);
    let rank_id = query.optional_integer("rank_id", &mut v);
    let filters = Filters::parse(&query, &COURSE_POSTINGS, &mut v);
    v.finish()?;

    let (postings, metadata) = state.db.course_postings.list(&filters, |p| {
        matches_exact(course_id, p.course_id)
            && matches_exact(posting_id, p.posting_id)
            && matches_exact(mandatory, p.mandatory)
            && matches_exact(credithours, p.credithours)
            && matches_exact(rank_id, p.rank_id)
    })?;

    Ok(Json(
        json!({ "course_postings": postings, "@metadata": metadata }),
    ))
}
