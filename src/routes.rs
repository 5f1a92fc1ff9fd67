//! Application routing configuration with middleware stack.
//!
//! # Layering
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← x-request-id set or kept, echoed on the response
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← one span per request (method, uri, request id)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │    Pipeline      │ ← Metrics → Panic Guard → CORS → Rate Limit → Authenticate
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Router       │ ← 404 / 405 fallbacks, 256 kB body limit
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ RequirePermission│ ← per route group, 401 / 403
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! Routes are grouped by the permission they require; groups sharing a path
//! (e.g. `GET` and `PATCH /v1/courses/{id}`) are merged into one method router.

use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, Request};
use axum::routing::{delete, get, patch, post, put};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info_span;

use crate::error::AppError;
use crate::handlers::{self, util::MAX_BODY_BYTES};
use crate::middleware::request_id::REQUEST_ID_HEADER;
use crate::middleware::{MakeRandomRequestId, RequirePermission, apply_pipeline};
use crate::models::Permission;
use crate::state::AppState;

async fn not_found() -> AppError {
    AppError::NotFound
}

async fn method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed(method)
}

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    let guard = |permission: Permission| RequirePermission::new(state.db.clone(), permission);

    // =========================================================================
    // Public
    // =========================================================================
    let public = Router::new()
        .route("/v1/healthcheck", get(handlers::healthcheck))
        .route(
            "/v1/observability/course/metrics",
            get(handlers::metrics),
        )
        .route("/v1/users", post(handlers::register_user))
        .route("/v1/users/activated", put(handlers::activate_user))
        .route(
            "/v1/tokens/authentication",
            post(handlers::create_authentication_token),
        );

    // =========================================================================
    // Users
    // =========================================================================
    let users_read = Router::new()
        .route("/v1/users/details", get(handlers::list_users))
        .route_layer(guard(Permission::UsersRead));

    let users_write = Router::new()
        .route("/v1/users/update/{id}", patch(handlers::update_user))
        .route(
            "/v1/users/delete/{id}",
            delete(handlers::delete_user),
        )
        .route(
            "/v1/users/update-password/{id}",
            patch(handlers::update_password),
        )
        .route_layer(guard(Permission::UsersWrite));

    // =========================================================================
    // Roles and user roles
    // =========================================================================
    let role_read = Router::new()
        .route("/v1/roles", get(handlers::list_roles))
        .route("/v1/roles/{id}", get(handlers::show_role))
        .route("/v1/users/user_roles", get(handlers::list_users_with_roles))
        .route("/v1/users/user_roles/{id}", get(handlers::user_roles))
        .route_layer(guard(Permission::RoleRead));

    let role_write = Router::new()
        .route("/v1/roles", post(handlers::create_role))
        .route(
            "/v1/roles/{id}",
            patch(handlers::update_role).delete(handlers::delete_role),
        )
        .route("/v1/users/assign-role", post(handlers::assign_role))
        .route(
            "/v1/users/update-role/{id}",
            patch(handlers::change_user_role),
        )
        .route(
            "/v1/users/delete-role/{id}",
            delete(handlers::revoke_user_role),
        )
        .route_layer(guard(Permission::RoleWrite));

    // =========================================================================
    // Facilitator ratings
    // =========================================================================
    let rating_read = Router::new()
        .route("/v1/facilitator-rating", get(handlers::list_ratings))
        .route("/v1/facilitator-rating/{id}", get(handlers::show_rating))
        .route_layer(guard(Permission::FacilitatorRatingRead));

    let rating_write = Router::new()
        .route("/v1/facilitator-rating", post(handlers::create_rating))
        .route_layer(guard(Permission::FacilitatorRatingWrite));

    // =========================================================================
    // Courses and postings
    // =========================================================================
    let course_read = Router::new()
        .route("/v1/courses", get(handlers::list_courses))
        .route("/v1/courses/{id}", get(handlers::show_course))
        .route_layer(guard(Permission::CourseRead));

    let course_write = Router::new()
        .route("/v1/courses", post(handlers::create_course))
        .route(
            "/v1/courses/{id}",
            patch(handlers::update_course).delete(handlers::delete_course),
        )
        .route_layer(guard(Permission::CourseWrite));

    let posting_read = Router::new()
        .route("/v1/course/posting", get(handlers::list_course_postings))
        .route("/v1/course/posting/{id}", get(handlers::show_course_posting))
        .route_layer(guard(Permission::CoursePostingRead));

    let posting_write = Router::new()
        .route("/v1/course/posting", post(handlers::create_course_posting))
        .route(
            "/v1/course/posting/{id}",
            patch(handlers::update_course_posting).delete(handlers::delete_course_posting),
        )
        .route_layer(guard(Permission::CoursePostingWrite));

    // =========================================================================
    // Sessions, user sessions and attendance
    // =========================================================================
    let session_read = Router::new()
        .route("/v1/session", get(handlers::list_sessions))
        .route("/v1/session/{id}", get(handlers::show_session))
        .route_layer(guard(Permission::SessionRead));

    let session_write = Router::new()
        .route("/v1/session", post(handlers::create_session))
        .route(
            "/v1/session/{id}",
            patch(handlers::update_session).delete(handlers::delete_session),
        )
        .route_layer(guard(Permission::SessionWrite));

    let user_session_read = Router::new()
        .route("/v1/user_session", get(handlers::list_user_sessions))
        .route("/v1/user_session/{id}", get(handlers::show_user_session))
        .route("/v1/attendance/{id}", get(handlers::show_attendance))
        .route_layer(guard(Permission::UserSessionRead));

    let user_session_write = Router::new()
        .route("/v1/user_session", post(handlers::create_user_session))
        .route(
            "/v1/user_session/{id}",
            patch(handlers::update_user_session).delete(handlers::delete_user_session),
        )
        .route("/v1/attendance/{id}", patch(handlers::update_attendance))
        .route_layer(guard(Permission::UserSessionWrite));

    let attendance_write = Router::new()
        .route("/v1/attendance", post(handlers::create_attendance))
        .route_layer(guard(Permission::AttendanceWrite));

    let router = Router::new()
        .merge(public)
        .merge(users_read)
        .merge(users_write)
        .merge(role_read)
        .merge(role_write)
        .merge(rating_read)
        .merge(rating_write)
        .merge(course_read)
        .merge(course_write)
        .merge(posting_read)
        .merge(posting_write)
        .merge(session_read)
        .merge(session_write)
        .merge(user_session_read)
        .merge(user_session_write)
        .merge(attendance_write)
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state.clone());

    apply_pipeline(router, &state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRandomRequestId))
}
