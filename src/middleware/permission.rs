//! Per-route permission gate.
//!
//! Applied with `route_layer` so it only runs for matched routes:
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/v1/courses", post(create_course))
//!     .route_layer(RequirePermission::new(db, Permission::CourseWrite))
//! ```
//!
//! Checks run in this order, stopping at the first failure:
//! anonymous (401), not activated (403), grant lookup failure (500),
//! permission missing (403).

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::debug;

use super::auth::Identity;
use crate::error::AppError;
use crate::models::Permission;
use crate::store::Database;

fn authorize(db: &Database, identity: Option<&Identity>, required: Permission) -> Result<(), AppError> {
    let user = identity
        .and_then(Identity::user)
        .ok_or(AppError::AuthenticationRequired)?;

    if !user.activated {
        return Err(AppError::InactiveAccount);
    }

    if !db.permissions.for_user(user.id)?.includes(required) {
        debug!(user_id = user.id, permission = %required, "Permission denied");
        return Err(AppError::NotPermitted);
    }

    Ok(())
}

/// Layer that rejects callers lacking `permission`.
#[derive(Clone)]
pub struct RequirePermission {
    db: Arc<Database>,
    permission: Permission,
}

impl RequirePermission {
    pub fn new(db: Arc<Database>, permission: Permission) -> Self {
        Self { db, permission }
    }
}

impl<S> Layer<S> for RequirePermission {
    type Service = RequirePermissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequirePermissionService {
            inner,
            db: self.db.clone(),
            permission: self.permission,
        }
    }
}

#[derive(Clone)]
pub struct RequirePermissionService<S> {
    inner: S,
    db: Arc<Database>,
    permission: Permission,
}

impl<S> Service<Request<Body>> for RequirePermissionService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let db = self.db.clone();
        let permission = self.permission;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match authorize(&db, req.extensions().get::<Identity>(), permission) {
                Ok(()) => inner.call(req).await,
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}
