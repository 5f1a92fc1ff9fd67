//! Bearer token authentication.
//!
//! Resolves the caller and stores an [`Identity`] in the request extensions.
//! It never rejects a request for lacking credentials; that is the job of
//! [`RequirePermission`](super::permission::RequirePermission) on the routes
//! that need an identity.
//!
//! ```text
//! no Authorization header        ─▶ Identity::Anonymous
//! "Bearer <26 chars A-Z2-7>"     ─▶ token lookup ─▶ Identity::User
//! anything else                  ─▶ 401 + WWW-Authenticate: Bearer (no lookup)
//! unknown / expired token        ─▶ 401 + WWW-Authenticate: Bearer
//! store failure                  ─▶ 500
//! ```
//!
//! Every response gets `Vary: Authorization`.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, VARY};
use axum::http::{HeaderValue, Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::{Scope, User};
use crate::store::{Database, StoreError};
use crate::validation::is_token_shaped;

/// Who is making the request.
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    User(Arc<User>),
}

impl Identity {
    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user),
        }
    }
}

/// Extract the token from an `Authorization` value of exactly `Bearer <token>`.
fn bearer_token(value: &HeaderValue) -> Option<&str> {
    let value = value.to_str().ok()?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}

/// Resolve the identity for a request's headers.
fn authenticate(db: &Database, header: Option<&HeaderValue>) -> Result<Identity, AppError> {
    let Some(header) = header else {
        return Ok(Identity::Anonymous);
    };

    let token = bearer_token(header)
        .filter(|token| is_token_shaped(token))
        .ok_or(AppError::InvalidAuthenticationToken)?;

    match db.user_for_token(Scope::Authentication, token) {
        Ok(user) => Ok(Identity::User(Arc::new(user))),
        Err(StoreError::NotFound) => Err(AppError::InvalidAuthenticationToken),
        Err(e) => Err(e.into()),
    }
}

/// Authentication layer for the Tower middleware stack.
#[derive(Clone)]
pub struct AuthenticateLayer {
    db: Arc<Database>,
}

impl AuthenticateLayer {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl<S> Layer<S> for AuthenticateLayer {
    type Service = AuthenticateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthenticateService {
            inner,
            db: self.db.clone(),
        }
    }
}

/// Authentication service wrapper.
#[derive(Clone)]
pub struct AuthenticateService<S> {
    inner: S,
    db: Arc<Database>,
}

impl<S> Service<Request<Body>> for AuthenticateService<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let db = self.db.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = match authenticate(&db, req.headers().get(AUTHORIZATION)) {
                Ok(identity) => {
                    if let Some(user) = identity.user() {
                        debug!(user_id = user.id, "Request authenticated");
                    }
                    req.extensions_mut().insert(identity);
                    inner.call(req).await?
                }
                Err(err) => {
                    if matches!(err, AppError::InvalidAuthenticationToken) {
                        warn!(path = %req.uri().path(), "Rejected bearer credential");
                    }
                    err.into_response()
                }
            };

            response
                .headers_mut()
                .append(VARY, HeaderValue::from_static("Authorization"));
            Ok(response)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::http::header::WWW_AUTHENTICATE;
    use chrono::Utc;
    use tower::ServiceExt;

    use super::*;

    fn user(activated: bool) -> User {
        User {
            id: 0,
            regulation_number: "RN-1".to_string(),
            username: "trainee".to_string(),
            fname: "Tess".to_string(),
            lname: "Trainee".to_string(),
            email: "tess@example.com".to_string(),
            gender: "f".to_string(),
            formation: 1,
            rank: 1,
            postings: 1,
            password_hash: String::new(),
            activated,
            version: 0,
            created_at: Utc::now(),
        }
    }

    /// Inner service that reports the identity it was handed.
    async fn echo(req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let body = match req.extensions().get::<Identity>() {
            Some(Identity::Anonymous) => "anonymous".to_string(),
            Some(Identity::User(user)) => format!("user:{}", user.id),
            None => "missing".to_string(),
        };
        Ok(Response::new(Body::from(body)))
    }

    async fn send(db: Arc<Database>, authorization: Option<&str>) -> (StatusCode, Response<Body>) {
        let service = AuthenticateLayer::new(db).layer(tower::service_fn(echo));
        let mut builder = Request::builder().uri("/v1/courses");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        let response = service.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        (response.status(), response)
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_header_is_anonymous() {
        let (status, response) = send(Arc::new(Database::new()), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.headers()[VARY], "Authorization");
        assert_eq!(body_text(response).await, "anonymous");
    }

    #[tokio::test]
    async fn test_valid_token_resolves_user() {
        let db = Arc::new(Database::new());
        let stored = db.users.insert(user(true)).unwrap();
        let token = db
            .tokens
            .issue(stored.id, Duration::from_secs(60), Scope::Authentication)
            .unwrap();

        let header = format!("Bearer {}", token.plaintext);
        let (status, response) = send(db, Some(&header)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body_text(response).await, format!("user:{}", stored.id));
    }

    #[tokio::test]
    async fn test_malformed_credentials_rejected_before_lookup() {
        let db = Arc::new(Database::new());

        for header in [
            "Bearer",
            "Bearer ",
            "bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            "Basic ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            "Bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ extra",
            "Bearer  ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            "Bearer short",
            "Bearer abcdefghijklmnopqrstuvwxyz",
            "Bearer ABCDEFGHIJKLMNOPQRSTUVWXY1",
        ] {
            let (status, response) = send(db.clone(), Some(header)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "header={header:?}");
            assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");
            assert_eq!(response.headers()[VARY], "Authorization");
        }

        assert_eq!(db.tokens.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_token_rejected_after_lookup() {
        let db = Arc::new(Database::new());
        let (status, _) = send(db.clone(), Some("Bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(db.tokens.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_activation_token_is_not_a_bearer_credential() {
        let db = Arc::new(Database::new());
        let stored = db.users.insert(user(false)).unwrap();
        let token = db
            .tokens
            .issue(stored.id, Duration::from_secs(60), Scope::Activation)
            .unwrap();

        let header = format!("Bearer {}", token.plaintext);
        let (status, _) = send(db, Some(&header)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_bearer_token_split() {
        let value = HeaderValue::from_static("Bearer abc");
        assert_eq!(bearer_token(&value), Some("abc"));
        assert_eq!(bearer_token(&HeaderValue::from_static("Bearer")), None);
        assert_eq!(bearer_token(&HeaderValue::from_static("Token abc")), None);
    }
}
