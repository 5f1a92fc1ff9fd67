//! End-to-end tests against a real server on an ephemeral port.
//!
//! Each test starts its own server with its own in-process store, so tests
//! are independent and need no external services.
//!
//! Run with: `cargo test --test integration_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use training_records::config::AdminSeed;
use training_records::mailer::{Email, Mailer};
use training_records::{AppState, Config, build_router};

const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "admin-password";
const TRUSTED_ORIGIN: &str = "https://records.example";

/// Mailer that keeps every message for inspection.
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<(String, Email)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, recipient: &str, email: &Email) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), email.clone()));
        Ok(())
    }
}

impl RecordingMailer {
    fn activation_token_for(&self, recipient: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == recipient)
            .map(|(_, email)| match email {
                Email::Welcome {
                    activation_token, ..
                } => activation_token.clone(),
            })
    }
}

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        limiter_enabled: false,
        cors_trusted_origins: vec![TRUSTED_ORIGIN.to_string()],
        shutdown_timeout: Duration::from_secs(1),
        admin: Some(AdminSeed {
            username: "admin".to_string(),
            email: ADMIN_EMAIL.to_string(),
            password: ADMIN_PASSWORD.to_string(),
        }),
        ..Config::default()
    }
}

/// Test fixture that owns a running server
struct TestFixture {
    base_url: String,
    client: Client,
    mailer: Arc<RecordingMailer>,
    state: AppState,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Start the application server with `config`.
    ///
    /// The listener is bound before the server task is spawned, so the
    /// server accepts connections as soon as this returns.
    async fn with_config(config: Config) -> Self {
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::with_mailer(config, mailer.clone());
        state.seed_admin().await.expect("Failed to seed admin");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind ephemeral port");
        let addr = listener.local_addr().expect("Failed to get local address");
        let app = build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Server failed");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: format!("http://{addr}"),
            client,
            mailer,
            state,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, reqwest::header::HeaderMap, Value) {
        let mut request = self.client.request(method, self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.expect("Request failed");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, headers, body)
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let (status, _, body) = self
            .request(
                Method::POST,
                "/v1/tokens/authentication",
                None,
                Some(json!({"email": email, "password": password})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "login failed: {body}");
        body["authentication_token"]["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn admin_token(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }
}

fn course(name: &str) -> Value {
    json!({"course": name, "description": "Course description"})
}

// ============================================================================
// Health & Metrics
// ============================================================================

#[tokio::test]
async fn test_healthcheck() {
    let fixture = TestFixture::new().await;
    let (status, _, body) = fixture
        .request(Method::GET, "/v1/healthcheck", None, None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "available");
    assert_eq!(body["system_info"]["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_metrics_count_responses_by_status() {
    let fixture = TestFixture::new().await;
    fixture.request(Method::GET, "/v1/healthcheck", None, None).await;
    fixture.request(Method::GET, "/v1/missing", None, None).await;

    let (status, _, body) = fixture
        .request(Method::GET, "/v1/observability/course/metrics", None, None)
        .await;

    assert_eq!(status, StatusCode::OK);
    let requests = &body["requests"];
    // The metrics request itself is received but not yet sent
    assert_eq!(requests["total_requests_received"], 3);
    assert_eq!(requests["total_responses_sent"], 2);
    assert_eq!(requests["total_responses_sent_by_status"]["200"], 1);
    assert_eq!(requests["total_responses_sent_by_status"]["404"], 1);
    assert!(body["tasks"].as_u64().unwrap() >= 1);
}

// ============================================================================
// Users, Activation & Tokens
// ============================================================================

#[tokio::test]
async fn test_register_activate_login_flow() {
    let fixture = TestFixture::new().await;
    let registration = json!({
        "regulation_number": "RN-1001",
        "username": "jdoe",
        "fname": "Jane",
        "lname": "Doe",
        "email": "jane@example.com",
        "gender": "f",
        "formation": 2,
        "rank": 3,
        "postings": 1,
        "password": "pa55word-long",
    });

    let (status, _, body) = fixture
        .request(Method::POST, "/v1/users", None, Some(registration.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["activated"], false);
    assert!(body["user"].get("password_hash").is_none());

    // Same email again
    let (status, _, body) = fixture
        .request(Method::POST, "/v1/users", None, Some(registration))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["error"]["email"],
        "a user with this email address already exists"
    );

    // The welcome mail is sent from a background task
    let mut activation = None;
    for _ in 0..50 {
        activation = fixture.mailer.activation_token_for("jane@example.com");
        if activation.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let activation = activation.expect("welcome email was not sent");

    // Not activated yet
    let token = fixture.login("jane@example.com", "pa55word-long").await;
    let (status, _, body) = fixture
        .request(Method::GET, "/v1/session", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["error"],
        "your user account must be activated to access this resource"
    );

    let (status, _, body) = fixture
        .request(
            Method::PUT,
            "/v1/users/activated",
            None,
            Some(json!({"token": activation})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["activated"], true);

    // Activation tokens are single use
    let (status, _, body) = fixture
        .request(
            Method::PUT,
            "/v1/users/activated",
            None,
            Some(json!({"token": activation})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["token"], "invalid or expired activation token");

    // Default grant is session:read only
    let (status, _, _) = fixture
        .request(Method::GET, "/v1/session", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = fixture
        .request(Method::GET, "/v1/courses", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_wrong_password_is_invalid_credentials() {
    let fixture = TestFixture::new().await;
    let (status, _, body) = fixture
        .request(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({"email": ADMIN_EMAIL, "password": "not-the-password"})),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid authentication credentials");
}

#[tokio::test]
async fn test_unknown_email_is_invalid_credentials() {
    let fixture = TestFixture::new().await;
    let (status, _, body) = fixture
        .request(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({"email": "nobody@example.com", "password": "any-password"})),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid authentication credentials");
}

#[tokio::test]
async fn test_seeded_admin_profile_can_be_updated() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin_token().await;

    let (status, _, body) = fixture
        .request(
            Method::PATCH,
            "/v1/users/update/1",
            Some(&admin),
            Some(json!({"rank": 4})),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "body={body}");
    assert_eq!(body["user"]["rank"], 4);
    assert_eq!(body["user"]["lname"], "Administrator");
}

#[tokio::test]
async fn test_malformed_bearer_rejected() {
    let fixture = TestFixture::new().await;

    for header in ["Bearer abc", "Token ABCDEFGHIJKLMNOPQRSTUVWXYZ", "Bearer"] {
        let response = fixture
            .client
            .get(fixture.url("/v1/healthcheck"))
            .header("Authorization", header)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "header={header}");
        assert_eq!(response.headers()["www-authenticate"], "Bearer");
    }
    assert_eq!(fixture.state.db.tokens.lookup_count(), 0);
}

#[tokio::test]
async fn test_deleted_user_loses_access() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin_token().await;

    let (status, _, _) = fixture
        .request(Method::DELETE, "/v1/users/delete/1", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = fixture
        .request(Method::GET, "/v1/courses", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Pagination & Filters
// ============================================================================

#[tokio::test]
async fn test_pagination_metadata() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin_token().await;
    for name in ["Alpha", "Bravo", "Charlie", "Delta", "Echo"] {
        let (status, _, _) = fixture
            .request(Method::POST, "/v1/courses", Some(&admin), Some(course(name)))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, _, body) = fixture
        .request(
            Method::GET,
            "/v1/courses?page=2&page_size=2&sort=-course",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["@metadata"],
        json!({
            "current_page": 2,
            "page_size": 2,
            "first_page": 1,
            "last_page": 3,
            "total_records": 5,
        })
    );
    let names: Vec<&str> = body["courses"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["course"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Charlie", "Bravo"]);

    // Past the last page: empty, current_page echoed
    let (_, _, body) = fixture
        .request(Method::GET, "/v1/courses?page=9&page_size=2", Some(&admin), None)
        .await;
    assert!(body["courses"].as_array().unwrap().is_empty());
    assert_eq!(body["@metadata"]["current_page"], 9);
    assert_eq!(body["@metadata"]["last_page"], 3);

    // No matches: all zero
    let (_, _, body) = fixture
        .request(Method::GET, "/v1/courses?course=zulu", Some(&admin), None)
        .await;
    assert_eq!(body["@metadata"]["total_records"], 0);
    assert_eq!(body["@metadata"]["current_page"], 0);
}

#[tokio::test]
async fn test_unsafe_sort_rejected() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin_token().await;

    for sort in ["description", "-created_at", "course;drop"] {
        let (status, _, body) = fixture
            .request(
                Method::GET,
                &format!("/v1/courses?sort={sort}"),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "sort={sort}");
        assert_eq!(body["error"]["sort"], "invalid sort value");
    }
}

#[tokio::test]
async fn test_list_order_is_stable() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin_token().await;
    for credithours in [4, 2, 4, 2, 4, 2] {
        fixture
            .request(
                Method::POST,
                "/v1/course/posting",
                Some(&admin),
                Some(json!({
                    "course_id": 1,
                    "posting_id": 1,
                    "mandatory": true,
                    "credithours": credithours,
                    "rank_id": 1,
                })),
            )
            .await;
    }

    let path = "/v1/course/posting?sort=-credithours&page_size=4";
    let (_, _, first) = fixture.request(Method::GET, path, Some(&admin), None).await;
    let (_, _, second) = fixture.request(Method::GET, path, Some(&admin), None).await;
    assert_eq!(first["course_postings"], second["course_postings"]);

    let ids: Vec<i64> = first["course_postings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    // Ties on credithours fall back to ascending id
    assert_eq!(ids, vec![1, 3, 5, 2]);
}

// ============================================================================
// Request Bodies
// ============================================================================

#[tokio::test]
async fn test_body_with_two_json_values_rejected() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin_token().await;

    let response = fixture
        .client
        .post(fixture.url("/v1/courses"))
        .bearer_auth(&admin)
        .header("Content-Type", "application/json")
        .body(r#"{"a":1}{"b":2}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "the body must only contain a single JSON value");
}

#[tokio::test]
async fn test_unknown_key_rejected() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin_token().await;

    let (status, _, body) = fixture
        .request(
            Method::POST,
            "/v1/courses",
            Some(&admin),
            Some(json!({"course": "A", "description": "B", "level": 3})),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "body contains unknown key \"level\"");
}

#[tokio::test]
async fn test_create_validates_then_sets_location() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin_token().await;

    let (status, _, body) = fixture
        .request(
            Method::POST,
            "/v1/course/posting",
            Some(&admin),
            Some(json!({
                "course_id": 0,
                "posting_id": 3,
                "mandatory": false,
                "credithours": 10,
                "rank_id": 2,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], json!({"course_id": "must be greater than zero"}));

    let (status, headers, body) = fixture
        .request(
            Method::POST,
            "/v1/course/posting",
            Some(&admin),
            Some(json!({
                "course_id": 5,
                "posting_id": 3,
                "mandatory": false,
                "credithours": 10,
                "rank_id": 2,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["course_posting"]["id"].as_i64().unwrap();
    assert_eq!(headers["location"], format!("/v1/course/posting/{id}").as_str());
}

#[tokio::test]
async fn test_stale_user_session_update_conflicts() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin_token().await;

    let (status, _, body) = fixture
        .request(
            Method::POST,
            "/v1/user_session",
            Some(&admin),
            Some(json!({
                "trainee_id": 3,
                "session_id": 1,
                "credithours_completed": 6,
                "grade": "B",
                "feedback": "Steady progress",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["user_session"]["id"].as_i64().unwrap();

    let (_, _, loaded) = fixture
        .request(Method::GET, &format!("/v1/user_session/{id}"), Some(&admin), None)
        .await;
    let version = loaded["user_session"]["version"].as_i64().unwrap().to_string();

    let patch = |grade: &'static str| {
        fixture
            .client
            .patch(fixture.url(&format!("/v1/user_session/{id}")))
            .bearer_auth(&admin)
            .header("X-Expected-Version", version.as_str())
            .json(&json!({ "grade": grade }))
            .send()
    };

    let first = patch("A").await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = patch("C").await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body: Value = second.json().await.unwrap();
    assert_eq!(
        body["error"],
        "unable to update the record due to an edit conflict, please try again"
    );

    let (_, _, current) = fixture
        .request(Method::GET, &format!("/v1/user_session/{id}"), Some(&admin), None)
        .await;
    assert_eq!(current["user_session"]["grade"], "A");
}

#[tokio::test]
async fn test_attendance_requires_date() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin_token().await;

    let (status, _, body) = fixture
        .request(
            Method::POST,
            "/v1/attendance",
            Some(&admin),
            Some(json!({"user_session_id": 1, "attendance": true})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["date"], "must be provided");

    let (status, _, body) = fixture
        .request(
            Method::POST,
            "/v1/attendance",
            Some(&admin),
            Some(json!({"user_session_id": 1, "attendance": true, "date": "2025-01-31"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["attendance"]["date"], "2025-01-31");
}

#[tokio::test]
async fn test_rating_range() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin_token().await;

    let (status, _, body) = fixture
        .request(
            Method::POST,
            "/v1/facilitator-rating",
            Some(&admin),
            Some(json!({"user_id": 1, "rating": 6})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["rating"], "must be between 1 and 5");
}

// ============================================================================
// Pipeline
// ============================================================================

#[tokio::test]
async fn test_rate_limit_burst() {
    let fixture = TestFixture::with_config(Config {
        limiter_enabled: true,
        limiter_rps: 2.0,
        limiter_burst: 4,
        ..test_config()
    })
    .await;

    let mut statuses = Vec::new();
    for _ in 0..5 {
        let response = fixture
            .client
            .get(fixture.url("/v1/healthcheck"))
            .send()
            .await
            .unwrap();
        statuses.push(response.status());
    }

    let ok = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let limited = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();
    assert_eq!((ok, limited), (4, 1), "statuses={statuses:?}");
}

#[tokio::test]
async fn test_stage_order_visible_on_rejection() {
    let fixture = TestFixture::with_config(Config {
        limiter_enabled: true,
        limiter_rps: 0.1,
        limiter_burst: 1,
        ..test_config()
    })
    .await;

    let send = || {
        fixture
            .client
            .get(fixture.url("/v1/healthcheck"))
            .header("Origin", TRUSTED_ORIGIN)
            .send()
    };
    assert_eq!(send().await.unwrap().status(), StatusCode::OK);
    let limited = send().await.unwrap();

    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    // CORS wraps the limiter
    assert_eq!(limited.headers()["access-control-allow-origin"], TRUSTED_ORIGIN);
    // The authenticator sits inside it and never ran
    let vary: Vec<&str> = limited
        .headers()
        .get_all("vary")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert!(!vary.contains(&"Authorization"), "vary={vary:?}");
    let body: Value = limited.json().await.unwrap();
    assert_eq!(body["error"], "rate limit exceeded");

    // Metrics is outermost and counted the 429
    let snapshot = fixture.state.metrics.snapshot();
    assert_eq!(snapshot.total_responses_sent_by_status["429"], 1);
}

#[tokio::test]
async fn test_trusted_preflight() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .client
        .request(Method::OPTIONS, fixture.url("/v1/courses"))
        .header("Origin", TRUSTED_ORIGIN)
        .header("Access-Control-Request-Method", "PATCH")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-methods"],
        "OPTIONS, PUT, PATCH, DELETE"
    );
    assert_eq!(
        response.headers()["access-control-allow-headers"],
        "Authorization, Content-Type"
    );
}

#[tokio::test]
async fn test_request_id_echoed() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .client
        .get(fixture.url("/v1/healthcheck"))
        .header("x-request-id", "trace-me-123")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "trace-me-123");

    let response = fixture
        .client
        .get(fixture.url("/v1/healthcheck"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"].len(), 32);
}

#[tokio::test]
async fn test_shutdown_drains_background_mail() {
    let fixture = TestFixture::new().await;
    let (status, _, _) = fixture
        .request(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({
                "regulation_number": "RN-2",
                "username": "sam",
                "fname": "Sam",
                "lname": "Lee",
                "email": "sam@example.com",
                "gender": "m",
                "formation": 1,
                "rank": 1,
                "postings": 1,
                "password": "long-enough-pw",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    assert!(fixture.state.shutdown().await);
    assert!(fixture.mailer.activation_token_for("sam@example.com").is_some());
}
