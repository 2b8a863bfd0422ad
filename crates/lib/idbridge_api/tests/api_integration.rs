//! Integration tests: in-memory control plane and tenant database, router
//! driven with `oneshot`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use idbridge_api::config::ApiConfig;
use idbridge_api::{AppState, router};
use idbridge_core::models::tenant::NewConnection;
use idbridge_core::notify::{Notification, Notifier, NotifyError};
use idbridge_core::registry::{ConnectionProvider, PoolRegistry};
use idbridge_core::{password, tenants};
use serde_json::{Value, json};
use sqlx::AnyPool;
use tower::ServiceExt;

const TENANT_ENDPOINT: &str = "sqlite::memory:";

/// Captures every notification so tests can pull the token out of the link.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn last_token(&self) -> String {
        let sent = self.sent.lock().unwrap();
        let link = &sent.last().expect("a notification was sent").link;
        let url = url::Url::parse(link).unwrap();
        url.query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
            .expect("link carries a token")
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct Harness {
    app: Router,
    control: AnyPool,
    tenant_db: AnyPool,
    notifier: Arc<RecordingNotifier>,
    key: String,
}

impl Harness {
    async fn new() -> Self {
        let control = idbridge_core::db::connect("sqlite::memory:", 1).await.unwrap();
        idbridge_api::migrate(&control).await.unwrap();

        let registry = Arc::new(PoolRegistry::new());
        let tenant_db = registry.handle(TENANT_ENDPOINT, None).await.unwrap().pool;
        for sql in [
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL, \
             full_name TEXT, password_hash TEXT, email_verified_at TEXT, created_at TEXT)",
            "CREATE TABLE sessions (id INTEGER PRIMARY KEY, user_id TEXT, token TEXT)",
            "INSERT INTO users (email, full_name, password_hash, created_at) VALUES \
             ('ann@example.com', 'Ann Lee', 'old', '2026-01-01'), \
             ('bob@example.com', 'Bob Stone', 'old', '2026-01-02'), \
             ('joanna@example.com', 'Joanna Hart', 'old', '2026-01-03')",
            "INSERT INTO sessions (user_id, token) VALUES ('1', 's1'), ('1', 's2'), ('2', 's3')",
        ] {
            sqlx::query(sql).execute(&tenant_db).await.unwrap();
        }

        let key = register_tenant(&control, "shop").await;
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::new(
            control.clone(),
            test_config(),
            registry,
            notifier.clone(),
        )
        .unwrap();

        Self {
            app: router(state),
            control,
            tenant_db,
            notifier,
            key,
        }
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        key: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("authorization", format!("Bearer {key}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = self.app.clone().oneshot(request).await.expect("request");
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse JSON")
        };
        (status, json)
    }

    async fn tenant(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call(method, uri, Some(&self.key), body).await
    }
}

fn test_config() -> ApiConfig {
    ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        database_url: "sqlite::memory:".into(),
        max_connections: 1,
        encryption_key: None,
        public_base_url: "https://app.example.com".into(),
        notify_webhook_url: None,
    }
}

async fn register_tenant(control: &AnyPool, name: &str) -> String {
    let (_, key) = tenants::register(
        control,
        None,
        &NewConnection {
            name: name.into(),
            app_name: "Shop".into(),
            endpoint: TENANT_ENDPOINT.into(),
            credential: None,
            table_name: "users".into(),
        },
        Utc::now(),
    )
    .await
    .unwrap();
    key
}

#[tokio::test]
async fn health_is_public() {
    let h = Harness::new().await;
    let (status, json) = h.call("GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["dbConnected"], true);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn tenant_routes_require_a_known_key() {
    let h = Harness::new().await;

    let (status, json) = h.call("GET", "/api/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "unauthorized");

    let (status, _) = h.call("GET", "/api/users", Some("idb_nope"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_reset_flow_is_single_use() {
    let h = Harness::new().await;

    let (status, json) = h
        .tenant(
            "POST",
            "/api/password-reset/send",
            Some(json!({ "userId": "1", "email": "ann@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["success"], true);
    assert_eq!(json["delivered"], true);
    assert!(json.get("token").is_none(), "token must not be echoed");

    {
        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].link.starts_with("https://app.example.com/reset-password?token="));
    }
    let token = h.notifier.last_token();

    let body = json!({ "token": token, "newPassword": "correct horse" });
    let (status, json) = h
        .tenant("POST", "/api/password-reset/verify", Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["userId"], "1");

    let stored: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = 1")
        .fetch_one(&h.tenant_db)
        .await
        .unwrap();
    assert!(password::verify_password("correct horse", &stored).unwrap());

    let (status, json) = h
        .tenant("POST", "/api/password-reset/verify", Some(body))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "token_already_used");
}

#[tokio::test]
async fn tokens_are_scoped_to_their_tenant_and_type() {
    let h = Harness::new().await;
    let other_key = register_tenant(&h.control, "other").await;

    h.tenant(
        "POST",
        "/api/magic-link/send",
        Some(json!({ "userId": "2", "email": "bob@example.com" })),
    )
    .await;
    let token = h.notifier.last_token();

    let (status, json) = h
        .call(
            "POST",
            "/api/magic-link/verify",
            Some(&other_key),
            Some(json!({ "token": token })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "token_tenant_mismatch");

    let (status, json) = h
        .tenant(
            "POST",
            "/api/email-verification/verify",
            Some(json!({ "token": token })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "wrong_token_type");

    // Neither failure consumed the token.
    let (status, json) = h
        .tenant("POST", "/api/magic-link/verify", Some(json!({ "token": token })))
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["user"]["id"], "2");
    assert_eq!(json["user"]["email"], "bob@example.com");
    assert_eq!(json["user"]["name"], "Bob Stone");

    let (status, json) = h
        .tenant(
            "POST",
            "/api/magic-link/verify",
            Some(json!({ "token": "not-a-token" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_token");
}

#[tokio::test]
async fn email_verification_marks_the_user() {
    let h = Harness::new().await;

    h.tenant(
        "POST",
        "/api/email-verification/send",
        Some(json!({
            "userId": "3",
            "email": "joanna@example.com",
            "verifyUrl": "https://other.example.com/confirm"
        })),
    )
    .await;
    let link = h.notifier.sent.lock().unwrap()[0].link.clone();
    assert!(link.starts_with("https://other.example.com/confirm?token="));
    let token = h.notifier.last_token();

    let (status, json) = h
        .tenant(
            "POST",
            "/api/email-verification/verify",
            Some(json!({ "token": token })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["userId"], "3");
    assert_eq!(json["email"], "joanna@example.com");

    let marker: Option<String> =
        sqlx::query_scalar("SELECT email_verified_at FROM users WHERE id = 3")
            .fetch_one(&h.tenant_db)
            .await
            .unwrap();
    assert!(marker.is_some());
}

#[tokio::test]
async fn send_rejects_missing_fields() {
    let h = Harness::new().await;
    let (status, json) = h
        .tenant(
            "POST",
            "/api/password-reset/send",
            Some(json!({ "userId": "", "email": "ann@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
    assert!(h.notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn bans_can_be_created_checked_and_lifted() {
    let h = Harness::new().await;

    let (status, json) = h.tenant("GET", "/api/bans/check?userId=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["banned"], false);

    let (status, json) = h
        .tenant(
            "POST",
            "/api/bans",
            Some(json!({
                "userId": "2",
                "reason": "spam",
                "type": "temporary",
                "durationHours": 24
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["bannedBy"], "tenant:shop");

    let (_, json) = h.tenant("GET", "/api/bans/check?userId=2", None).await;
    assert_eq!(json["banned"], true);
    assert_eq!(json["reason"], "spam");
    assert_eq!(json["type"], "temporary");
    assert!(json["expiresAt"].is_string());

    // A second ban supersedes the first.
    h.tenant(
        "POST",
        "/api/bans",
        Some(json!({ "userId": "2", "reason": "abuse", "type": "permanent" })),
    )
    .await;
    let (_, json) = h.tenant("GET", "/api/bans?activeOnly=true", None).await;
    let active = json["bans"].as_array().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["reason"], "abuse");

    // Permanent bans report an explicit null expiry.
    let (_, json) = h.tenant("GET", "/api/bans/check?userId=2", None).await;
    assert_eq!(json["type"], "permanent");
    assert!(json.as_object().unwrap().contains_key("expiresAt"));
    assert!(json["expiresAt"].is_null());
    assert!(json["bannedAt"].is_string());

    let (status, json) = h.tenant("DELETE", "/api/bans/2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["lifted"], true);
    let (_, json) = h.tenant("GET", "/api/bans/check?userId=2", None).await;
    assert_eq!(json["banned"], false);
    assert!(!json.as_object().unwrap().contains_key("expiresAt"));

    // Superseding rewrites the single row; lifting keeps it as history.
    let (_, json) = h.tenant("GET", "/api/bans", None).await;
    let history = json["bans"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["active"], false);
    assert!(history[0]["liftedAt"].is_string());
    assert_eq!(history[0]["reason"], "abuse");
}

#[tokio::test]
async fn users_can_be_searched_and_edited() {
    let h = Harness::new().await;

    let (status, json) = h.tenant("GET", "/api/users?search=ANN", None).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["total"], 2);
    let users = json["users"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    // Newest first by default; password hashes are never projected.
    assert_eq!(users[0]["email"], "joanna@example.com");
    assert!(users[0].get("password").is_none());

    let (status, json) = h
        .tenant("GET", "/api/users?limit=1&offset=1&sortBy=email&sortDir=asc", None)
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["total"], 3);
    assert_eq!(json["users"][0]["email"], "bob@example.com");

    let (status, json) = h
        .tenant(
            "POST",
            "/api/users",
            Some(json!({ "fields": { "email": "dee@example.com", "full_name": "Dee" } })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    let id = json["id"].as_str().unwrap().to_string();

    let (status, json) = h
        .tenant(
            "PATCH",
            &format!("/api/users/{id}"),
            Some(json!({ "field": "name", "value": "Dee Dee" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["affected"], 1);

    let (_, json) = h.tenant("GET", &format!("/api/users/{id}"), None).await;
    assert_eq!(json["name"], "Dee Dee");

    let (status, _) = h.tenant("DELETE", &format!("/api/users/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, json) = h.tenant("GET", &format!("/api/users/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn password_column_writes_are_hashed() {
    let h = Harness::new().await;
    let (status, json) = h
        .tenant(
            "PATCH",
            "/api/users/2",
            Some(json!({ "field": "password", "value": "hunter2" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");

    let stored: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = 2")
        .fetch_one(&h.tenant_db)
        .await
        .unwrap();
    assert_ne!(stored, "hunter2");
    assert!(password::verify_password("hunter2", &stored).unwrap());
}

#[tokio::test]
async fn hostile_identifiers_are_rejected() {
    let h = Harness::new().await;

    let (status, json) = h
        .tenant(
            "PATCH",
            "/api/users/1",
            Some(json!({ "field": "email = 'x'; DROP TABLE users; --", "value": "x" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_identifier");

    let (status, json) = h
        .tenant("GET", "/api/schema/tables/users%3B%20--/columns", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_identifier");

    let (status, json) = h
        .tenant("POST", "/api/users", Some(json!({ "fields": {} })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "no_fields_provided");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&h.tenant_db)
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn sessions_can_be_listed_and_revoked() {
    let h = Harness::new().await;

    let (status, json) = h.tenant("GET", "/api/users/1/sessions", None).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["sessions"].as_array().unwrap().len(), 2);

    let (status, json) = h.tenant("DELETE", "/api/users/1/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["affected"], 2);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
        .fetch_one(&h.tenant_db)
        .await
        .unwrap();
    assert_eq!(remaining, 1);
}

#[tokio::test]
async fn schema_mapping_is_detected_and_overridable() {
    let h = Harness::new().await;

    let (status, json) = h.tenant("GET", "/api/schema/tables", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["tables"], json!(["sessions", "users"]));

    let (status, json) = h.tenant("GET", "/api/schema/mapping", None).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["tableName"], "users");
    assert_eq!(json["mapping"]["nameColumn"], "full_name");
    assert_eq!(json["mapping"]["passwordColumn"], "password_hash");
    assert_eq!(json["mapping"]["sessionTable"], "sessions");

    let mut mapping = json["mapping"].clone();
    mapping["nameColumn"] = Value::Null;
    let (status, _) = h.tenant("PUT", "/api/schema/mapping", Some(mapping)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = h.tenant("GET", "/api/users/1", None).await;
    assert!(json.get("name").is_none());

    let (status, json) = h
        .tenant(
            "PUT",
            "/api/schema/mapping",
            Some(json!({ "idColumn": "id", "emailColumn": "email\"--" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");

    let (status, json) = h.tenant("POST", "/api/schema/detect", None).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["mapping"]["nameColumn"], "full_name");

    let (status, json) = h.tenant("GET", "/api/schema/overview", None).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["tables"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn refresh_caches_the_user_count() {
    let h = Harness::new().await;
    let (status, json) = h.tenant("POST", "/api/connection/refresh", None).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["userCount"], 3);

    let tenant = tenants::list(&h.control).await.unwrap().remove(0);
    assert_eq!(tenant.user_count, Some(3));
}
