use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use jellystream::config::Config;
use jellystream::services::UserService;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn test_config() -> Config {
    let db_path =
        std::env::temp_dir().join(format!("jellystream-api-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.database.url = format!("sqlite:{}", db_path.display());
    config.security.jwt_secret = "integration-test-secret".to_string();
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config
}

async fn spawn_app() -> (Arc<jellystream::api::AppState>, Router) {
    let state = jellystream::api::create_app_state_from_config(test_config(), None)
        .await
        .expect("failed to create app state");
    state.shared.bootstrap().await.expect("bootstrap failed");

    let router = jellystream::api::router(state.clone());
    (state, router)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn timestamp(value: &Value) -> chrono::DateTime<chrono::FixedOffset> {
    chrono::DateTime::parse_from_rfc3339(value.as_str().unwrap()).unwrap()
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

async fn create_user(app: &Router, admin: &str, username: &str, is_admin: bool) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/users",
        Some(admin),
        Some(json!({ "username": username, "password": "password", "isAdmin": is_admin })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_bootstrap_admin_can_log_in() {
    let (_, app) = spawn_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "admin", "password": "admin" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["user"]["username"], "admin");
    assert_eq!(body["user"]["isAdmin"], true);
    assert_eq!(body["user"]["mustChangePassword"], true);
    assert!(body["user"].get("password").is_none());
    assert!(body["user"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_login_failures_are_identical() {
    let (_, app) = spawn_app().await;

    let wrong_password = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "admin", "password": "wrong" })),
    )
    .await;
    let unknown_user = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "ghost", "password": "wrong" })),
    )
    .await;

    assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_user);
    assert_eq!(wrong_password.1["error"], "Invalid username or password");
}

#[tokio::test]
async fn test_login_input_validation() {
    let (_, app) = spawn_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Username and password required");

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("Content-Type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_gate_rejections() {
    let (_, app) = spawn_app().await;

    let (status, body) = send(&app, "GET", "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authorization header required");

    let request = Request::builder()
        .uri("/api/auth/me")
        .header("Authorization", "Token abc")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Invalid authorization header format");

    let (status, body) = send(&app, "GET", "/api/auth/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid or expired token");
}

#[tokio::test]
async fn test_gate_rejects_expired_token() {
    let (state, app) = spawn_app().await;
    let users = state.users().list_users().await.unwrap();
    let admin = users.iter().find(|u| u.username == "admin").unwrap();

    let expired = state
        .tokens()
        .issue_at(admin, chrono::Utc::now() - chrono::Duration::hours(25))
        .unwrap();

    for uri in ["/api/auth/me", "/api/users"] {
        let (status, body) = send(&app, "GET", uri, Some(&expired), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"], "Invalid or expired token");
    }

    let fresh = state.tokens().issue(admin).unwrap();
    let (status, _) = send(&app, "GET", "/api/auth/me", Some(&fresh), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_non_admin_is_forbidden_from_user_management() {
    let (_, app) = spawn_app().await;
    let admin = login(&app, "admin", "admin").await;
    create_user(&app, &admin, "viewer", false).await;
    let viewer = login(&app, "viewer", "password").await;

    let (status, body) = send(&app, "GET", "/api/users", Some(&viewer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Admin access required");

    let (status, _) = send(&app, "GET", "/api/auth/me", Some(&viewer), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", "/api/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_verify_and_me_return_current_user() {
    let (_, app) = spawn_app().await;
    let admin = login(&app, "admin", "admin").await;

    let (status, verify) = send(&app, "GET", "/api/auth/verify", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, me) = send(&app, "GET", "/api/auth/me", Some(&admin), None).await;

    assert_eq!(verify, me);
    assert_eq!(me["username"], "admin");
}

#[tokio::test]
async fn test_token_outlives_deleted_user_but_lookup_fails() {
    let (_, app) = spawn_app().await;
    let admin = login(&app, "admin", "admin").await;
    let id = create_user(&app, &admin, "temp", false).await;
    let temp = login(&app, "temp", "password").await;

    let (status, _) = send(&app, "DELETE", &format!("/api/users/{id}"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", "/api/auth/me", Some(&temp), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn test_change_password_flow() {
    let (_, app) = spawn_app().await;
    let admin = login(&app, "admin", "admin").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/change-password",
        Some(&admin),
        Some(json!({ "currentPassword": "nope", "newPassword": "rotated" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Current password is incorrect");

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/change-password",
        Some(&admin),
        Some(json!({ "currentPassword": "admin", "newPassword": "abc" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "New password must be at least 4 characters");

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/change-password",
        Some(&admin),
        Some(json!({ "currentPassword": "admin", "newPassword": "rotated" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Password updated successfully");

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "admin", "password": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let rotated = login(&app, "admin", "rotated").await;
    let (_, me) = send(&app, "GET", "/api/auth/me", Some(&rotated), None).await;
    assert_eq!(me["mustChangePassword"], false);
}

#[tokio::test]
async fn test_create_user_validation_and_conflict() {
    let (_, app) = spawn_app().await;
    let admin = login(&app, "admin", "admin").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/users",
        Some(&admin),
        Some(json!({ "username": "bob", "password": "abc" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Password must be at least 4 characters");

    let (status, body) = send(
        &app,
        "POST",
        "/api/users",
        Some(&admin),
        Some(json!({ "password": "password" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Username and password required");

    let (status, body) = send(
        &app,
        "POST",
        "/api/users",
        Some(&admin),
        Some(json!({ "username": "bob", "email": "bob@example.com", "password": "password" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "bob@example.com");
    assert_eq!(body["isAdmin"], false);

    let (status, body) = send(
        &app,
        "POST",
        "/api/users",
        Some(&admin),
        Some(json!({ "username": "bob", "password": "password" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Username already exists");
}

#[tokio::test]
async fn test_update_user_partial_fields() {
    let (_, app) = spawn_app().await;
    let admin = login(&app, "admin", "admin").await;
    let id = create_user(&app, &admin, "carol", false).await;
    let uri = format!("/api/users/{id}");

    let carol = login(&app, "carol", "password").await;
    let (_, before) = send(&app, "GET", "/api/auth/me", Some(&carol), None).await;

    let (status, unchanged) = send(&app, "PUT", &uri, Some(&admin), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unchanged["isAdmin"], before["isAdmin"]);
    assert_eq!(unchanged["createdAt"], before["createdAt"]);
    assert!(timestamp(&unchanged["updatedAt"]) >= timestamp(&before["updatedAt"]));

    let (status, promoted) = send(
        &app,
        "PUT",
        &uri,
        Some(&admin),
        Some(json!({ "isAdmin": true, "email": "carol@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(promoted["isAdmin"], true);
    assert_eq!(promoted["email"], "carol@example.com");

    // Password untouched by the previous updates.
    login(&app, "carol", "password").await;

    let (status, _) = send(
        &app,
        "PUT",
        &uri,
        Some(&admin),
        Some(json!({ "password": "abc" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "PUT",
        "/api/users/00000000-0000-0000-0000-000000000000",
        Some(&admin),
        Some(json!({ "isAdmin": false })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn test_last_admin_cannot_be_deleted() {
    let (state, app) = spawn_app().await;
    let admin = login(&app, "admin", "admin").await;
    let (_, me) = send(&app, "GET", "/api/auth/me", Some(&admin), None).await;
    let admin_id = me["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "DELETE",
        &format!("/api/users/{admin_id}"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Cannot delete the last admin user");
    assert_eq!(state.shared.credentials.count_admins().await.unwrap(), 1);

    let second = create_user(&app, &admin, "backup-admin", true).await;
    let (status, body) = send(
        &app,
        "DELETE",
        &format!("/api/users/{admin_id}"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User deleted successfully");

    let backup = login(&app, "backup-admin", "password").await;
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/users/{second}"),
        Some(&backup),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_delete_unknown_user() {
    let (_, app) = spawn_app().await;
    let admin = login(&app, "admin", "admin").await;

    let (status, body) = send(&app, "DELETE", "/api/users/missing", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn test_health_and_index() {
    let (_, app) = spawn_app().await;

    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");

    let (status, body) = send(&app, "GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "jellystream");
    assert!(body["endpoints"].as_array().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn test_security_headers_present() {
    let (_, app) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
}
