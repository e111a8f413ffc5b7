// Integration tests for the HTTP surface

use hyper::body::HttpBody;
use hyper::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use hyper::{Body, Method, Request, Response, StatusCode};
use noskills::config::Config;
use noskills::server::{handle_request, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

const ADMIN_PASSWORD: &str = "sup3r-s3cret";

struct TestApp {
    state: Arc<AppState>,
    // Keeps the data directory alive for the duration of the test
    _dir: TempDir,
}

async fn spawn_app() -> TestApp {
    let dir = tempdir().unwrap();
    let mut config = Config::for_data_dir(dir.path().to_path_buf());
    config.admin_username = "yupi".to_string();
    config.admin_password = ADMIN_PASSWORD.to_string();

    let state = Arc::new(AppState::new(config));
    state
        .users
        .ensure_default_admin("yupi", ADMIN_PASSWORD)
        .await
        .unwrap();

    TestApp { state, _dir: dir }
}

fn request(method: Method, path: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(COOKIE, format!("nsk_session={}", token));
    }

    match body {
        Some(value) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &TestApp, username: &str, password: &str) -> (StatusCode, Value) {
    let response = handle_request(
        app.state.clone(),
        request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"username": username, "password": password})),
        ),
    )
    .await;

    let status = response.status();
    (status, body_json(response).await)
}

async fn login_token(app: &TestApp, username: &str, password: &str) -> String {
    let (status, body) = login(app, username, password).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

async fn create_member(app: &TestApp, admin_token: &str, username: &str, password: &str) {
    let response = handle_request(
        app.state.clone(),
        request(
            Method::POST,
            "/api/admin/users",
            Some(admin_token),
            Some(json!({
                "username": username,
                "password": password,
                "displayName": "Carlos",
            })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_login_sets_cookie_and_session_resolves_same_user() {
    let app = spawn_app().await;

    let response = handle_request(
        app.state.clone(),
        request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"username": "yupi", "password": ADMIN_PASSWORD})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("nsk_session="));
    assert!(cookie.contains("HttpOnly"));

    let body = body_json(response).await;
    let token = body["token"].as_str().unwrap();
    assert_eq!(body["user"]["username"], "yupi");
    // Password material never leaks through the public projection
    assert!(body["user"].get("passwordHash").is_none());

    let session = handle_request(
        app.state.clone(),
        request(Method::GET, "/api/auth/session", Some(token), None),
    )
    .await;
    assert_eq!(session.status(), StatusCode::OK);
    let session_body = body_json(session).await;
    assert_eq!(session_body["user"]["username"], "yupi");
}

#[tokio::test]
async fn test_invalid_credentials_and_missing_session() {
    let app = spawn_app().await;

    let (status, body) = login(&app, "yupi", "wrong-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let response = handle_request(
        app.state.clone(),
        request(Method::GET, "/api/auth/session", None, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_banned_login_is_forbidden_regardless_of_password() {
    let app = spawn_app().await;
    let admin_token = login_token(&app, "yupi", ADMIN_PASSWORD).await;
    create_member(&app, &admin_token, "carlos", "longenough").await;

    let response = handle_request(
        app.state.clone(),
        request(
            Method::POST,
            "/api/admin/moderation",
            Some(&admin_token),
            Some(json!({"action": "ban", "username": "carlos"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = login(&app, "carlos", "longenough").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = login(&app, "carlos", "wrong-password").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ban_invalidates_outstanding_session() {
    let app = spawn_app().await;
    let admin_token = login_token(&app, "yupi", ADMIN_PASSWORD).await;
    create_member(&app, &admin_token, "carlos", "longenough").await;
    let carlos_token = login_token(&app, "carlos", "longenough").await;

    handle_request(
        app.state.clone(),
        request(
            Method::POST,
            "/api/admin/moderation",
            Some(&admin_token),
            Some(json!({"action": "ban", "username": "carlos"})),
        ),
    )
    .await;

    let response = handle_request(
        app.state.clone(),
        request(Method::GET, "/api/auth/session", Some(&carlos_token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_invalidates_session_and_clears_cookie() {
    let app = spawn_app().await;
    let token = login_token(&app, "yupi", ADMIN_PASSWORD).await;

    let response = handle_request(
        app.state.clone(),
        request(Method::POST, "/api/auth/logout", Some(&token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cleared = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let response = handle_request(
        app.state.clone(),
        request(Method::GET, "/api/auth/session", Some(&token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_user_post_and_list_general() {
    let app = spawn_app().await;
    let admin_token = login_token(&app, "yupi", ADMIN_PASSWORD).await;
    create_member(&app, &admin_token, "carlos", "longenough").await;
    let carlos_token = login_token(&app, "carlos", "longenough").await;

    let response = handle_request(
        app.state.clone(),
        request(
            Method::POST,
            "/api/messages/general",
            Some(&carlos_token),
            Some(json!({"content": "hello"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = handle_request(
        app.state.clone(),
        request(Method::GET, "/api/messages/general", Some(&carlos_token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "hello");
    assert_eq!(messages[0]["senderUsername"], "carlos");
}

#[tokio::test]
async fn test_mute_unmute_round_trip_over_http() {
    let app = spawn_app().await;
    let admin_token = login_token(&app, "yupi", ADMIN_PASSWORD).await;
    create_member(&app, &admin_token, "carlos", "longenough").await;
    let carlos_token = login_token(&app, "carlos", "longenough").await;

    let moderate = |action: &str| {
        request(
            Method::POST,
            "/api/admin/moderation",
            Some(&admin_token),
            Some(json!({"action": action, "username": "carlos"})),
        )
    };
    let post = || {
        request(
            Method::POST,
            "/api/messages/general",
            Some(&carlos_token),
            Some(json!({"content": "x"})),
        )
    };

    handle_request(app.state.clone(), moderate("mute")).await;
    let response = handle_request(app.state.clone(), post()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    handle_request(app.state.clone(), moderate("unmute")).await;
    let response = handle_request(app.state.clone(), post()).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = spawn_app().await;
    let admin_token = login_token(&app, "yupi", ADMIN_PASSWORD).await;
    create_member(&app, &admin_token, "carlos", "longenough").await;
    let carlos_token = login_token(&app, "carlos", "longenough").await;

    let response = handle_request(
        app.state.clone(),
        request(Method::GET, "/api/admin/logs", Some(&carlos_token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = handle_request(
        app.state.clone(),
        request(Method::GET, "/api/admin/logs", None, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = handle_request(
        app.state.clone(),
        request(Method::GET, "/api/admin/logs", Some(&admin_token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(!body["logs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_general_message() {
    let app = spawn_app().await;
    let admin_token = login_token(&app, "yupi", ADMIN_PASSWORD).await;

    let response = handle_request(
        app.state.clone(),
        request(
            Method::POST,
            "/api/messages/general",
            Some(&admin_token),
            Some(json!({"content": "to be removed"})),
        ),
    )
    .await;
    let message_id = body_json(response).await["message"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = handle_request(
        app.state.clone(),
        request(
            Method::DELETE,
            &format!("/api/messages/general/{}", message_id),
            Some(&admin_token),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = handle_request(
        app.state.clone(),
        request(
            Method::DELETE,
            "/api/messages/general/unknown-id",
            Some(&admin_token),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_direct_messages_and_banned_recipient() {
    let app = spawn_app().await;
    let admin_token = login_token(&app, "yupi", ADMIN_PASSWORD).await;
    create_member(&app, &admin_token, "carlos", "longenough").await;

    let response = handle_request(
        app.state.clone(),
        request(
            Method::POST,
            "/api/messages/direct/carlos",
            Some(&admin_token),
            Some(json!({"content": "hi carlos"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = handle_request(
        app.state.clone(),
        request(Method::GET, "/api/messages/direct/carlos", Some(&admin_token), None),
    )
    .await;
    let body = body_json(response).await;
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    assert_eq!(body["peer"]["username"], "carlos");

    let response = handle_request(
        app.state.clone(),
        request(Method::GET, "/api/messages/direct/nobody", Some(&admin_token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    handle_request(
        app.state.clone(),
        request(
            Method::POST,
            "/api/admin/moderation",
            Some(&admin_token),
            Some(json!({"action": "ban", "username": "carlos"})),
        ),
    )
    .await;

    let response = handle_request(
        app.state.clone(),
        request(
            Method::POST,
            "/api/messages/direct/carlos",
            Some(&admin_token),
            Some(json!({"content": "still there?"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_self_moderation_maps_to_bad_request() {
    let app = spawn_app().await;
    let admin_token = login_token(&app, "yupi", ADMIN_PASSWORD).await;

    let response = handle_request(
        app.state.clone(),
        request(
            Method::POST,
            "/api/admin/moderation",
            Some(&admin_token),
            Some(json!({"action": "ban", "username": "yupi"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_user_payload_validation() {
    let app = spawn_app().await;
    let admin_token = login_token(&app, "yupi", ADMIN_PASSWORD).await;

    // Too-short password is rejected at the boundary
    let response = handle_request(
        app.state.clone(),
        request(
            Method::POST,
            "/api/admin/users",
            Some(&admin_token),
            Some(json!({"username": "carlos", "password": "short", "displayName": "Carlos"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Duplicates surface as 400 on this route
    create_member(&app, &admin_token, "carlos", "longenough").await;
    let response = handle_request(
        app.state.clone(),
        request(
            Method::POST,
            "/api/admin/users",
            Some(&admin_token),
            Some(json!({"username": "carlos", "password": "longenough", "displayName": "Carlos"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_events_stream_delivers_broadcasts() {
    let app = spawn_app().await;
    let admin_token = login_token(&app, "yupi", ADMIN_PASSWORD).await;

    let mut response = handle_request(
        app.state.clone(),
        request(Method::GET, "/api/events/stream", Some(&admin_token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let preamble = response.body_mut().data().await.unwrap().unwrap();
    let preamble = String::from_utf8(preamble.to_vec()).unwrap();
    assert!(preamble.starts_with(":ok\n\n"));
    assert!(preamble.contains("event: welcome"));
    assert!(preamble.contains("\"yupi\""));

    // A posted message arrives as a general-message frame
    let admin = app
        .state
        .users
        .get_by_username("yupi")
        .await
        .unwrap()
        .unwrap();
    app.state
        .messages
        .post_general(&admin, "streamed")
        .await
        .unwrap();

    let frame = response.body_mut().data().await.unwrap().unwrap();
    let frame = String::from_utf8(frame.to_vec()).unwrap();
    assert!(frame.starts_with("data: "));
    assert!(frame.contains("\"general-message\""));
    assert!(frame.contains("streamed"));
}

#[tokio::test]
async fn test_ping_and_unknown_route() {
    let app = spawn_app().await;

    let response = handle_request(
        app.state.clone(),
        request(Method::GET, "/api/ping", None, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["message"], "ping");

    let response = handle_request(
        app.state.clone(),
        request(Method::GET, "/api/nothing/here", None, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
