// HTTP surface: routing, cookies, JSON bodies and the SSE stream

use crate::config::Config;
use crate::error::ChatError;
use crate::events::EventBus;
use crate::messages::{MessageService, DEFAULT_LIST_LIMIT};
use crate::session::SessionManager;
use crate::store::DataStore;
use crate::types::{CreateUserPayload, ModerationAction, StoredUser, UpdateUserPayload, UserRole};
use crate::users::{UserService, DEFAULT_LOG_LIMIT};
use hyper::header::{
    HeaderValue, CACHE_CONTROL, CONNECTION, CONTENT_TYPE, COOKIE, SET_COOKIE,
};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "nsk_session";

/// Cookie lifetime, matching the session TTL (7 days)
const COOKIE_MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;

/// Boundary cap on message length (characters)
const MAX_MESSAGE_LENGTH: usize = 2000;

/// Process-wide state owned by the server and handed to request handlers
pub struct AppState {
    pub config: Config,
    pub store: Arc<DataStore>,
    pub sessions: Arc<SessionManager>,
    pub events: Arc<EventBus>,
    pub users: Arc<UserService>,
    pub messages: Arc<MessageService>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = Arc::new(DataStore::new(&config.data_dir));
        let sessions = Arc::new(SessionManager::new());
        let events = Arc::new(EventBus::new());
        let users = Arc::new(UserService::new(store.clone(), events.clone()));
        let messages = Arc::new(MessageService::new(
            store.clone(),
            events.clone(),
            users.clone(),
        ));

        Self {
            config,
            store,
            sessions,
            events,
            users,
            messages,
        }
    }
}

/// Bind and serve until a shutdown signal arrives
pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));

    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(handle_request(state, req).await) }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    tracing::info!("Listening on {}", addr);

    server.with_graceful_shutdown(shutdown_signal()).await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
        tracing::info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Top-level request entry point; maps domain errors to JSON error bodies
pub async fn handle_request(state: Arc<AppState>, req: Request<Body>) -> Response<Body> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match route(state, req).await {
        Ok(response) => response,
        Err(err) => {
            if err.is_internal() {
                tracing::error!("{} {} failed: {}", method, path, err);
            }
            json_error(err.status(), &err.public_message())
        }
    }
}

async fn route(state: Arc<AppState>, req: Request<Body>) -> Result<Response<Body>, ChatError> {
    let method = req.method().clone();
    let path = req.uri().path().trim_end_matches('/').to_string();
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    match (&method, segments.as_slice()) {
        (&Method::GET, ["api", "ping"]) => json_response(StatusCode::OK, &json!({"message": "ping"})),

        (&Method::POST, ["api", "auth", "login"]) => login(state, req).await,
        (&Method::POST, ["api", "auth", "logout"]) => logout(state, req).await,
        (&Method::GET, ["api", "auth", "session"]) => current_session(state, req).await,

        (&Method::GET, ["api", "users"]) => list_users(state, req).await,

        (&Method::GET, ["api", "messages", "general"]) => list_general(state, req).await,
        (&Method::POST, ["api", "messages", "general"]) => post_general(state, req).await,
        (&Method::DELETE, ["api", "messages", "general", id]) => {
            let id = id.to_string();
            delete_general(state, req, &id).await
        }
        (&Method::GET, ["api", "messages", "direct", username]) => {
            let username = username.to_string();
            list_direct(state, req, &username).await
        }
        (&Method::POST, ["api", "messages", "direct", username]) => {
            let username = username.to_string();
            post_direct(state, req, &username).await
        }

        (&Method::POST, ["api", "admin", "users"]) => admin_create_user(state, req).await,
        (&Method::PATCH, ["api", "admin", "users", username]) => {
            let username = username.to_string();
            admin_update_user(state, req, &username).await
        }
        (&Method::POST, ["api", "admin", "moderation"]) => admin_moderation(state, req).await,
        (&Method::GET, ["api", "admin", "logs"]) => admin_logs(state, req).await,

        (&Method::GET, ["api", "events", "stream"]) => events_stream(state, req).await,

        _ => Ok(json_error(StatusCode::NOT_FOUND, "Not found")),
    }
}

// ========== Auth ==========

#[derive(Debug, Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

async fn login(state: Arc<AppState>, req: Request<Body>) -> Result<Response<Body>, ChatError> {
    let payload: LoginPayload = read_json(req).await?;

    let user = match state
        .users
        .authenticate(&payload.username, &payload.password)
        .await?
    {
        Some(user) => user,
        None => {
            tracing::warn!("Failed login attempt for {}", payload.username);
            return Ok(json_error(StatusCode::UNAUTHORIZED, "Invalid credentials"));
        }
    };

    let session = state.sessions.create_session(&user).await;
    tracing::info!("Session issued for {}", user.username);

    let mut response = json_response(
        StatusCode::OK,
        &json!({"token": session.token, "user": user.to_public()}),
    )?;
    response.headers_mut().insert(
        SET_COOKIE,
        session_cookie(&session.token, state.config.production),
    );
    Ok(response)
}

async fn logout(state: Arc<AppState>, req: Request<Body>) -> Result<Response<Body>, ChatError> {
    if let Some(token) = session_token(&req) {
        state.sessions.invalidate_session(&token).await;
    }

    let mut response = empty_response(StatusCode::NO_CONTENT);
    response
        .headers_mut()
        .insert(SET_COOKIE, clear_session_cookie(state.config.production));
    Ok(response)
}

async fn current_session(
    state: Arc<AppState>,
    req: Request<Body>,
) -> Result<Response<Body>, ChatError> {
    let user = require_user(&state, &req).await?;
    json_response(StatusCode::OK, &json!({"user": user.to_public()}))
}

// ========== Users ==========

async fn list_users(state: Arc<AppState>, req: Request<Body>) -> Result<Response<Body>, ChatError> {
    require_user(&state, &req).await?;
    let users = state.users.list_public().await?;
    json_response(StatusCode::OK, &json!({"users": users}))
}

// ========== Messages ==========

#[derive(Debug, Deserialize)]
struct MessagePayload {
    content: String,
}

impl MessagePayload {
    fn validated(self) -> Result<String, ChatError> {
        if self.content.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(ChatError::Validation("Message is too long".to_string()));
        }
        Ok(self.content)
    }
}

async fn list_general(
    state: Arc<AppState>,
    req: Request<Body>,
) -> Result<Response<Body>, ChatError> {
    require_user(&state, &req).await?;
    let messages = state.messages.list_general(DEFAULT_LIST_LIMIT).await?;
    json_response(StatusCode::OK, &json!({"messages": messages}))
}

async fn post_general(
    state: Arc<AppState>,
    req: Request<Body>,
) -> Result<Response<Body>, ChatError> {
    let user = require_user(&state, &req).await?;
    let payload: MessagePayload = read_json(req).await?;
    let content = payload.validated()?;

    let message = state.messages.post_general(&user, &content).await?;
    json_response(StatusCode::CREATED, &json!({"message": message}))
}

async fn delete_general(
    state: Arc<AppState>,
    req: Request<Body>,
    message_id: &str,
) -> Result<Response<Body>, ChatError> {
    let user = require_user(&state, &req).await?;
    ensure_admin(&user)?;

    state.messages.delete_general(&user, message_id).await?;
    Ok(empty_response(StatusCode::NO_CONTENT))
}

async fn list_direct(
    state: Arc<AppState>,
    req: Request<Body>,
    username: &str,
) -> Result<Response<Body>, ChatError> {
    let user = require_user(&state, &req).await?;
    let peer = state
        .users
        .get_by_username(username)
        .await?
        .ok_or_else(|| ChatError::NotFound("User not found".to_string()))?;

    let messages = state
        .messages
        .list_direct(&user, &peer, DEFAULT_LIST_LIMIT)
        .await?;
    json_response(
        StatusCode::OK,
        &json!({"messages": messages, "peer": peer.to_public()}),
    )
}

async fn post_direct(
    state: Arc<AppState>,
    req: Request<Body>,
    username: &str,
) -> Result<Response<Body>, ChatError> {
    let user = require_user(&state, &req).await?;
    let peer = state
        .users
        .get_by_username(username)
        .await?
        .ok_or_else(|| ChatError::NotFound("User not found".to_string()))?;

    let payload: MessagePayload = read_json(req).await?;
    let content = payload.validated()?;

    let message = state.messages.post_direct(&user, &peer, &content).await?;
    json_response(StatusCode::CREATED, &json!({"message": message}))
}

// ========== Admin ==========

async fn admin_create_user(
    state: Arc<AppState>,
    req: Request<Body>,
) -> Result<Response<Body>, ChatError> {
    let actor = require_user(&state, &req).await?;
    ensure_admin(&actor)?;

    let payload: CreateUserPayload = read_json(req).await?;
    check_length("Username", &payload.username, 3, 32)?;
    check_length("Password", &payload.password, 8, 64)?;
    check_length("Display name", &payload.display_name, 3, 64)?;

    let user = state.users.create_account(&actor, payload).await.map_err(
        // The admin form surfaces conflicts as plain 400s
        |err| match err {
            ChatError::Conflict(message) => ChatError::Validation(message),
            other => other,
        },
    )?;
    json_response(StatusCode::CREATED, &json!({"user": user.to_public()}))
}

async fn admin_update_user(
    state: Arc<AppState>,
    req: Request<Body>,
    username: &str,
) -> Result<Response<Body>, ChatError> {
    let actor = require_user(&state, &req).await?;
    ensure_admin(&actor)?;

    let payload: UpdateUserPayload = read_json(req).await?;
    if let Some(display_name) = &payload.display_name {
        check_length("Display name", display_name, 3, 64)?;
    }
    if let Some(password) = &payload.password {
        check_length("Password", password, 8, 64)?;
    }

    let user = state
        .users
        .update_profile(&actor, username, payload)
        .await
        .map_err(|err| match err {
            // The admin panel expects 400 on this route, not 404
            ChatError::NotFound(message) => ChatError::Validation(message),
            other => other,
        })?;
    json_response(StatusCode::OK, &json!({"user": user.to_public()}))
}

#[derive(Debug, Deserialize)]
struct ModerationPayload {
    action: ModerationAction,
    username: String,
    #[serde(default)]
    context: Option<String>,
}

async fn admin_moderation(
    state: Arc<AppState>,
    req: Request<Body>,
) -> Result<Response<Body>, ChatError> {
    let actor = require_user(&state, &req).await?;
    ensure_admin(&actor)?;

    let payload: ModerationPayload = read_json(req).await?;
    let user = state
        .users
        .apply_moderation(&actor, payload.action, &payload.username, payload.context)
        .await
        .map_err(|err| match err {
            // Self-action and unknown-target both map to 400 on this route
            ChatError::NotFound(message) | ChatError::State(message) => {
                ChatError::Validation(message)
            }
            other => other,
        })?;
    json_response(StatusCode::OK, &json!({"user": user.to_public()}))
}

async fn admin_logs(state: Arc<AppState>, req: Request<Body>) -> Result<Response<Body>, ChatError> {
    let actor = require_user(&state, &req).await?;
    ensure_admin(&actor)?;

    let logs = state.users.list_logs(DEFAULT_LOG_LIMIT).await?;
    json_response(StatusCode::OK, &json!({"logs": logs}))
}

// ========== Events ==========

async fn events_stream(
    state: Arc<AppState>,
    req: Request<Body>,
) -> Result<Response<Body>, ChatError> {
    let user = require_user(&state, &req).await?;
    let (client_id, rx) = state.events.register_client().await;
    tracing::info!("User {} opened event stream {}", user.username, client_id);

    let welcome = serde_json::to_string(&json!({"user": user.to_public()}))?;
    let preamble = format!(":ok\n\nevent: welcome\ndata: {}\n\n", welcome);

    let frames = tokio_stream::once(preamble)
        .chain(UnboundedReceiverStream::new(rx))
        .map(Ok::<String, Infallible>);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .header(CONNECTION, "keep-alive")
        .body(Body::wrap_stream(frames))
        .expect("valid SSE response");
    Ok(response)
}

// ========== Request helpers ==========

async fn require_user(state: &AppState, req: &Request<Body>) -> Result<StoredUser, ChatError> {
    let token = session_token(req);
    state
        .sessions
        .require_user_from_token(&state.store, token.as_deref())
        .await
}

fn ensure_admin(user: &StoredUser) -> Result<(), ChatError> {
    if user.role != UserRole::Admin {
        return Err(ChatError::Authorization);
    }
    Ok(())
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ChatError> {
    let length = value.chars().count();
    if length < min || length > max {
        return Err(ChatError::Validation(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

async fn read_json<T: DeserializeOwned>(req: Request<Body>) -> Result<T, ChatError> {
    let bytes = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|err| ChatError::Validation(format!("Unreadable request body: {}", err)))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| ChatError::Validation(format!("Invalid request payload: {}", err)))
}

fn json_response<T: serde::Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<Response<Body>, ChatError> {
    let body = serde_json::to_vec(value)?;
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .expect("valid JSON response"))
}

fn json_error(status: StatusCode, message: &str) -> Response<Body> {
    let body = serde_json::to_vec(&json!({"error": message})).unwrap_or_default();
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .expect("valid error response")
}

fn empty_response(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .expect("valid empty response")
}

// ========== Cookies ==========

fn parse_cookies(req: &Request<Body>) -> HashMap<String, String> {
    let header = match req.headers().get(COOKIE).and_then(|value| value.to_str().ok()) {
        Some(header) => header,
        None => return HashMap::new(),
    };

    header
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Session token from the cookie header
fn session_token(req: &Request<Body>) -> Option<String> {
    parse_cookies(req).remove(SESSION_COOKIE)
}

fn session_cookie(token: &str, production: bool) -> HeaderValue {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        SESSION_COOKIE, token, COOKIE_MAX_AGE_SECS
    );
    if production {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).expect("cookie value is ASCII")
}

fn clear_session_cookie(production: bool) -> HeaderValue {
    let mut cookie = format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        SESSION_COOKIE
    );
    if production {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).expect("cookie value is ASCII")
}
