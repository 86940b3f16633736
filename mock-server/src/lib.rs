use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const SESSION_TAG: &str = "X-Session-Code";
pub const NOT_LOGGED_IN: &str = "Not logged in or login timed-out";

/// Status the registrar API uses for every application-level error.
pub const HTML_CODE_ERR: u16 = 499;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub user_id: u32,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct Register {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Default)]
pub struct Registry {
    users: HashMap<String, User>,
    sessions: HashMap<String, String>,
    next_user_id: u32,
}

impl Registry {
    fn open_session(&mut self, email: &str) -> String {
        let code = Uuid::new_v4().simple().to_string();
        self.sessions.insert(code.clone(), email.to_string());
        code
    }

    fn user_for(&self, code: &str) -> Option<&User> {
        self.sessions.get(code).and_then(|email| self.users.get(email))
    }
}

pub type Db = Arc<RwLock<Registry>>;

/// Per-request view of the caller's session, mirroring what the real web UI
/// derives from the incoming headers.
struct Req {
    sess_code: Option<String>,
}

impl Req {
    async fn from_headers(db: &Db, headers: &HeaderMap) -> (Self, Option<User>) {
        let code = headers
            .get(SESSION_TAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let Some(code) = code else {
            return (Self { sess_code: None }, None);
        };
        match db.read().await.user_for(&code).cloned() {
            Some(user) => (Self { sess_code: Some(code) }, Some(user)),
            None => {
                debug!("stale session code presented");
                (Self { sess_code: None }, None)
            }
        }
    }

    fn response(&self, data: Value) -> Response {
        self.respond(StatusCode::OK, data)
    }

    fn abort(&self, msg: &str) -> Response {
        let code = StatusCode::from_u16(HTML_CODE_ERR).unwrap_or(StatusCode::BAD_REQUEST);
        self.respond(code, json!({ "error": msg }))
    }

    fn respond(&self, code: StatusCode, data: Value) -> Response {
        let mut resp = (code, Json(data)).into_response();
        if let Some(value) = self
            .sess_code
            .as_deref()
            .and_then(|s| HeaderValue::from_str(s).ok())
        {
            resp.headers_mut().insert(SESSION_TAG, value);
        }
        resp
    }
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Registry::default()));
    Router::new()
        .route("/pyrar/v1.0/hello", get(hello))
        .route("/pyrar/v1.0/config", get(get_config))
        .route("/pyrar/v1.0/users/register", post(users_register))
        .route("/pyrar/v1.0/users/login", post(users_login))
        .route("/pyrar/v1.0/users/details", get(users_details))
        .route("/pyrar/v1.0/users/logout", get(users_logout))
        .route(
            "/pyrar/v1.0/echo",
            any(echo).layer(DefaultBodyLimit::disable()),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn hello(State(db): State<Db>, headers: HeaderMap) -> Response {
    let (req, _) = Req::from_headers(&db, &headers).await;
    req.response(json!({ "hello": "world" }))
}

async fn get_config(State(db): State<Db>, headers: HeaderMap) -> Response {
    let (req, _) = Req::from_headers(&db, &headers).await;
    req.response(json!({
        "default_currency": { "iso": "USD", "symbol": "$", "decimal": 2, "separator": [",", "."] },
        "zones": [],
        "policy": {}
    }))
}

async fn users_register(
    State(db): State<Db>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (mut req, _) = Req::from_headers(&db, &headers).await;
    let Ok(input) = serde_json::from_slice::<Register>(&body) else {
        return req.abort("No JSON posted");
    };

    let mut registry = db.write().await;
    if registry.users.contains_key(&input.email) {
        return req.abort("Account already exists");
    }
    registry.next_user_id += 1;
    let user = User {
        user_id: registry.next_user_id,
        name: input.name,
        email: input.email.clone(),
        password: input.password,
    };
    registry.users.insert(input.email.clone(), user.clone());
    let code = registry.open_session(&input.email);
    info!(user_id = user.user_id, "user registered");

    req.sess_code = Some(code.clone());
    req.response(json!({ "user": user, "session": code }))
}

async fn users_login(
    State(db): State<Db>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (mut req, _) = Req::from_headers(&db, &headers).await;
    let Ok(input) = serde_json::from_slice::<Login>(&body) else {
        return req.abort("No JSON posted");
    };

    let mut registry = db.write().await;
    let user = match registry.users.get(&input.email) {
        Some(user) if user.password == input.password => user.clone(),
        _ => return req.abort("Login failed"),
    };
    let code = registry.open_session(&user.email);
    info!(user_id = user.user_id, "user logged in");

    req.sess_code = Some(code.clone());
    req.response(json!({ "user": user, "session": code }))
}

async fn users_details(State(db): State<Db>, headers: HeaderMap) -> Response {
    let (req, user) = Req::from_headers(&db, &headers).await;
    match user {
        Some(user) => req.response(json!({ "user": user, "orders": [] })),
        None => req.abort(NOT_LOGGED_IN),
    }
}

async fn users_logout(State(db): State<Db>, headers: HeaderMap) -> Response {
    let (mut req, user) = Req::from_headers(&db, &headers).await;
    let (Some(user), Some(code)) = (user, req.sess_code.take()) else {
        return req.abort(NOT_LOGGED_IN);
    };
    db.write().await.sessions.remove(&code);
    info!(user_id = user.user_id, "user logged out");
    req.response(json!("logged-out"))
}

/// Reflects the method and body back, for exercising transports. A JSON body
/// comes back as JSON, anything else as a string.
async fn echo(
    State(db): State<Db>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (req, _) = Req::from_headers(&db, &headers).await;
    let body = serde_json::from_slice::<Value>(&body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));
    debug!(%method, "echo");
    req.response(json!({ "method": method.as_str(), "body": body }))
}
