//! In-process HTTP servers for tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use session::{MemoryStore, TokenRecord, TokenStore};
use tokio::net::TcpListener;

use crate::config::ClientConfig;

/// Serve `app` on an ephemeral localhost port and return its base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Echo method, path, selected headers and body back as JSON.
pub async fn start_echo_server() -> String {
    let app = Router::new().fallback(|request: axum::http::Request<axum::body::Body>| async move {
        let mut headers = serde_json::Map::new();
        for (name, value) in request.headers() {
            headers.insert(
                name.to_string(),
                Value::String(value.to_str().unwrap_or("").to_string()),
            );
        }
        let method = request.method().to_string();
        let path = request.uri().path().to_string();
        let bytes = axum::body::to_bytes(request.into_body(), 1024 * 1024)
            .await
            .unwrap();
        Json(json!({
            "method": method,
            "path": path,
            "headers": headers,
            "body": String::from_utf8_lossy(&bytes),
        }))
    });
    spawn_server(app).await
}

/// A socket that accepts connections and never answers.
pub async fn start_hanging_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(socket);
            });
        }
    });
    format!("http://{addr}")
}

/// A localhost URL nothing listens on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn memory_tokens() -> TokenStore {
    TokenStore::new(Arc::new(MemoryStore::new()))
}

pub fn tokens_with(token: &str) -> TokenStore {
    let tokens = memory_tokens();
    tokens.set(&TokenRecord::new(token, None)).unwrap();
    tokens
}

pub fn config_for(base_url: &str) -> ClientConfig {
    ClientConfig::new(base_url)
}

/// Behaviour knobs of the mock API.
#[derive(Clone)]
pub struct MockOptions {
    pub refresh_delay: Duration,
    pub refresh_status: StatusCode,
    /// Protected resource rejects every token
    pub always_unauthorized: bool,
    /// Login and refresh succeed but hand out `""` as the token
    pub blank_tokens: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            refresh_delay: Duration::ZERO,
            refresh_status: StatusCode::OK,
            always_unauthorized: false,
            blank_tokens: false,
        }
    }
}

/// Mock API speaking the login/refresh contract.
///
/// Login hands out `t1`, which the protected resource already considers
/// expired; refresh hands out `t2`, which it accepts.
pub struct MockApi {
    pub url: String,
    pub state: Arc<MockState>,
}

pub struct MockState {
    options: MockOptions,
    pub refresh_calls: AtomicUsize,
    pub protected_calls: AtomicUsize,
    pub refresh_auth: Mutex<Vec<Option<String>>>,
    pub protected_auth: Mutex<Vec<Option<String>>>,
    pub request_ids: Mutex<Vec<Option<String>>>,
}

impl MockApi {
    pub async fn start(options: MockOptions) -> Self {
        let state = Arc::new(MockState {
            options,
            refresh_calls: AtomicUsize::new(0),
            protected_calls: AtomicUsize::new(0),
            refresh_auth: Mutex::new(Vec::new()),
            protected_auth: Mutex::new(Vec::new()),
            request_ids: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/api/v1/auth/login", post(login))
            .route("/api/v1/auth/refresh", post(refresh))
            .route("/api/v1/protected", get(protected))
            .route("/api/v1/forbidden", get(forbidden))
            .route("/api/v1/broken", get(broken))
            .with_state(state.clone());
        let url = spawn_server(app).await;
        Self { url, state }
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn protected_calls(&self) -> usize {
        self.state.protected_calls.load(Ordering::SeqCst)
    }

    pub fn protected_auth(&self) -> Vec<Option<String>> {
        self.state.protected_auth.lock().unwrap().clone()
    }

    pub fn refresh_auth(&self) -> Vec<Option<String>> {
        self.state.refresh_auth.lock().unwrap().clone()
    }

    pub fn request_ids(&self) -> Vec<Option<String>> {
        self.state.request_ids.lock().unwrap().clone()
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn login(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if body["password"] == "correct-horse" {
        let token = if state.options.blank_tokens { "" } else { "t1" };
        (
            StatusCode::OK,
            Json(json!({
                "token": token,
                "user": {"id": 1, "email": body["email"], "role": "applicant"}
            })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid credentials"})),
        )
    }
}

async fn refresh(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    state
        .refresh_auth
        .lock()
        .unwrap()
        .push(header(&headers, "authorization"));
    tokio::time::sleep(state.options.refresh_delay).await;

    if state.options.refresh_status.is_success() {
        let token = if state.options.blank_tokens { "" } else { "t2" };
        (StatusCode::OK, Json(json!({"token": token})))
    } else {
        (
            state.options.refresh_status,
            Json(json!({"error": "refresh token expired"})),
        )
    }
}

async fn protected(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.protected_calls.fetch_add(1, Ordering::SeqCst);
    let auth = header(&headers, "authorization");
    state.protected_auth.lock().unwrap().push(auth.clone());
    state
        .request_ids
        .lock()
        .unwrap()
        .push(header(&headers, "x-request-id"));

    if !state.options.always_unauthorized && auth.as_deref() == Some("Bearer t2") {
        (
            StatusCode::OK,
            Json(json!({"applications": [{"id": 10, "status": "submitted"}]})),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "token expired"})),
        )
    }
}

async fn forbidden() -> (StatusCode, Json<Value>) {
    (
        StatusCode::FORBIDDEN,
        Json(json!({"message": "admin role required"})),
    )
}

async fn broken() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!([{"message": "database unavailable"}])),
    )
}
