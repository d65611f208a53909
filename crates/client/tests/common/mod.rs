//! In-process mock of the Herald API used by the client integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};

use herald_client::{
    ClientConfig, Credential, CredentialStore, HalClient, MemoryCredentialStore, SessionManager,
};
use herald_events::{EventBus, InMemoryEventBus, SessionEvent};

pub const SECRET: &str = "test-secret";
pub const ORG_ID: &str = "0191c3a4-8f0e-7c3b-9a55-4a4cbbd0a002";
pub const USER_ID: &str = "0191c3a4-8f0e-7c3b-9a55-4a4cbbd0a001";

/// Sign an access token that expires `secs` from now (negative: already expired).
pub fn mint(secs: i64) -> String {
    let claims = json!({
        "sub": USER_ID,
        "iat": Utc::now().timestamp(),
        "exp": Utc::now().timestamp() + secs,
        "jti": uuid::Uuid::now_v7().to_string(),
    });

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

pub fn user(permissions: &[&str], organization: bool) -> Value {
    let mut user = json!({
        "id": USER_ID,
        "email": "a@b.com",
        "name": "Ada",
        "roles": ["operator"],
        "permissions": permissions,
    });
    if organization {
        user["organizationId"] = json!(ORG_ID);
    }
    user
}

/// Knobs and counters shared between the test and the mock routes.
pub struct Mock {
    pub login_access_token: Mutex<String>,
    pub user: Mutex<Value>,
    pub me_user: Mutex<Value>,

    pub refresh_status: AtomicU16,
    pub me_status: AtomicU16,
    pub logout_status: AtomicU16,

    pub issued: Mutex<Option<String>>,

    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub org_calls: AtomicUsize,
    pub echo_calls: AtomicUsize,
    pub approve_calls: AtomicUsize,
    pub deny_calls: AtomicUsize,
    pub purge_calls: AtomicUsize,
}

impl Default for Mock {
    fn default() -> Self {
        Self {
            login_access_token: Mutex::new(mint(3600)),
            user: Mutex::new(user(&["audit:view"], true)),
            me_user: Mutex::new(user(&["audit:view"], true)),
            refresh_status: AtomicU16::new(200),
            me_status: AtomicU16::new(200),
            logout_status: AtomicU16::new(204),
            issued: Mutex::new(None),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            me_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            org_calls: AtomicUsize::new(0),
            echo_calls: AtomicUsize::new(0),
            approve_calls: AtomicUsize::new(0),
            deny_calls: AtomicUsize::new(0),
            purge_calls: AtomicUsize::new(0),
        }
    }
}

impl Mock {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn set_status(slot: &AtomicU16, status: u16) {
        slot.store(status, Ordering::SeqCst);
    }

    pub fn issued(&self) -> Option<String> {
        self.issued.lock().unwrap().clone()
    }
}

fn problem(status: StatusCode, title: &str, detail: &str) -> Response {
    (
        status,
        Json(json!({
            "type": "about:blank",
            "title": title,
            "status": status.as_u16(),
            "detail": detail,
        })),
    )
        .into_response()
}

fn status_of(slot: &AtomicU16) -> StatusCode {
    StatusCode::from_u16(slot.load(Ordering::SeqCst)).unwrap()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn login(State(mock): State<Arc<Mock>>, Json(body): Json<Value>) -> Response {
    mock.login_calls.fetch_add(1, Ordering::SeqCst);
    if body["email"] != "a@b.com" || body["password"] != "secret" {
        return problem(StatusCode::UNAUTHORIZED, "Unauthorized", "invalid email or password");
    }
    let access = mock.login_access_token.lock().unwrap().clone();
    let user = mock.user.lock().unwrap().clone();
    Json(json!({ "accessToken": access, "refreshToken": "r1", "user": user })).into_response()
}

async fn refresh(State(mock): State<Arc<Mock>>, Json(body): Json<Value>) -> Response {
    let n = mock.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if body["refreshToken"].as_str().is_none() {
        return problem(StatusCode::UNPROCESSABLE_ENTITY, "Validation failed", "refreshToken missing");
    }
    // Hold the call open so concurrent callers pile up behind it.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = status_of(&mock.refresh_status);
    if !status.is_success() {
        return problem(status, "Refresh failed", "refresh token rejected");
    }
    let access = mint(3600);
    *mock.issued.lock().unwrap() = Some(access.clone());
    Json(json!({ "accessToken": access, "refreshToken": format!("r{}", n + 1) })).into_response()
}

async fn logout(State(mock): State<Arc<Mock>>) -> Response {
    mock.logout_calls.fetch_add(1, Ordering::SeqCst);
    let status = status_of(&mock.logout_status);
    if status.is_success() {
        status.into_response()
    } else {
        problem(status, "Server error", "logout backend down")
    }
}

async fn me(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> Response {
    mock.me_calls.fetch_add(1, Ordering::SeqCst);
    if bearer(&headers).is_none() {
        return problem(StatusCode::UNAUTHORIZED, "Unauthorized", "missing bearer token");
    }
    let status = status_of(&mock.me_status);
    if !status.is_success() {
        return problem(status, "Who am I failed", "identity lookup failed");
    }
    Json(mock.me_user.lock().unwrap().clone()).into_response()
}

async fn organization(State(mock): State<Arc<Mock>>, Path(id): Path<String>) -> Response {
    mock.org_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "id": id,
        "name": "Acme",
        "_links": { "self": { "href": format!("/organizations/{id}") } }
    }))
    .into_response()
}

async fn echo(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> Response {
    mock.echo_calls.fetch_add(1, Ordering::SeqCst);
    match bearer(&headers) {
        Some(token) => Json(json!({
            "authorization": token,
            "_links": { "self": { "href": "/echo" } }
        }))
        .into_response(),
        None => problem(StatusCode::UNAUTHORIZED, "Unauthorized", "missing bearer token"),
    }
}

async fn notification(Path(id): Path<String>) -> Response {
    Json(json!({
        "id": id,
        "status": "pending",
        "_links": {
            "self": { "href": format!("/notifications/{id}") },
            "approve": { "href": format!("/notifications/{id}/approve"), "method": "POST" },
            "purge": { "href": format!("/notifications/{id}/purge"), "method": "PATCH" }
        }
    }))
    .into_response()
}

async fn approve(State(mock): State<Arc<Mock>>, Path(id): Path<String>) -> Response {
    mock.approve_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "id": id,
        "status": "approved",
        "_links": { "self": { "href": format!("/notifications/{id}") } }
    }))
    .into_response()
}

async fn deny(State(mock): State<Arc<Mock>>) -> Response {
    mock.deny_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT.into_response()
}

async fn purge(State(mock): State<Arc<Mock>>) -> Response {
    mock.purge_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT.into_response()
}

async fn forbidden() -> Response {
    problem(StatusCode::FORBIDDEN, "Forbidden", "missing audit:view")
}

async fn invalid() -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "title": "Validation failed",
            "status": 422,
            "errors": [ { "field": "email", "message": "must not be empty" } ]
        })),
    )
        .into_response()
}

async fn malformed() -> Response {
    (StatusCode::OK, "<html>maintenance</html>").into_response()
}

async fn unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "upstream down").into_response()
}

async fn revoked() -> Response {
    problem(StatusCode::UNAUTHORIZED, "Unauthorized", "token revoked")
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_secs(3)).await;
    Json(json!({})).into_response()
}

fn router(mock: Arc<Mock>) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/organizations/:id", get(organization))
        .route("/echo", get(echo))
        .route("/notifications/:id", get(notification))
        .route("/notifications/:id/approve", post(approve))
        .route("/notifications/:id/deny", post(deny))
        .route("/notifications/:id/purge", post(purge))
        .route("/problems/forbidden", get(forbidden))
        .route("/problems/invalid", post(invalid))
        .route("/problems/malformed", get(malformed))
        .route("/problems/unavailable", get(unavailable))
        .route("/problems/revoked", get(revoked))
        .route("/slow", get(slow))
        .with_state(mock)
}

pub struct TestServer {
    pub base_url: String,
    pub mock: Arc<Mock>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let mock = Arc::new(Mock::default());
        let app = router(Arc::clone(&mock));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            mock,
            handle,
        }
    }

    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.base_url.clone());
        config.request_timeout = Duration::from_secs(1);
        config
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A session wired to a running mock, with handles on its store and bus.
pub struct Harness {
    pub server: TestServer,
    pub store: Arc<MemoryCredentialStore>,
    pub bus: Arc<InMemoryEventBus<SessionEvent>>,
    pub invalidations: Arc<AtomicUsize>,
    pub session: SessionManager,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(MemoryCredentialStore::new(), |_| {}).await
    }

    pub async fn with_credential(credential: Credential) -> Self {
        Self::build(MemoryCredentialStore::with_credential(&credential), |_| {}).await
    }

    pub async fn build(store: MemoryCredentialStore, tune: impl FnOnce(&mut ClientConfig)) -> Self {
        let server = TestServer::spawn().await;
        let mut config = server.config();
        tune(&mut config);

        let store = Arc::new(store);
        let bus = Arc::new(InMemoryEventBus::<SessionEvent>::new());

        let invalidations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invalidations);
        bus.subscribe(Arc::new(move |_: &SessionEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let dyn_store: Arc<dyn CredentialStore> = store.clone();
        let dyn_bus: Arc<dyn EventBus<SessionEvent>> = bus.clone();
        let client = HalClient::new(&config, dyn_store, dyn_bus).unwrap();
        let session = SessionManager::new(client);

        Self {
            server,
            store,
            bus,
            invalidations,
            session,
        }
    }

    pub fn mock(&self) -> &Mock {
        &self.server.mock
    }

    pub fn client(&self) -> &HalClient {
        self.session.client()
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}
