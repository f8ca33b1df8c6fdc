#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Local};
use serde_json::{json, Value};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration as StdDuration,
};
use subtrack::{KeyValueStore, MemoryStore, SessionManager};

pub const PASSWORD: &str = "correct-horse";
pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const USER_EMAIL: &str = "ana@example.com";
pub const OTHER_EMAIL: &str = "bo@example.com";
pub const TAKEN_EMAIL: &str = "taken@example.com";

/// Which shape the analytics endpoints answer with.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsMode {
    Healthy,
    Broken,
    WrongShape,
}

/// In-process stand-in for the subscription-tracker backend.
#[derive(Clone)]
pub struct Backend {
    valid_access: Arc<Mutex<HashSet<String>>>,
    issued: Arc<AtomicUsize>,
    refresh_accepted: Arc<AtomicBool>,
    refresh_delay_ms: Arc<AtomicU64>,
    reject_all_tokens: Arc<AtomicBool>,
    analytics: Arc<Mutex<AnalyticsMode>>,
    pub refresh_calls: Arc<AtomicUsize>,
    pub subscription_list_calls: Arc<AtomicUsize>,
    pub register_calls: Arc<AtomicUsize>,
}

impl Backend {
    pub fn new() -> Self {
        Self {
            valid_access: Arc::new(Mutex::new(HashSet::from(["access-1".to_string()]))),
            issued: Arc::new(AtomicUsize::new(1)),
            refresh_accepted: Arc::new(AtomicBool::new(true)),
            refresh_delay_ms: Arc::new(AtomicU64::new(0)),
            reject_all_tokens: Arc::new(AtomicBool::new(false)),
            analytics: Arc::new(Mutex::new(AnalyticsMode::Healthy)),
            refresh_calls: Arc::new(AtomicUsize::new(0)),
            subscription_list_calls: Arc::new(AtomicUsize::new(0)),
            register_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Invalidates every issued access token without issuing a new one.
    pub fn expire_access_token(&self) {
        self.valid_access.lock().unwrap().clear();
    }

    pub fn reject_refresh(&self) {
        self.refresh_accepted.store(false, Ordering::SeqCst);
    }

    /// Holds every refresh response back by `delay`.
    pub fn delay_refresh(&self, delay: StdDuration) {
        self.refresh_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn reject_all_tokens(&self) {
        self.reject_all_tokens.store(true, Ordering::SeqCst);
    }

    pub fn set_analytics(&self, mode: AnalyticsMode) {
        *self.analytics.lock().unwrap() = mode;
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        if self.reject_all_tokens.load(Ordering::SeqCst) {
            return false;
        }
        let valid = self.valid_access.lock().unwrap();
        headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| valid.contains(token))
    }

    fn analytics_mode(&self) -> AnalyticsMode {
        *self.analytics.lock().unwrap()
    }
}

pub fn user_json(email: &str) -> Value {
    if email == ADMIN_EMAIL {
        json!({ "id": 1, "email": ADMIN_EMAIL, "username": "root", "role": "admin" })
    } else {
        json!({ "id": 2, "email": email, "username": "ana", "role": "user" })
    }
}

/// Three subscriptions: monthly in 2 days, yearly in 30 days, shared weekly
/// in exactly 7 days.
pub fn subscriptions_json() -> Value {
    let today = Local::now().date_naive();
    json!([
        {
            "id": 1, "service_name": "Spotify", "cost": "9.99", "billing_cycle": "monthly",
            "renewal_date": (today + Duration::days(2)).to_string(), "is_shared": false, "user": 2
        },
        {
            "id": 2, "service_name": "Domain", "cost": "99.00", "billing_cycle": "yearly",
            "renewal_date": (today + Duration::days(30)).to_string(), "is_shared": false, "user": 2
        },
        {
            "id": 3, "service_name": "Newsletter", "cost": "4.99", "billing_cycle": "weekly",
            "renewal_date": (today + Duration::days(7)).to_string(), "is_shared": true, "user": 1
        }
    ])
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Given token not valid for any token type" })),
    )
        .into_response()
}

async fn login(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default();
    if body["password"] != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "No active account found with the given credentials" })),
        )
            .into_response();
    }
    // the seeded accounts share the first token pair; anyone else gets their own
    let (access, refresh) = if email == USER_EMAIL || email == ADMIN_EMAIL {
        ("access-1".to_string(), "refresh-1".to_string())
    } else {
        let name = email.split('@').next().unwrap_or(email);
        (format!("access-{name}"), format!("refresh-{name}"))
    };
    backend.valid_access.lock().unwrap().insert(access.clone());
    Json(json!({ "access": access, "refresh": refresh, "user": user_json(email) })).into_response()
}

async fn refresh(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = backend.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(StdDuration::from_millis(delay)).await;
    }
    let known = body["refresh"]
        .as_str()
        .is_some_and(|token| token.starts_with("refresh-"));
    if !backend.refresh_accepted.load(Ordering::SeqCst) || !known {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Token is invalid or expired", "code": "token_not_valid" })),
        )
            .into_response();
    }
    let next = backend.issued.fetch_add(1, Ordering::SeqCst) + 1;
    let access = format!("access-{next}");
    backend.valid_access.lock().unwrap().insert(access.clone());
    Json(json!({ "access": access })).into_response()
}

async fn list_subscriptions(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    backend.subscription_list_calls.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(subscriptions_json()).into_response()
}

async fn create_subscription(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    if body["cost"].as_str().is_none_or(|cost| cost.parse::<f64>().is_err()) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "cost": ["A valid number is required."] })),
        )
            .into_response();
    }
    body["id"] = json!(99);
    body["is_shared"] = json!(false);
    body["user"] = json!(2);
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn get_subscription(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    let all = subscriptions_json();
    match all.as_array().unwrap().iter().find(|sub| sub["id"] == id) {
        Some(sub) => Json(sub.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." }))).into_response(),
    }
}

async fn update_subscription(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(mut body): Json<Value>,
) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    body["id"] = json!(id);
    if body.get("is_shared").is_none() {
        body["is_shared"] = json!(false);
    }
    Json(body).into_response()
}

async fn delete_subscription(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    if id == 3 {
        return (StatusCode::FORBIDDEN, Json(json!({ "detail": "Permission denied" }))).into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn list_users(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(json!([
        user_json(ADMIN_EMAIL),
        user_json(USER_EMAIL),
        { "id": 3, "email": "bo@example.com", "role": "user" }
    ]))
    .into_response()
}

async fn register_user(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.register_calls.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    let email = body["email"].as_str().unwrap_or_default();
    if email == TAKEN_EMAIL {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "email": ["custom user with this email already exists."] })),
        )
            .into_response();
    }
    (
        StatusCode::CREATED,
        Json(json!({ "id": 10, "email": email, "username": body["username"], "role": "user" })),
    )
        .into_response()
}

async fn upcoming_renewals(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    match backend.analytics_mode() {
        AnalyticsMode::Broken => (StatusCode::INTERNAL_SERVER_ERROR, "Server Error (500)").into_response(),
        AnalyticsMode::WrongShape => {
            Json(json!([{ "service": "Spotify", "renewal_date": "2026-01-01" }])).into_response()
        }
        AnalyticsMode::Healthy => Json(json!([{
            "id": 42, "service_name": "Primary", "cost": "1.00",
            "renewal_date": Local::now().date_naive().to_string(), "days_until_renewal": 0
        }]))
        .into_response(),
    }
}

async fn summary(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    match backend.analytics_mode() {
        AnalyticsMode::Broken => (StatusCode::INTERNAL_SERVER_ERROR, "Server Error (500)").into_response(),
        AnalyticsMode::WrongShape => {
            Json(json!({ "total_subscriptions": 3, "total_spent": "113.98" })).into_response()
        }
        AnalyticsMode::Healthy => Json(json!({
            "total_subscriptions": 1, "monthly_total": "1.00",
            "yearly_total": "0.00", "average_cost": "1.00"
        }))
        .into_response(),
    }
}

async fn insights(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    match backend.analytics_mode() {
        AnalyticsMode::Healthy => Json(json!([
            { "type": "cost_review", "message": "Domain is your largest cost.", "priority": "high" }
        ]))
        .into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Server Error (500)").into_response(),
    }
}

pub fn router(backend: Backend) -> Router {
    Router::new()
        .route("/auth/login/", post(login))
        .route("/auth/token/refresh/", post(refresh))
        .route("/auth/users/", get(list_users))
        .route("/auth/user-register/", post(register_user))
        .route("/api/subscriptions/", get(list_subscriptions).post(create_subscription))
        .route(
            "/api/subscriptions/:id/",
            get(get_subscription)
                .put(update_subscription)
                .delete(delete_subscription),
        )
        .route("/analytics/upcoming-renewals/", get(upcoming_renewals))
        .route("/analytics/summary/", get(summary))
        .route("/analytics/ai-suggestions/", get(insights))
        .with_state(backend)
}

/// Serves `backend` on an ephemeral port and returns its origin.
pub async fn spawn_backend(backend: Backend) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind random port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(backend)).await.unwrap();
    });
    format!("http://{addr}")
}

pub async fn manager_with_store(base_url: &str, store: Arc<MemoryStore>) -> SessionManager {
    SessionManager::init(reqwest::Client::new(), base_url, store).await
}

pub async fn stored_keys(store: &dyn KeyValueStore) -> Vec<Option<String>> {
    let mut values = Vec::new();
    for key in ["access_token", "refresh_token", "user_data"] {
        values.push(store.get(key).await);
    }
    values
}
