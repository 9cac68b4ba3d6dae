use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::Instrument;
use ulid::Ulid;
use workshop_auth::{SESSION_COOKIE_NAME, SessionCookie, TokenKeys};
use workshop_contracts::{ErrorBody, Principal};
use workshop_store::{
    Client, Jewelry, Order, PgStore, RecordStore, Repair, Smartwatch, StoreError, UserStore,
};

use crate::config::{GatewayConfig, StartupError};
use crate::media::MediaStore;
use crate::rate_limit::RateLimiter;

mod gate;
mod records;
mod session;

pub use self::gate::{GateRejection, authenticate, prefers_html, require_auth, require_role};

const REQUEST_ID_HEADER: &str = "x-request-id";
const LOGIN_LIMITER_MAX_KEYS: usize = 16_384;

/// One store handle per collection.
#[derive(Clone)]
pub struct Stores {
    pub clients: Arc<dyn RecordStore<Client>>,
    pub repairs: Arc<dyn RecordStore<Repair>>,
    pub smartwatches: Arc<dyn RecordStore<Smartwatch>>,
    pub jewelry: Arc<dyn RecordStore<Jewelry>>,
    pub orders: Arc<dyn RecordStore<Order>>,
}

impl Stores {
    pub fn postgres(store: &PgStore) -> Self {
        Self {
            clients: Arc::new(store.records::<Client>()),
            repairs: Arc::new(store.records::<Repair>()),
            smartwatches: Arc::new(store.records::<Smartwatch>()),
            jewelry: Arc::new(store.records::<Jewelry>()),
            orders: Arc::new(store.records::<Order>()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    keys: TokenKeys,
    cookie: SessionCookie,
    users: Arc<dyn UserStore>,
    stores: Stores,
    media: MediaStore,
    login_limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        users: Arc<dyn UserStore>,
        stores: Stores,
    ) -> Result<Self, StartupError> {
        let keys = TokenKeys::from_secret(config.jwt_secret.expose(), config.session_ttl())
            .map_err(|err| StartupError {
                code: err.code,
                message: err.message,
            })?;
        let cookie = SessionCookie::new(
            SESSION_COOKIE_NAME,
            config.is_production(),
            config.session_ttl(),
        );
        let media = MediaStore::new(config.media_dir.clone(), config.media_max_bytes);
        let login_limiter = RateLimiter::new(
            Duration::from_secs(config.login_rate_window_secs.max(1)),
            config.login_rate_limit,
            LOGIN_LIMITER_MAX_KEYS,
        );

        Ok(Self {
            config: Arc::new(config),
            keys,
            cookie,
            users,
            stores,
            media,
            login_limiter,
        })
    }
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub async fn router(config: GatewayConfig) -> Result<Router, StartupError> {
    let store = PgStore::connect_and_migrate(&config.db_url, config.store_timeout())
        .await
        .map_err(|err| StartupError {
            code: "ERR_DB_UNAVAILABLE",
            message: format!("failed to initialize store: {}", err),
        })?;

    let stores = Stores::postgres(&store);
    let state = AppState::new(config, Arc::new(store), stores)?;
    Ok(app(state))
}

pub fn app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/user", get(current_user))
        .merge(records::collection_routes::<Client>(&state.config))
        .merge(records::collection_routes::<Repair>(&state.config))
        .merge(records::collection_routes::<Smartwatch>(&state.config))
        .merge(records::collection_routes::<Jewelry>(&state.config))
        .merge(records::collection_routes::<Order>(&state.config))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let cors = cors_layer(&state.config);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .merge(session::routes())
        .merge(protected)
        .layer(middleware::from_fn(trace_requests))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(config.cors_origin.clone())
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ReadyzResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, bool>,
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();

    let store_ready = state.users.ping().await.is_ok();
    checks.insert("store", store_ready);

    let media_ready = tokio::fs::create_dir_all(state.media.root()).await.is_ok();
    checks.insert("media", media_ready);

    let all_ready = checks.values().all(|ok| *ok);
    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyzResponse {
            status: if all_ready { "ready" } else { "not_ready" },
            checks,
        }),
    )
}

async fn metrics() -> impl IntoResponse {
    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

#[derive(Debug, Serialize)]
struct CurrentUserResponse {
    username: String,
}

async fn current_user(Extension(principal): Extension<Principal>) -> Json<CurrentUserResponse> {
    Json(CurrentUserResponse {
        username: principal.username,
    })
}

async fn trace_requests(req: Request, next: Next) -> Response {
    let request_id = extract_request_id(req.headers());
    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let span = tracing::info_span!(
        "http.request",
        request_id = %request_id,
        method = %method,
        route = %route,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );
    let started = Instant::now();

    let mut response = next.run(req).instrument(span.clone()).await;

    let elapsed = started.elapsed();
    let status = response.status().as_u16();
    span.record("status", status);
    span.record("latency_ms", elapsed.as_millis() as u64);
    crate::metrics::observe_http_request(&route, method.as_str(), status, elapsed);

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(raw.len().min(MAX_LEN));

    for ch in raw.chars() {
        if out.len() >= MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        }
    }

    (!out.is_empty()).then_some(out)
}

fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> ApiError {
    (
        status,
        Json(ErrorBody {
            code: code.into(),
            message: message.into(),
        }),
    )
}

fn internal_error() -> ApiError {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "ERR_INTERNAL",
        "internal server error",
    )
}

fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::Conflict(message) => json_error(StatusCode::CONFLICT, "ERR_CONFLICT", message),
        StoreError::Timeout | StoreError::Unavailable => {
            tracing::warn!(error = %err, "store.unavailable");
            internal_error()
        }
        StoreError::Sqlx(_) => {
            tracing::error!(error = %err, "store.failure");
            internal_error()
        }
    }
}
