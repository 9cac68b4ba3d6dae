use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use workshop_auth::password::{hash_password, verify_password};
use workshop_contracts::{MessageBody, Principal, Role};
use workshop_store::{NewUser, StoreError};

use super::gate::{GateRejection, authenticate, rejection_response};
use super::{ApiError, AppState, internal_error, json_error, store_error};

const MIN_PASSWORD_LEN: usize = 8;
const INVALID_CREDENTIALS: &str = "invalid email or password";

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", get(logout).post(logout))
        .route("/auth/check", get(check))
}

#[derive(Debug, Serialize)]
struct UserView {
    id: i64,
    username: String,
    email: String,
    role: Role,
}

impl From<Principal> for UserView {
    fn from(principal: Principal) -> Self {
        Self {
            id: principal.id,
            username: principal.username,
            email: principal.email,
            role: principal.role,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    message: &'static str,
    user: UserView,
}

async fn register(
    State(state): State<AppState>,
    req: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let Json(req) = req.map_err(|rejection| {
        json_error(
            StatusCode::BAD_REQUEST,
            "ERR_INVALID_PARAMS",
            rejection.body_text(),
        )
    })?;

    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();
    if username.is_empty() {
        return Err(validation_error("username is required"));
    }
    if !email.contains('@') {
        return Err(validation_error("email must be a valid address"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(validation_error(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|_| internal_error())?
        .map_err(|err| {
            tracing::error!(error = %err, "auth.register hash failed");
            internal_error()
        })?;

    let principal = state
        .users
        .create_user(NewUser {
            username,
            email,
            password_hash,
            role: Role::User,
        })
        .await
        .map_err(|err| match err {
            StoreError::Conflict(message) => {
                json_error(StatusCode::BAD_REQUEST, "ERR_CONFLICT", message)
            }
            other => store_error(other),
        })?;

    tracing::info!(principal_id = principal.id, "auth.registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "user registered",
            user: principal.into(),
        }),
    ))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    message: &'static str,
    token: String,
    user: UserView,
}

async fn login(
    State(state): State<AppState>,
    req: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = req.map_err(|rejection| {
        json_error(
            StatusCode::BAD_REQUEST,
            "ERR_INVALID_PARAMS",
            rejection.body_text(),
        )
    })?;

    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(validation_error(INVALID_CREDENTIALS));
    }

    if !state.login_limiter.allow(&email) {
        tracing::warn!("auth.login rate limited");
        return Err(json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "ERR_RATE_LIMITED",
            "too many login attempts, try again later",
        ));
    }

    let user = state
        .users
        .find_by_email(&email)
        .await
        .map_err(store_error)?;
    let Some(user) = user else {
        tracing::info!(outcome = "unknown_email", "auth.login");
        return Err(validation_error(INVALID_CREDENTIALS));
    };

    let password = req.password;
    let stored_hash = user.password_hash;
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|_| internal_error())?;
    if !verified {
        tracing::info!(outcome = "bad_password", principal_id = user.principal.id, "auth.login");
        return Err(validation_error(INVALID_CREDENTIALS));
    }

    let principal = user.principal;
    let issued = state
        .keys
        .issue(principal.id, principal.role)
        .map_err(|err| {
            tracing::error!(error = %err, "auth.login token issue failed");
            internal_error()
        })?;
    let cookie = state.cookie.set(&issued.token).ok_or_else(internal_error)?;

    state.login_limiter.reset(&email);
    tracing::info!(outcome = "success", principal_id = principal.id, "auth.login");

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, cookie);
    Ok((
        headers,
        Json(LoginResponse {
            message: "login successful",
            token: issued.token,
            user: principal.into(),
        }),
    )
        .into_response())
}

async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, state.cookie.clear());
    (
        headers,
        Json(MessageBody {
            message: "logged out".to_string(),
        }),
    )
}

#[derive(Debug, Serialize)]
struct CheckResponse {
    username: String,
    email: String,
    role: Role,
}

/// Same resolution as the gate, always answered in JSON and with 404 for a
/// vanished user.
async fn check(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match authenticate(&state, &headers).await {
        Ok(principal) => Json(CheckResponse {
            username: principal.username,
            email: principal.email,
            role: principal.role,
        })
        .into_response(),
        Err(GateRejection::PrincipalNotFound) => {
            let mut response =
                json_error(StatusCode::NOT_FOUND, "ERR_NOT_FOUND", "user not found").into_response();
            response
                .headers_mut()
                .append(header::SET_COOKIE, state.cookie.clear());
            response
        }
        Err(rejection) => rejection_response(&state, rejection, false),
    }
}

fn validation_error(message: impl Into<String>) -> ApiError {
    json_error(StatusCode::BAD_REQUEST, "ERR_VALIDATION", message)
}
