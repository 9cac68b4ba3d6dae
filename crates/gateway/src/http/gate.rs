use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use workshop_auth::{
    ERR_AUTH_EXPIRED, ERR_AUTH_INVALID, ERR_AUTH_REQUIRED, SESSION_COOKIE_NAME, extract_credential,
};
use workshop_contracts::{Principal, Role};

use super::{AppState, json_error};

/// Why the gate refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    MissingCredential,
    InvalidToken,
    ExpiredToken,
    PrincipalNotFound,
    StoreUnavailable,
}

impl GateRejection {
    pub fn outcome(self) -> &'static str {
        match self {
            GateRejection::MissingCredential => "missing",
            GateRejection::InvalidToken => "invalid",
            GateRejection::ExpiredToken => "expired",
            GateRejection::PrincipalNotFound => "principal_not_found",
            GateRejection::StoreUnavailable => "store_unavailable",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            GateRejection::MissingCredential
            | GateRejection::InvalidToken
            | GateRejection::ExpiredToken => StatusCode::UNAUTHORIZED,
            GateRejection::PrincipalNotFound => StatusCode::FORBIDDEN,
            GateRejection::StoreUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            GateRejection::MissingCredential => ERR_AUTH_REQUIRED,
            GateRejection::InvalidToken => ERR_AUTH_INVALID,
            GateRejection::ExpiredToken => ERR_AUTH_EXPIRED,
            GateRejection::PrincipalNotFound => "ERR_ACCESS_DENIED",
            GateRejection::StoreUnavailable => "ERR_INTERNAL",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            GateRejection::MissingCredential => "authentication required",
            GateRejection::InvalidToken => "invalid token",
            GateRejection::ExpiredToken => "token expired",
            GateRejection::PrincipalNotFound => "access denied",
            GateRejection::StoreUnavailable => "internal server error",
        }
    }

    /// A presented credential that cannot be honoured is removed from the client.
    pub fn clears_cookie(self) -> bool {
        matches!(
            self,
            GateRejection::InvalidToken
                | GateRejection::ExpiredToken
                | GateRejection::PrincipalNotFound
        )
    }
}

/// Resolves the principal behind the request credential without touching the
/// response. Never logs the token.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal, GateRejection> {
    let result = resolve_principal(state, headers).await;

    let outcome = match &result {
        Ok(_) => "allow",
        Err(rejection) => rejection.outcome(),
    };
    crate::metrics::observe_auth_outcome(outcome);

    match &result {
        Ok(principal) => tracing::debug!(outcome, principal_id = principal.id, "auth.gate"),
        Err(GateRejection::StoreUnavailable) => tracing::warn!(outcome, "auth.gate"),
        Err(_) => tracing::info!(outcome, "auth.gate"),
    }

    result
}

async fn resolve_principal(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Principal, GateRejection> {
    let credential =
        extract_credential(headers, SESSION_COOKIE_NAME).ok_or(GateRejection::MissingCredential)?;

    let claims = state
        .keys
        .verify(&credential.token)
        .map_err(|err| match err.code {
            ERR_AUTH_EXPIRED => GateRejection::ExpiredToken,
            _ => GateRejection::InvalidToken,
        })?;

    match state.users.find_principal(claims.user_id).await {
        Ok(Some(principal)) => Ok(principal),
        Ok(None) => Err(GateRejection::PrincipalNotFound),
        Err(err) => {
            tracing::warn!(
                error = %err,
                credential_source = credential.source.as_str(),
                "auth.gate principal lookup failed"
            );
            Err(GateRejection::StoreUnavailable)
        }
    }
}

/// Middleware guarding every protected route.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let wants_html = prefers_html(req.headers());

    match authenticate(&state, req.headers()).await {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(rejection) => rejection_response(&state, rejection, wants_html),
    }
}

pub(super) fn rejection_response(
    state: &AppState,
    rejection: GateRejection,
    wants_html: bool,
) -> Response {
    let mut response = if wants_html && rejection != GateRejection::StoreUnavailable {
        Redirect::to(&state.config.login_path).into_response()
    } else {
        json_error(rejection.status(), rejection.code(), rejection.message()).into_response()
    };

    if rejection.clears_cookie() {
        response
            .headers_mut()
            .append(header::SET_COOKIE, state.cookie.clear());
    }
    response
}

/// Role check layered after [`require_auth`].
pub async fn require_role(State(role): State<Role>, req: Request, next: Next) -> Response {
    match req.extensions().get::<Principal>() {
        None => json_error(StatusCode::FORBIDDEN, "ERR_ACCESS_DENIED", "access denied")
            .into_response(),
        Some(principal) if !principal.has_role(role) => {
            tracing::info!(
                principal_id = principal.id,
                required_role = role.as_str(),
                "auth.role denied"
            );
            json_error(
                StatusCode::FORBIDDEN,
                "ERR_INSUFFICIENT_PERMISSIONS",
                "insufficient permissions",
            )
            .into_response()
        }
        Some(_) => next.run(req).await,
    }
}

/// True when the `Accept` header ranks an HTML type at least as high as JSON.
/// A missing header or a bare `*/*` counts as JSON.
pub fn prefers_html(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return false;
    };

    let mut html_q = 0.0_f32;
    let mut json_q = 0.0_f32;

    for item in accept.split(',') {
        let mut parts = item.split(';');
        let media = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let q = parts
            .filter_map(|param| param.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0)
            .clamp(0.0, 1.0);

        match media.as_str() {
            "text/html" | "application/xhtml+xml" | "text/*" => html_q = html_q.max(q),
            "application/json" | "*/*" => json_q = json_q.max(q),
            _ => {}
        }
    }

    html_q > 0.0 && html_q >= json_q
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn accept(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn browsers_prefer_html() {
        assert!(prefers_html(&accept(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
        )));
        assert!(prefers_html(&accept("text/*")));
    }

    #[test]
    fn api_clients_prefer_json() {
        assert!(!prefers_html(&HeaderMap::new()));
        assert!(!prefers_html(&accept("*/*")));
        assert!(!prefers_html(&accept("application/json")));
        assert!(!prefers_html(&accept("application/json, text/html;q=0.5")));
        assert!(!prefers_html(&accept("text/html;q=0")));
    }

    #[test]
    fn rejection_categories() {
        assert_eq!(GateRejection::ExpiredToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(GateRejection::PrincipalNotFound.status(), StatusCode::FORBIDDEN);
        assert!(!GateRejection::MissingCredential.clears_cookie());
        assert!(GateRejection::InvalidToken.clears_cookie());
        assert!(!GateRejection::StoreUnavailable.clears_cookie());
        assert_eq!(GateRejection::ExpiredToken.message(), "token expired");
    }
}
