use std::time::Duration;

use http::HeaderMap;
use http::header;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use workshop_contracts::Role;

pub mod cookie;
pub mod password;

pub use cookie::{SameSite, SessionCookie};

pub const SESSION_COOKIE_NAME: &str = "token";

pub const ERR_AUTH_REQUIRED: &str = "ERR_AUTH_REQUIRED";
pub const ERR_AUTH_INVALID: &str = "ERR_AUTH_INVALID";
pub const ERR_AUTH_EXPIRED: &str = "ERR_AUTH_EXPIRED";
pub const ERR_INVALID_CONFIG: &str = "ERR_INVALID_CONFIG";
pub const ERR_INTERNAL: &str = "ERR_INTERNAL";

const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct AuthError {
    pub code: &'static str,
    pub message: String,
}

impl AuthError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AuthError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub role: Role,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: u64,
}

/// HS256 signing material plus the session lifetime, loaded once at startup.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenKeys {
    pub fn from_secret(secret: &str, ttl: Duration) -> Result<Self, AuthError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::new(
                ERR_INVALID_CONFIG,
                format!("jwt secret must be at least {} bytes", MIN_SECRET_LEN),
            ));
        }
        if ttl.is_zero() {
            return Err(AuthError::new(
                ERR_INVALID_CONFIG,
                "session ttl must be positive",
            ));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }

    pub fn issue(&self, user_id: i64, role: Role) -> Result<IssuedToken, AuthError> {
        self.issue_at(user_id, role, jsonwebtoken::get_current_timestamp())
    }

    pub fn issue_at(&self, user_id: i64, role: Role, now: u64) -> Result<IssuedToken, AuthError> {
        let claims = Claims {
            user_id,
            role,
            iat: now,
            exp: now.saturating_add(self.ttl.as_secs()),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| AuthError::new(ERR_INTERNAL, "failed to sign session token"))?;

        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::new(ERR_AUTH_EXPIRED, "token expired"),
                _ => AuthError::new(ERR_AUTH_INVALID, "invalid token"),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Cookie,
    Header,
}

impl CredentialSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialSource::Cookie => "cookie",
            CredentialSource::Header => "header",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub source: CredentialSource,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Picks the session credential, preferring the cookie over `Authorization`.
pub fn extract_credential(headers: &HeaderMap, cookie_name: &str) -> Option<Credential> {
    if let Some(token) = cookie::cookie_value(headers, cookie_name) {
        return Some(Credential {
            token,
            source: CredentialSource::Cookie,
        });
    }

    bearer_token(headers).map(|token| Credential {
        token,
        source: CredentialSource::Header,
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let authz = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())?;

    let (scheme, token) = authz.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}
