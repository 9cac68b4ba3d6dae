use std::time::Duration;

use http::header;
use http::{HeaderMap, HeaderValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attributes of the session cookie. Production deployments get
/// `Secure; SameSite=None`, everything else `SameSite=Lax`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub secure: bool,
    pub same_site: SameSite,
    pub max_age: Duration,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, production: bool, max_age: Duration) -> Self {
        Self {
            name: name.into(),
            secure: production,
            same_site: if production { SameSite::None } else { SameSite::Lax },
            max_age,
        }
    }

    pub fn set(&self, token: &str) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.render(token, self.max_age.as_secs(), false)).ok()
    }

    pub fn clear(&self) -> HeaderValue {
        HeaderValue::from_str(&self.render("", 0, true))
            .unwrap_or_else(|_| HeaderValue::from_static("token=; Path=/; Max-Age=0"))
    }

    fn render(&self, value: &str, max_age: u64, expired: bool) -> String {
        let mut out = format!(
            "{}={}; Path=/; HttpOnly; Max-Age={}; SameSite={}",
            self.name,
            value,
            max_age,
            self.same_site.as_str()
        );
        if expired {
            out.push_str("; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        out
    }
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_cookie_is_lax_and_not_secure() {
        let cookie = SessionCookie::new("token", false, Duration::from_secs(3600));
        let value = cookie.set("abc").expect("header value");
        assert_eq!(
            value.to_str().expect("ascii"),
            "token=abc; Path=/; HttpOnly; Max-Age=3600; SameSite=Lax"
        );
    }

    #[test]
    fn production_clear_cookie_is_secure_and_expired() {
        let cookie = SessionCookie::new("token", true, Duration::from_secs(3600));
        let value = cookie.clear();
        let value = value.to_str().expect("ascii");
        assert!(value.starts_with("token=; Path=/; HttpOnly; Max-Age=0; SameSite=None"));
        assert!(value.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
        assert!(value.ends_with("; Secure"));
    }

    #[test]
    fn cookie_value_scans_every_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("b=2; token=xyz"));
        assert_eq!(cookie_value(&headers, "token").as_deref(), Some("xyz"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }
}
