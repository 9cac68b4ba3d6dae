#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use tempfile::TempDir;
use tower::ServiceExt;
use workshop_auth::TokenKeys;
use workshop_auth::password::hash_password;
use workshop_contracts::{Principal, Role};
use workshop_gateway::config::GatewayConfig;
use workshop_gateway::http::{AppState, Stores, app};
use workshop_store::{
    Client, Jewelry, MemoryRecordStore, MemoryUserStore, NewUser, Order, Repair, RepairInput,
    RepairStatus, Smartwatch, UserStore,
};

pub const SECRET: &str = "integration-test-secret-0123456789";
pub const PASSWORD: &str = "correct horse battery";

pub struct Harness {
    pub app: Router,
    pub users: MemoryUserStore,
    pub clients: MemoryRecordStore<Client>,
    pub repairs: MemoryRecordStore<Repair>,
    pub keys: TokenKeys,
    pub media_dir: TempDir,
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body should be JSON")
    }

    pub fn set_cookie(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn clears_cookie(&self) -> bool {
        self.set_cookie()
            .is_some_and(|c| c.starts_with("token=;") && c.contains("Max-Age=0"))
    }
}

pub fn test_env(media_dir: &TempDir, extra: &[(&str, &str)]) -> HashMap<String, String> {
    let mut env = HashMap::from([
        (
            "WORKSHOP_DB_URL".to_string(),
            "postgres://unused@localhost/unused".to_string(),
        ),
        ("WORKSHOP_JWT_SECRET".to_string(), SECRET.to_string()),
        (
            "WORKSHOP_MEDIA_DIR".to_string(),
            media_dir.path().display().to_string(),
        ),
    ]);
    for (k, v) in extra {
        env.insert(k.to_string(), v.to_string());
    }
    env
}

pub fn harness() -> Harness {
    harness_with(&[])
}

pub fn harness_with(extra: &[(&str, &str)]) -> Harness {
    let media_dir = tempfile::tempdir().expect("tempdir");
    let config = GatewayConfig::from_kv(&test_env(&media_dir, extra)).expect("config");

    let users = MemoryUserStore::new();
    let clients = MemoryRecordStore::<Client>::new();
    let repairs = MemoryRecordStore::<Repair>::new();
    let stores = Stores {
        clients: Arc::new(clients.clone()),
        repairs: Arc::new(repairs.clone()),
        smartwatches: Arc::new(MemoryRecordStore::<Smartwatch>::new()),
        jewelry: Arc::new(MemoryRecordStore::<Jewelry>::new()),
        orders: Arc::new(MemoryRecordStore::<Order>::new()),
    };

    let keys = TokenKeys::from_secret(SECRET, config.session_ttl()).expect("keys");
    let state = AppState::new(config, Arc::new(users.clone()), stores).expect("state");

    Harness {
        app: app(state),
        users,
        clients,
        repairs,
        keys,
        media_dir,
    }
}

impl Harness {
    pub async fn user(&self, username: &str, role: Role) -> Principal {
        let password_hash = hash_password(PASSWORD).expect("hash");
        self.users
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                password_hash,
                role,
            })
            .await
            .expect("create user")
    }

    pub fn token(&self, principal: &Principal) -> String {
        self.keys
            .issue(principal.id, principal.role)
            .expect("issue token")
            .token
    }

    pub fn expired_token(&self, principal: &Principal) -> String {
        let two_hours_ago = now_secs() - 2 * 60 * 60;
        self.keys
            .issue_at(principal.id, principal.role, two_hours_ago)
            .expect("issue token")
            .token
    }

    pub async fn seed_repairs(&self, n: usize) {
        use workshop_store::RecordStore;
        for i in 0..n {
            self.repairs
                .create(repair_input(i))
                .await
                .expect("seed repair");
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Reply {
        let response = self
            .app
            .clone()
            .oneshot(req)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body")
            .to_vec();
        Reply {
            status,
            headers,
            body,
        }
    }

    pub async fn get_as(&self, uri: &str, token: &str) -> Reply {
        self.send(
            Request::builder()
                .uri(uri)
                .header(header::COOKIE, format!("token={}", token))
                .body(Body::empty())
                .expect("request"),
        )
        .await
    }

    pub async fn send_json_as(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        body: serde_json::Value,
    ) -> Reply {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
    }
}

pub fn repair_input(n: usize) -> RepairInput {
    RepairInput {
        client_name: format!("client {n}"),
        kind: "phone".to_string(),
        brand: "Acme".to_string(),
        model: format!("M{n}"),
        issue_description: "cracked screen".to_string(),
        repair_cost: 20.0 + n as f64,
        status: RepairStatus::Accepted,
        photo: None,
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
