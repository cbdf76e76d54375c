#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use fida_core::keys::KeyVault;
use fida_core::LedgerEngine;
use fida_server::{app, AppState, Metrics};
use fida_spec::Config;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub const BOOTSTRAP_TOKEN: &str = "test-bootstrap-token";
pub const MASTER_KEY_B64: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

pub struct TestServer {
    pub router: Router,
    pub _dir: tempfile::TempDir,
}

fn test_config(checkpoint_batch: u64, max_body_bytes: usize) -> Config {
    Config {
        database_path: String::new(),
        redis_url: None,
        master_key_b64: MASTER_KEY_B64.to_string(),
        bootstrap_token: BOOTSTRAP_TOKEN.to_string(),
        rate_limit_burst: 40,
        checkpoint_batch,
        max_body_bytes,
        allowed_origins: Vec::new(),
    }
}

impl TestServer {
    pub fn new(checkpoint_batch: u64) -> Self {
        Self::with_body_cap(checkpoint_batch, 200_000)
    }

    pub fn with_rate_limit(checkpoint_batch: u64, rate_limit_burst: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = fida_store::Store::open(dir.path().join("ledger.redb")).unwrap();
        let vault = KeyVault::new(MASTER_KEY_B64).unwrap();
        let engine = LedgerEngine::new(store, vault, checkpoint_batch);
        let mut config = test_config(checkpoint_batch, 200_000);
        config.rate_limit_burst = rate_limit_burst;
        let state = AppState::new(engine, config, Metrics::new());
        Self {
            router: app(state),
            _dir: dir,
        }
    }

    pub fn with_body_cap(checkpoint_batch: u64, max_body_bytes: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = fida_store::Store::open(dir.path().join("ledger.redb")).unwrap();
        let vault = KeyVault::new(MASTER_KEY_B64).unwrap();
        let engine = LedgerEngine::new(store, vault, checkpoint_batch);
        let config = test_config(checkpoint_batch, max_body_bytes);
        let state = AppState::new(engine, config, Metrics::new());
        Self {
            router: app(state),
            _dir: dir,
        }
    }

    pub async fn send(
        &self,
        method: &str,
        path: &str,
        api_key: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.send_with_headers(method, path, api_key, &[], body).await
    }

    pub async fn send_with_headers(
        &self,
        method: &str,
        path: &str,
        api_key: Option<&str>,
        extra_headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Send a raw body that may not even be valid JSON, for body-cap tests
    /// that only care about size, not content.
    pub async fn send_raw_body(
        &self,
        method: &str,
        path: &str,
        api_key: Option<&str>,
        raw_body: Vec<u8>,
    ) -> StatusCode {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        let request = builder.body(Body::from(raw_body)).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        response.status()
    }

    /// Run the one-shot bootstrap with the real `x-bootstrap-token` and
    /// return the minted platform admin api key.
    pub async fn bootstrap(&self) -> String {
        let (status, body) = self
            .send_with_headers(
                "POST",
                "/admin/bootstrap",
                None,
                &[("x-bootstrap-token", BOOTSTRAP_TOKEN)],
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "bootstrap failed: {body:?}");
        body["api_key"].as_str().unwrap().to_string()
    }

    pub async fn create_tenant(&self, admin_key: &str, tenant_id: &str) {
        let (status, body) = self
            .send(
                "POST",
                "/admin/tenants",
                Some(admin_key),
                Some(serde_json::json!({ "tenant_id": tenant_id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create_tenant failed: {body:?}");
    }

    pub async fn issue_api_key(&self, admin_key: &str, role: &str, tenant_id: Option<&str>) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/admin/apikeys/issue",
                Some(admin_key),
                Some(serde_json::json!({ "role": role, "tenant_id": tenant_id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "issue_api_key failed: {body:?}");
        body["api_key"].as_str().unwrap().to_string()
    }

    /// Convenience: bootstrap, create a tenant, and mint one key per role
    /// for it. Returns `(admin_key, issuer_key, verifier_key, exporter_key)`.
    pub async fn setup_tenant(&self, tenant_id: &str) -> (String, String, String, String) {
        let admin_key = self.bootstrap().await;
        self.create_tenant(&admin_key, tenant_id).await;
        let issuer_key = self.issue_api_key(&admin_key, "issuer", Some(tenant_id)).await;
        let verifier_key = self.issue_api_key(&admin_key, "verifier", Some(tenant_id)).await;
        let exporter_key = self.issue_api_key(&admin_key, "exporter", Some(tenant_id)).await;
        (admin_key, issuer_key, verifier_key, exporter_key)
    }

    pub async fn issue_event(&self, issuer_key: &str, tenant_id: &str, payload: Value) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/issue",
            Some(issuer_key),
            Some(serde_json::json!({
                "tenant_id": tenant_id,
                "payload": payload,
                "profile_id": "HUMAN-MSP-01",
                "event_type": "CHANGE",
                "actor_role": "agent",
                "object_ref": "",
            })),
        )
        .await
    }

    pub async fn issue_event_with_idempotency_key(
        &self,
        issuer_key: &str,
        tenant_id: &str,
        payload: Value,
        idem_key: &str,
    ) -> (StatusCode, Value) {
        self.send_with_headers(
            "POST",
            "/issue",
            Some(issuer_key),
            &[("idempotency-key", idem_key)],
            Some(serde_json::json!({
                "tenant_id": tenant_id,
                "payload": payload,
                "profile_id": "HUMAN-MSP-01",
                "event_type": "CHANGE",
                "actor_role": "agent",
                "object_ref": "",
            })),
        )
        .await
    }
}
