#![allow(dead_code)]

use anyhow::Result;
use chamahub::app::auth::TokenService;
use chamahub::config::toml_config::{MpesaConfig, ServerConfig};
use chamahub::{build_app, serve, AppState, DarajaClient, ResponseCache, Store};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const PASSWORD: &str = "correct-horse-battery";

pub struct TestServer {
    pub base: String,
    pub client: Client,
    _shutdown: oneshot::Sender<()>,
}

/// 在 127.0.0.1:0 啟動完整的 app，資料只在記憶體中
pub async fn spawn() -> Result<TestServer> {
    spawn_with(None).await
}

pub async fn spawn_with_mpesa(base_url: &str) -> Result<TestServer> {
    spawn_with(Some(MpesaConfig {
        base_url: base_url.to_string(),
        consumer_key: "key".to_string(),
        consumer_secret: "secret".to_string(),
        shortcode: "174379".to_string(),
        passkey: "passkey".to_string(),
        callback_url: "https://example.test/api/v1/mpesa/callback".to_string(),
        timeout_seconds: Some(5),
    }))
    .await
}

async fn spawn_with(mpesa: Option<MpesaConfig>) -> Result<TestServer> {
    let mut state = AppState::new(
        Arc::new(Store::in_memory()),
        TokenService::new(SECRET, 60, 7),
    )
    .with_admins(vec!["admin".to_string()])
    .with_cache(ResponseCache::new(true, 1_000, Duration::from_secs(60)));
    if let Some(config) = mpesa {
        state = state.with_gateway(Arc::new(DarajaClient::new(config)?));
    }

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = build_app(state, &ServerConfig::default());
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = serve(listener, app, async {
            let _ = rx.await;
        })
        .await;
    });

    Ok(TestServer {
        base: format!("http://{}", addr),
        client: Client::new(),
        _shutdown: tx,
    })
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn get(&self, path: &str, token: &str) -> Result<Response> {
        Ok(self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await?)
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> Result<Response> {
        Ok(self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?)
    }

    pub async fn register(&self, username: &str, phone: &str) -> Result<Value> {
        let response = self
            .client
            .post(self.url("/api/v1/accounts/register"))
            .json(&json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "phone_number": phone,
                "password": PASSWORD,
            }))
            .send()
            .await?;
        anyhow::ensure!(response.status() == 201, "register failed: {}", response.status());
        Ok(response.json().await?)
    }

    pub async fn login(&self, username: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url("/api/v1/token"))
            .json(&json!({ "username": username, "password": PASSWORD }))
            .send()
            .await?;
        anyhow::ensure!(response.status() == 200, "login failed: {}", response.status());
        let body: Value = response.json().await?;
        Ok(body["access"].as_str().unwrap_or_default().to_string())
    }

    /// 註冊並登入，回傳 (user id, access token)
    pub async fn user(&self, username: &str, phone: &str) -> Result<(String, String)> {
        let profile = self.register(username, phone).await?;
        let token = self.login(username).await?;
        Ok((profile["id"].as_str().unwrap_or_default().to_string(), token))
    }
}
