// HTTP layer: shared state, the route table and the axum handlers.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod pagination;
pub mod routes;

use crate::adapters::{DarajaClient, ResponseCache};
use crate::config::toml_config::{ServerConfig, TomlConfig};
use crate::core::Store;
use crate::domain::model::Database;
use crate::domain::ports::{ConfigProvider, PaymentGateway};
use crate::utils::error::{ChamaError, Result};
use crate::utils::monitor::SystemMonitor;
use auth::TokenService;
use axum::extract::Request;
use axum::http::{HeaderValue, Method};
use axum::{Router, ServiceExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;

pub const API_PREFIX: &str = "/api/v1";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub cache: Arc<ResponseCache>,
    pub gateway: Option<Arc<dyn PaymentGateway>>,
    pub tokens: Arc<TokenService>,
    pub admin_usernames: Arc<Vec<String>>,
    pub monitor: Arc<SystemMonitor>,
}

impl AppState {
    pub fn new(store: Arc<Store>, tokens: TokenService) -> Self {
        Self {
            store,
            cache: Arc::new(ResponseCache::disabled()),
            gateway: None,
            tokens: Arc::new(tokens),
            admin_usernames: Arc::new(Vec::new()),
            monitor: Arc::new(SystemMonitor::new(false)),
        }
    }

    /// 依設定組出完整狀態 (快取、M-Pesa 閘道、監控)
    pub fn from_config(config: &TomlConfig, store: Arc<Store>, monitor: SystemMonitor) -> Result<Self> {
        let tokens = TokenService::new(
            config.jwt_secret(),
            config.access_token_ttl_minutes(),
            config.refresh_token_ttl_days(),
        );
        let gateway: Option<Arc<dyn PaymentGateway>> = match &config.mpesa {
            Some(mpesa) => Some(Arc::new(DarajaClient::new(mpesa.clone())?)),
            None => {
                tracing::warn!("💡 No [mpesa] section configured, STK push is disabled");
                None
            }
        };
        Ok(Self::new(store, tokens)
            .with_cache(ResponseCache::new(
                config.cache.enabled,
                config.cache.max_entries,
                Duration::from_secs(config.cache.ttl_seconds),
            ))
            .with_admins(config.admin_usernames().to_vec())
            .with_monitor(monitor)
            .with_optional_gateway(gateway))
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    pub fn with_gateway(self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.with_optional_gateway(Some(gateway))
    }

    fn with_optional_gateway(mut self, gateway: Option<Arc<dyn PaymentGateway>>) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_admins(mut self, admin_usernames: Vec<String>) -> Self {
        self.admin_usernames = Arc::new(admin_usernames);
        self
    }

    pub fn with_monitor(mut self, monitor: SystemMonitor) -> Self {
        self.monitor = Arc::new(monitor);
        self
    }

    pub fn gateway(&self) -> Result<Arc<dyn PaymentGateway>> {
        self.gateway.clone().ok_or(ChamaError::GatewayNotConfigured)
    }

    /// 寫入成功後清空讀取模型快取
    pub async fn mutate<T>(&self, f: impl FnOnce(&mut Database) -> Result<T>) -> Result<T> {
        let out = self.store.mutate(f).await?;
        self.cache.invalidate_all();
        Ok(out)
    }

    pub async fn read<T>(&self, f: impl FnOnce(&Database) -> T) -> T {
        self.store.read(f).await
    }

    /// 以 key 快取計算結果；權限檢查應包含在 `f` 中，key 需含檢視者
    pub async fn cached<T: Serialize>(
        &self,
        key: String,
        f: impl FnOnce(&Database) -> Result<T>,
    ) -> Result<Value> {
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!("Cache hit: {}", key);
            return Ok(hit);
        }
        let value = serde_json::to_value(self.store.read(f).await?)?;
        self.cache.insert(key, value.clone());
        Ok(value)
    }
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let allow_origin = if server.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

/// 同一組路由同時掛在 `/api/v1` 與根路徑
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    let apps = routes::app_routes();
    Router::new()
        .nest(API_PREFIX, apps.clone())
        .merge(apps)
        .merge(routes::root_routes())
        .layer(RequestBodyLimitLayer::new(server.max_body_bytes))
        .layer(cors_layer(server))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 路由前先去掉結尾斜線，`/groups/` 與 `/groups` 相同
pub fn build_app(state: AppState, server: &ServerConfig) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(build_router(state, server))
}

pub async fn serve(
    listener: TcpListener,
    app: NormalizePath<Router>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
