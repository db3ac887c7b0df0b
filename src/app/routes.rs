use crate::app::handlers;
use crate::app::{AppState, API_PREFIX};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;

pub struct AppInfo {
    pub name: &'static str,
    pub resources: &'static [&'static str],
}

/// 所有 app 與其資源；每個 app 同時提供 `/api/v1/<app>` 與 `/<app>`
pub static APPS: &[AppInfo] = &[
    AppInfo { name: "accounts", resources: &["register", "me", "wallet", "users"] },
    AppInfo { name: "groups", resources: &["groups"] },
    AppInfo { name: "finance", resources: &["contributions", "loans", "groups"] },
    AppInfo { name: "governance", resources: &["proposals"] },
    AppInfo { name: "investments", resources: &["investments"] },
    AppInfo { name: "mpesa", resources: &["stk-push", "callback", "transactions"] },
    AppInfo { name: "wealth-engine", resources: &["groups"] },
    AppInfo { name: "credit-scoring", resources: &["score", "users"] },
    AppInfo { name: "analytics", resources: &["groups"] },
    AppInfo { name: "reports", resources: &["groups"] },
    AppInfo { name: "audit", resources: &["logs"] },
    AppInfo { name: "kyc", resources: &["documents"] },
    AppInfo { name: "ai-assistant", resources: &["ask"] },
    AppInfo { name: "automation", resources: &["rules", "groups", "notifications"] },
    AppInfo { name: "mobile-sync", resources: &["changes"] },
    AppInfo { name: "api-gateway", resources: &["routes", "version"] },
    AppInfo { name: "gamification", resources: &["profile", "groups"] },
    AppInfo { name: "education", resources: &["lessons", "progress"] },
];

#[derive(Debug, Clone, Serialize)]
pub struct AppIndex {
    pub app: &'static str,
    pub version: &'static str,
    pub resources: BTreeMap<&'static str, String>,
}

pub fn app_index(app: &AppInfo) -> AppIndex {
    AppIndex {
        app: app.name,
        version: "v1",
        resources: app
            .resources
            .iter()
            .map(|r| (*r, format!("{}/{}/{}", API_PREFIX, app.name, r)))
            .collect(),
    }
}

/// 掛在兩個前綴下的 app 路由
pub fn app_routes() -> Router<AppState> {
    let mut router = Router::new().route("/health", get(handlers::health::health));
    for app in APPS {
        router = router.route(
            &format!("/{}", app.name),
            get(move || async move { Json(app_index(app)) }),
        );
    }
    router
        .merge(handlers::accounts::routes())
        .merge(handlers::groups::routes())
        .merge(handlers::finance::routes())
        .merge(handlers::governance::routes())
        .merge(handlers::investments::routes())
        .merge(handlers::mpesa::routes())
        .merge(handlers::wealth::routes())
        .merge(handlers::credit::routes())
        .merge(handlers::analytics::routes())
        .merge(handlers::reports::routes())
        .merge(handlers::audit::routes())
        .merge(handlers::kyc::routes())
        .merge(handlers::assistant::routes())
        .merge(handlers::automation::routes())
        .merge(handlers::sync::routes())
        .merge(handlers::gateway::routes())
        .merge(handlers::gamification::routes())
        .merge(handlers::education::routes())
}

/// 只存在於固定路徑的 token 端點
pub fn root_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/token", post(handlers::token::obtain))
        .route("/api/v1/token/refresh", post(handlers::token::refresh))
        .route("/api/token", post(handlers::token::obtain))
        .route("/api/token/refresh", post(handlers::token::refresh))
}
