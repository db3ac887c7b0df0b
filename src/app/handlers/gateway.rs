use crate::app::auth::AuthUser;
use crate::app::routes::APPS;
use crate::app::{AppState, API_PREFIX};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api-gateway/routes", get(catalog))
        .route("/api-gateway/version", get(version))
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteEntry {
    pub app: &'static str,
    pub versioned: String,
    pub legacy: String,
    pub resources: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub api_version: &'static str,
}

pub fn route_catalog() -> Vec<RouteEntry> {
    APPS.iter()
        .map(|app| RouteEntry {
            app: app.name,
            versioned: format!("{}/{}", API_PREFIX, app.name),
            legacy: format!("/{}", app.name),
            resources: app.resources.to_vec(),
        })
        .collect()
}

async fn catalog(_user: AuthUser) -> Json<Vec<RouteEntry>> {
    Json(route_catalog())
}

async fn version(_user: AuthUser) -> Json<VersionInfo> {
    Json(VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        api_version: "v1",
    })
}
