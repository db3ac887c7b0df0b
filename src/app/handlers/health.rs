use crate::app::AppState;
use crate::utils::monitor::SystemStats;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub database: &'static str,
    pub cache: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemStats>,
}

pub fn report(state: &AppState, system: Option<SystemStats>) -> HealthReport {
    let database = match state.store.last_persist_error() {
        Some(e) if state.store.persistence_enabled() => {
            tracing::warn!("❌ Last snapshot write failed: {}", e);
            "error"
        }
        _ => "connected",
    };
    let cache = if !state.cache.is_enabled() {
        "disabled"
    } else if state.cache.ping() {
        "connected"
    } else {
        "error"
    };
    HealthReport {
        status: if database == "error" { "unhealthy" } else { "healthy" },
        timestamp: Utc::now(),
        database,
        cache,
        system,
    }
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let monitor = state.monitor.clone();
    let system = if monitor.is_enabled() {
        tokio::task::spawn_blocking(move || monitor.get_stats())
            .await
            .ok()
            .flatten()
    } else {
        None
    };
    let report = report(&state, system);
    let status = if report.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::auth::TokenService;
    use crate::core::Store;
    use std::sync::Arc;

    fn state() -> AppState {
        AppState::new(
            Arc::new(Store::in_memory()),
            TokenService::new("health-test-secret-0123456789abcdef", 60, 7),
        )
    }

    #[tokio::test]
    async fn test_health_without_monitor_has_no_system_block() {
        let (status, Json(report)) = health(State(state())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.cache, "disabled");
        assert!(report.system.is_none());
    }

    #[cfg(feature = "cli")]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_monitor_stats_are_collected_off_the_runtime() {
        use crate::utils::monitor::SystemMonitor;

        let state = state().with_monitor(SystemMonitor::new(true));
        let (status, Json(report)) = health(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        let system = report.system.expect("monitor enabled");
        assert!(system.memory_usage_mb > 0);
    }
}
