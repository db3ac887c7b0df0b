use crate::app::auth::AuthUser;
use crate::app::error::ApiQuery;
use crate::app::handlers::page;
use crate::app::pagination::{Page, PageParams};
use crate::app::AppState;
use crate::core::audit::{self, AuditFilter};
use crate::domain::model::AuditEntry;
use crate::utils::error::Result;
use axum::extract::{OriginalUri, State};
use axum::routing::get;
use axum::{Json, Router};

pub fn routes() -> Router<AppState> {
    Router::new().route("/audit/logs", get(logs))
}

async fn logs(
    State(state): State<AppState>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(params): ApiQuery<PageParams>,
    ApiQuery(filter): ApiQuery<AuditFilter>,
) -> Result<Json<Page<AuditEntry>>> {
    let items = state
        .read(|db| audit::visible_logs(db, user.id, &filter))
        .await;
    page(items, &params, &uri)
}
