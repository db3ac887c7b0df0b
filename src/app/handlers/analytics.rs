use crate::app::auth::AuthUser;
use crate::app::error::ApiPath;
use crate::app::AppState;
use crate::core::analytics;
use crate::utils::error::Result;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new().route("/analytics/groups/:id", get(group_analytics))
}

async fn group_analytics(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>> {
    let value = state
        .cached(format!("analytics:{}:{}", id, user.id), |db| {
            analytics::group_analytics(db, user.id, id, Utc::now())
        })
        .await?;
    Ok(Json(value))
}
