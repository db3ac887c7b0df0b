use crate::app::auth::AuthUser;
use crate::app::error::{ApiPath, ApiQuery};
use crate::app::AppState;
use crate::core::wealth;
use crate::utils::error::Result;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/wealth-engine/groups/:id/portfolio", get(portfolio))
        .route("/wealth-engine/groups/:id/projection", get(projection))
}

#[derive(Debug, Deserialize)]
pub struct ProjectionQuery {
    #[serde(default = "default_months")]
    pub months: u32,
}

fn default_months() -> u32 {
    12
}

async fn portfolio(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>> {
    let value = state
        .cached(format!("portfolio:{}:{}", id, user.id), |db| {
            wealth::portfolio(db, user.id, id)
        })
        .await?;
    Ok(Json(value))
}

async fn projection(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ProjectionQuery>,
) -> Result<Json<wealth::Projection>> {
    let projection = state
        .read(|db| wealth::projection(db, user.id, id, query.months))
        .await?;
    Ok(Json(projection))
}
