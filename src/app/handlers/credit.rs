use crate::app::auth::AuthUser;
use crate::app::error::ApiPath;
use crate::app::AppState;
use crate::core::credit;
use crate::utils::error::Result;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/credit-scoring/score", get(my_score))
        .route("/credit-scoring/users/:id/score", get(user_score))
}

async fn my_score(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>> {
    let value = state
        .cached(format!("credit:{}:{}", user.id, user.id), |db| {
            credit::credit_score(db, user.id)
        })
        .await?;
    Ok(Json(value))
}

async fn user_score(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>> {
    let value = state
        .cached(format!("credit:{}:{}", id, user.id), |db| {
            credit::user_score(db, user.id, id)
        })
        .await?;
    Ok(Json(value))
}
