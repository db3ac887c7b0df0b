use crate::app::auth::AuthUser;
use crate::app::error::ApiPath;
use crate::app::AppState;
use crate::core::gamification::{self, GameProfile};
use crate::utils::error::Result;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/gamification/profile", get(profile))
        .route("/gamification/groups/:id/leaderboard", get(leaderboard))
}

async fn profile(State(state): State<AppState>, user: AuthUser) -> Result<Json<GameProfile>> {
    Ok(Json(
        state.read(|db| gamification::profile(db, user.id)).await?,
    ))
}

async fn leaderboard(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>> {
    let value = state
        .cached(format!("leaderboard:{}:{}", id, user.id), |db| {
            gamification::group_leaderboard(db, user.id, id)
        })
        .await?;
    Ok(Json(value))
}
