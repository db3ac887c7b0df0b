use crate::app::auth::AuthUser;
use crate::app::error::ApiQuery;
use crate::app::AppState;
use crate::core::sync::{self, ChangeSet, ChangesQuery};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

pub fn routes() -> Router<AppState> {
    Router::new().route("/mobile-sync/changes", get(changes))
}

async fn changes(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<ChangesQuery>,
) -> Json<ChangeSet> {
    Json(
        state
            .read(|db| sync::changes(db, user.id, &query, Utc::now()))
            .await,
    )
}
