use crate::app::auth::AuthUser;
use crate::app::error::ApiJson;
use crate::app::AppState;
use crate::core::assistant::{self, Answer, AskRequest};
use crate::utils::error::Result;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

pub fn routes() -> Router<AppState> {
    Router::new().route("/ai-assistant/ask", post(ask))
}

async fn ask(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<AskRequest>,
) -> Result<Json<Answer>> {
    let answer = state
        .read(|db| assistant::ask(db, user.id, &request))
        .await?;
    tracing::debug!("Assistant intent for {}: {:?}", user.username, answer.intent);
    Ok(Json(answer))
}
