use crate::app::auth::AuthUser;
use crate::app::error::ApiPath;
use crate::app::AppState;
use crate::core::reports;
use crate::utils::error::Result;
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new().route("/reports/groups/:id/statement", get(statement))
}

async fn statement(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Response> {
    let statement = state
        .read(|db| reports::group_statement(db, user.id, id, Utc::now()))
        .await?;
    tracing::info!(
        "📁 Statement {} generated ({} bytes)",
        statement.file_name,
        statement.bytes.len()
    );
    let disposition = format!("attachment; filename=\"{}\"", statement.file_name);
    Ok((
        [
            (CONTENT_TYPE, "application/zip".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        statement.bytes,
    )
        .into_response())
}
