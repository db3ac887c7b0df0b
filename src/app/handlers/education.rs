use crate::app::auth::AuthUser;
use crate::app::error::{ApiPath, ApiQuery};
use crate::app::AppState;
use crate::core::education::{self, Lesson, Progress};
use crate::utils::error::Result;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/education/lessons", get(list))
        .route("/education/lessons/:slug", get(detail))
        .route("/education/lessons/:slug/complete", post(complete))
        .route("/education/progress", get(progress))
}

#[derive(Debug, Default, Deserialize)]
pub struct LessonFilter {
    pub category: Option<String>,
}

async fn list(_user: AuthUser, ApiQuery(filter): ApiQuery<LessonFilter>) -> Json<Vec<&'static Lesson>> {
    Json(education::list_lessons(filter.category.as_deref()))
}

async fn detail(_user: AuthUser, ApiPath(slug): ApiPath<String>) -> Result<Json<&'static Lesson>> {
    Ok(Json(education::get_lesson(&slug)?))
}

async fn complete(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<Progress>> {
    let progress = state
        .mutate(|db| education::complete_lesson(db, user.id, &slug, Utc::now()))
        .await?;
    Ok(Json(progress))
}

async fn progress(State(state): State<AppState>, user: AuthUser) -> Json<Progress> {
    Json(state.read(|db| education::progress(db, user.id)).await)
}
