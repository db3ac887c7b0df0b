use crate::app::auth::AuthUser;
use crate::app::error::{ApiJson, ApiPath, ApiQuery};
use crate::app::handlers::{page, GroupFilter};
use crate::app::pagination::{Page, PageParams};
use crate::app::AppState;
use crate::core::automation::{self, CreateRuleRequest, RunReport, ToggleRuleRequest};
use crate::domain::model::{AutomationRule, Notification};
use crate::utils::error::Result;
use axum::extract::{OriginalUri, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/automation/rules", get(list_rules).post(create_rule))
        .route("/automation/rules/:id/toggle", post(toggle_rule))
        .route("/automation/groups/:id/run", post(run))
        .route("/automation/notifications", get(notifications))
        .route("/automation/notifications/:id/read", post(mark_read))
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationFilter {
    #[serde(default)]
    pub unread: bool,
}

async fn list_rules(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(filter): ApiQuery<GroupFilter>,
) -> Result<Json<Vec<AutomationRule>>> {
    let group_id = filter.required()?;
    let rules = state
        .read(|db| automation::list_rules(db, user.id, group_id))
        .await?;
    Ok(Json(rules))
}

async fn create_rule(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<CreateRuleRequest>,
) -> Result<(StatusCode, Json<AutomationRule>)> {
    let rule = state
        .mutate(|db| automation::create_rule(db, user.id, request, Utc::now()))
        .await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn toggle_rule(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<ToggleRuleRequest>,
) -> Result<Json<AutomationRule>> {
    let rule = state
        .mutate(|db| automation::toggle_rule(db, user.id, id, request, Utc::now()))
        .await?;
    Ok(Json(rule))
}

async fn run(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<RunReport>> {
    let report = state
        .mutate(|db| automation::run_rules(db, user.id, id, Utc::now()))
        .await?;
    tracing::info!("🚀 Automation run for group {}: {:?}", id, report);
    Ok(Json(report))
}

async fn notifications(
    State(state): State<AppState>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(params): ApiQuery<PageParams>,
    ApiQuery(filter): ApiQuery<NotificationFilter>,
) -> Result<Json<Page<Notification>>> {
    let items = state
        .read(|db| automation::notifications(db, user.id, filter.unread))
        .await;
    page(items, &params, &uri)
}

async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Notification>> {
    let notification = state
        .mutate(|db| automation::mark_read(db, user.id, id))
        .await?;
    Ok(Json(notification))
}
