use crate::app::auth::AuthUser;
use crate::app::error::{ApiJson, ApiPath, ApiQuery};
use crate::app::handlers::page;
use crate::app::pagination::{Page, PageParams};
use crate::app::AppState;
use crate::core::groups::{self, AppointOfficialRequest, CreateGroupRequest, GroupView, MemberView, UpdateGroupRequest};
use crate::domain::model::{Membership, Official};
use crate::utils::error::Result;
use axum::extract::{OriginalUri, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/groups/groups", get(list).post(create))
        .route("/groups/groups/:id", get(detail).patch(update))
        .route("/groups/groups/:id/deactivate", post(deactivate))
        .route("/groups/groups/:id/join", post(join))
        .route("/groups/groups/:id/leave", post(leave))
        .route("/groups/groups/:id/members", get(members))
        .route(
            "/groups/groups/:id/members/:membership_id/approve",
            post(approve_member),
        )
        .route(
            "/groups/groups/:id/members/:membership_id/suspend",
            post(suspend_member),
        )
        .route("/groups/groups/:id/officials", get(officials).post(appoint))
        .route(
            "/groups/groups/:id/officials/:official_id",
            delete(remove_official),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct GroupListFilter {
    #[serde(default)]
    pub mine: bool,
}

async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(params): ApiQuery<PageParams>,
    ApiQuery(filter): ApiQuery<GroupListFilter>,
) -> Result<Json<Page<GroupView>>> {
    let items = state
        .read(|db| groups::list_groups(db, user.id, filter.mine))
        .await;
    page(items, &params, &uri)
}

async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupView>)> {
    let view = state
        .mutate(|db| groups::create_group(db, user.id, request, Utc::now()))
        .await?;
    tracing::info!("✅ Group '{}' created by {}", view.group.name, user.username);
    Ok((StatusCode::CREATED, Json(view)))
}

async fn detail(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<GroupView>> {
    Ok(Json(state.read(|db| groups::get_group(db, id)).await?))
}

async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateGroupRequest>,
) -> Result<Json<GroupView>> {
    let view = state
        .mutate(|db| groups::update_group(db, user.id, id, request, Utc::now()))
        .await?;
    Ok(Json(view))
}

async fn deactivate(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<GroupView>> {
    let view = state
        .mutate(|db| groups::deactivate_group(db, user.id, id, Utc::now()))
        .await?;
    Ok(Json(view))
}

async fn join(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<(StatusCode, Json<Membership>)> {
    let membership = state
        .mutate(|db| groups::join_group(db, user.id, id, Utc::now()))
        .await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

async fn leave(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode> {
    state
        .mutate(|db| groups::leave_group(db, user.id, id, Utc::now()))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn members(
    State(state): State<AppState>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> Result<Json<Page<MemberView>>> {
    let items = state
        .read(|db| groups::list_members(db, user.id, id))
        .await?;
    page(items, &params, &uri)
}

async fn approve_member(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath((id, membership_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<Membership>> {
    let membership = state
        .mutate(|db| groups::approve_membership(db, user.id, id, membership_id, Utc::now()))
        .await?;
    Ok(Json(membership))
}

async fn suspend_member(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath((id, membership_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<Membership>> {
    let membership = state
        .mutate(|db| groups::suspend_membership(db, user.id, id, membership_id, Utc::now()))
        .await?;
    Ok(Json(membership))
}

async fn officials(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<Official>>> {
    Ok(Json(state.read(|db| groups::list_officials(db, id)).await?))
}

async fn appoint(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<AppointOfficialRequest>,
) -> Result<(StatusCode, Json<Official>)> {
    let official = state
        .mutate(|db| groups::appoint_official(db, user.id, id, request, Utc::now()))
        .await?;
    Ok((StatusCode::CREATED, Json(official)))
}

async fn remove_official(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath((id, official_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    state
        .mutate(|db| groups::remove_official(db, user.id, id, official_id, Utc::now()))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
