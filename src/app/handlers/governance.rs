use crate::app::auth::AuthUser;
use crate::app::error::{ApiJson, ApiPath, ApiQuery};
use crate::app::handlers::page;
use crate::app::pagination::{Page, PageParams};
use crate::app::AppState;
use crate::core::governance::{self, CastVoteRequest, CreateProposalRequest, ProposalResults};
use crate::domain::model::{Proposal, ProposalStatus, Vote};
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
        .route("/governance/proposals", get(list).post(create))
        .route("/governance/proposals/:id", get(results))
        .route("/governance/proposals/:id/vote", post(vote))
        .route("/governance/proposals/:id/close", post(close))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProposalFilter {
    pub group: Option<Uuid>,
    pub status: Option<ProposalStatus>,
}

async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(params): ApiQuery<PageParams>,
    ApiQuery(filter): ApiQuery<ProposalFilter>,
) -> Result<Json<Page<Proposal>>> {
    let items = state
        .read(|db| governance::list_proposals(db, user.id, filter.group, filter.status))
        .await?;
    page(items, &params, &uri)
}

async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<CreateProposalRequest>,
) -> Result<(StatusCode, Json<Proposal>)> {
    let proposal = state
        .mutate(|db| governance::create_proposal(db, user.id, request, Utc::now()))
        .await?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

async fn results(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ProposalResults>> {
    Ok(Json(state.read(|db| governance::results(db, user.id, id)).await?))
}

async fn vote(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<CastVoteRequest>,
) -> Result<(StatusCode, Json<Vote>)> {
    let vote = state
        .mutate(|db| governance::cast_vote(db, user.id, id, request, Utc::now()))
        .await?;
    Ok((StatusCode::CREATED, Json(vote)))
}

async fn close(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ProposalResults>> {
    let results = state
        .mutate(|db| governance::close_proposal(db, user.id, id, Utc::now()))
        .await?;
    tracing::info!(
        "📊 Proposal {} closed: {:?}",
        results.proposal.id,
        results.proposal.status
    );
    Ok(Json(results))
}
