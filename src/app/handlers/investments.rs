use crate::app::auth::AuthUser;
use crate::app::error::{ApiJson, ApiPath, ApiQuery};
use crate::app::handlers::{page, GroupFilter};
use crate::app::pagination::{Page, PageParams};
use crate::app::AppState;
use crate::core::investments::{self, CreateInvestmentRequest, InvestmentView, ValuationRequest};
use crate::utils::error::Result;
use axum::extract::{OriginalUri, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/investments/investments", get(list).post(create))
        .route("/investments/investments/:id", get(detail))
        .route("/investments/investments/:id/valuation", post(valuation))
        .route("/investments/investments/:id/liquidate", post(liquidate))
}

async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(params): ApiQuery<PageParams>,
    ApiQuery(filter): ApiQuery<GroupFilter>,
) -> Result<Json<Page<InvestmentView>>> {
    let group_id = filter.required()?;
    let items = state
        .read(|db| investments::list_investments(db, user.id, group_id))
        .await?;
    page(items, &params, &uri)
}

async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<CreateInvestmentRequest>,
) -> Result<(StatusCode, Json<InvestmentView>)> {
    let view = state
        .mutate(|db| investments::create_investment(db, user.id, request, Utc::now()))
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn detail(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<InvestmentView>> {
    Ok(Json(
        state.read(|db| investments::get_investment(db, user.id, id)).await?,
    ))
}

async fn valuation(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<ValuationRequest>,
) -> Result<Json<InvestmentView>> {
    let view = state
        .mutate(|db| investments::update_valuation(db, user.id, id, request, Utc::now()))
        .await?;
    Ok(Json(view))
}

async fn liquidate(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<InvestmentView>> {
    let view = state
        .mutate(|db| investments::liquidate_investment(db, user.id, id, Utc::now()))
        .await?;
    tracing::info!("📊 Investment {} liquidated", id);
    Ok(Json(view))
}
