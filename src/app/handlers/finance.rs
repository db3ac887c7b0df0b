use crate::app::auth::AuthUser;
use crate::app::error::{ApiJson, ApiPath, ApiQuery};
use crate::app::handlers::accounts::AmountRequest;
use crate::app::handlers::{page, GroupFilter};
use crate::app::pagination::{Page, PageParams};
use crate::app::AppState;
use crate::core::access;
use crate::core::finance::{
    self, DecisionRequest, GroupSummary, Installment, LoanApplication, RecordContributionRequest,
};
use crate::domain::model::{Contribution, Decision, Loan, LoanStatus};
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
        .route("/finance/contributions", get(list_contributions).post(record_contribution))
        .route("/finance/contributions/:id/confirm", post(confirm_contribution))
        .route("/finance/contributions/:id/reject", post(reject_contribution))
        .route("/finance/loans", get(list_loans).post(apply_for_loan))
        .route("/finance/loans/:id", get(get_loan))
        .route("/finance/loans/:id/approve", post(approve_loan))
        .route("/finance/loans/:id/reject", post(reject_loan))
        .route("/finance/loans/:id/disburse", post(disburse_loan))
        .route("/finance/loans/:id/repay", post(repay_loan))
        .route("/finance/loans/:id/schedule", get(loan_schedule))
        .route("/finance/groups/:id/summary", get(group_summary))
}

#[derive(Debug, Default, Deserialize)]
pub struct LoanFilter {
    pub group: Option<Uuid>,
    pub status: Option<LoanStatus>,
}

async fn list_contributions(
    State(state): State<AppState>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(params): ApiQuery<PageParams>,
    ApiQuery(filter): ApiQuery<GroupFilter>,
) -> Result<Json<Page<Contribution>>> {
    let items = state
        .read(|db| finance::list_contributions(db, user.id, filter.group))
        .await?;
    page(items, &params, &uri)
}

async fn record_contribution(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<RecordContributionRequest>,
) -> Result<(StatusCode, Json<Contribution>)> {
    let contribution = state
        .mutate(|db| finance::record_contribution(db, user.id, request, Utc::now()))
        .await?;
    Ok((StatusCode::CREATED, Json(contribution)))
}

async fn confirm_contribution(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Contribution>> {
    let contribution = state
        .mutate(|db| finance::confirm_contribution(db, user.id, id, Utc::now()))
        .await?;
    Ok(Json(contribution))
}

async fn reject_contribution(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Contribution>> {
    let contribution = state
        .mutate(|db| finance::reject_contribution(db, user.id, id, Utc::now()))
        .await?;
    Ok(Json(contribution))
}

async fn list_loans(
    State(state): State<AppState>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(params): ApiQuery<PageParams>,
    ApiQuery(filter): ApiQuery<LoanFilter>,
) -> Result<Json<Page<Loan>>> {
    let items = state
        .read(|db| finance::list_loans(db, user.id, filter.group, filter.status))
        .await?;
    page(items, &params, &uri)
}

async fn apply_for_loan(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(application): ApiJson<LoanApplication>,
) -> Result<(StatusCode, Json<Loan>)> {
    let loan = state
        .mutate(|db| finance::apply_for_loan(db, user.id, application, Utc::now()))
        .await?;
    tracing::info!("📊 Loan {} requested by {}", loan.id, user.username);
    Ok((StatusCode::CREATED, Json(loan)))
}

async fn get_loan(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Loan>> {
    Ok(Json(state.read(|db| finance::get_loan(db, user.id, id)).await?))
}

async fn decide(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    decision: Decision,
    body: Option<ApiJson<DecisionRequest>>,
) -> Result<Json<Loan>> {
    let request = body.map(|ApiJson(r)| r).unwrap_or_default();
    let loan = state
        .mutate(|db| finance::decide_loan(db, user.id, id, decision, request, Utc::now()))
        .await?;
    Ok(Json(loan))
}

async fn approve_loan(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    body: Option<ApiJson<DecisionRequest>>,
) -> Result<Json<Loan>> {
    decide(&state, &user, id, Decision::Approve, body).await
}

async fn reject_loan(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    body: Option<ApiJson<DecisionRequest>>,
) -> Result<Json<Loan>> {
    decide(&state, &user, id, Decision::Reject, body).await
}

async fn disburse_loan(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Loan>> {
    let loan = state
        .mutate(|db| finance::disburse_loan(db, user.id, id, Utc::now()))
        .await?;
    tracing::info!("✅ Loan {} disbursed ({} cents)", loan.id, loan.principal);
    Ok(Json(loan))
}

async fn repay_loan(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<AmountRequest>,
) -> Result<Json<Loan>> {
    let loan = state
        .mutate(|db| finance::repay_loan(db, user.id, id, request.amount, Utc::now()))
        .await?;
    Ok(Json(loan))
}

async fn loan_schedule(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<Installment>>> {
    let loan = state.read(|db| finance::get_loan(db, user.id, id)).await?;
    Ok(Json(finance::loan_schedule(&loan)))
}

async fn group_summary(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<GroupSummary>> {
    let summary = state
        .read(|db| {
            access::require_active_member(db, id, user.id)?;
            finance::group_summary(db, id)
        })
        .await?;
    Ok(Json(summary))
}
