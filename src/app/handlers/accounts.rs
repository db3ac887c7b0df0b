use crate::app::auth::AuthUser;
use crate::app::error::{ApiJson, ApiQuery};
use crate::app::handlers::page;
use crate::app::pagination::{Page, PageParams};
use crate::app::AppState;
use crate::core::{access, accounts};
use crate::domain::model::{Amount, MemberWallet, UserProfile, WalletTransaction};
use crate::utils::error::Result;
use axum::extract::{OriginalUri, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/accounts/register", post(register))
        .route("/accounts/me", get(me).patch(update_me))
        .route("/accounts/me/password", post(change_password))
        .route("/accounts/wallet", get(wallet))
        .route("/accounts/wallet/transactions", get(wallet_transactions))
        .route("/accounts/wallet/withdraw", post(withdraw))
        .route("/accounts/users", get(list_users))
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Amount,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchFilter {
    pub search: Option<String>,
}

async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<accounts::RegisterRequest>,
) -> Result<(StatusCode, Json<UserProfile>)> {
    let admins = state.admin_usernames.clone();
    let profile = state
        .mutate(|db| accounts::register(db, request, &admins, Utc::now()))
        .await?;
    tracing::info!("✅ Registered user {}", profile.username);
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<UserProfile>> {
    let profile = state
        .read(|db| access::user(db, user.id).map(UserProfile::from))
        .await?;
    Ok(Json(profile))
}

async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<accounts::UpdateProfileRequest>,
) -> Result<Json<UserProfile>> {
    let profile = state
        .mutate(|db| accounts::update_profile(db, user.id, request, Utc::now()))
        .await?;
    Ok(Json(profile))
}

async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<accounts::ChangePasswordRequest>,
) -> Result<Json<Value>> {
    state
        .mutate(|db| accounts::change_password(db, user.id, request, Utc::now()))
        .await?;
    Ok(Json(json!({ "detail": "Password updated" })))
}

async fn wallet(State(state): State<AppState>, user: AuthUser) -> Result<Json<MemberWallet>> {
    let wallet = state
        .read(|db| accounts::wallet(db, user.id).cloned())
        .await?;
    Ok(Json(wallet))
}

async fn wallet_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(params): ApiQuery<PageParams>,
) -> Result<Json<Page<WalletTransaction>>> {
    let items = state
        .read(|db| accounts::wallet_transactions(db, user.id))
        .await;
    page(items, &params, &uri)
}

async fn withdraw(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<AmountRequest>,
) -> Result<Json<MemberWallet>> {
    let wallet = state
        .mutate(|db| accounts::withdraw(db, user.id, request.amount, Utc::now()))
        .await?;
    Ok(Json(wallet))
}

async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(params): ApiQuery<PageParams>,
    ApiQuery(filter): ApiQuery<SearchFilter>,
) -> Result<Json<Page<UserProfile>>> {
    let users = state
        .read(|db| accounts::list_users(db, user.id, filter.search.as_deref()))
        .await?;
    page(users, &params, &uri)
}
