use crate::app::auth::{AccessToken, TokenPair, TokenType};
use crate::app::error::ApiJson;
use crate::app::AppState;
use crate::core::accounts;
use crate::utils::error::{ChamaError, Result};
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ObtainRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

pub async fn obtain(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ObtainRequest>,
) -> Result<Json<TokenPair>> {
    let (id, username) = state
        .read(|db| {
            accounts::authenticate(db, &request.username, &request.password)
                .map(|u| (u.id, u.username.clone()))
        })
        .await?;
    tracing::info!("✅ Issued tokens for {}", username);
    Ok(Json(state.tokens.issue_pair(id, &username)?))
}

/// refresh token 換新的 access token；帳號停用後不再發放
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<Json<AccessToken>> {
    let claims = state.tokens.verify(&request.refresh, TokenType::Refresh)?;
    let active = state
        .read(|db| db.users.get(&claims.sub).map(|u| u.is_active).unwrap_or(false))
        .await;
    if !active {
        return Err(ChamaError::unauthorized("User not found or inactive"));
    }
    Ok(Json(AccessToken {
        access: state
            .tokens
            .issue(claims.sub, &claims.username, TokenType::Access)?,
    }))
}
