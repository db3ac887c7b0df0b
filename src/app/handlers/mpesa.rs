use crate::app::auth::AuthUser;
use crate::app::error::{ApiJson, ApiQuery};
use crate::app::handlers::page;
use crate::app::pagination::{Page, PageParams};
use crate::app::AppState;
use crate::core::payments::{self, CallbackAck, CallbackEnvelope, StkPushInput};
use crate::domain::model::MpesaTransaction;
use crate::utils::error::Result;
use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/mpesa/stk-push", post(stk_push))
        .route("/mpesa/callback", post(callback))
        .route("/mpesa/transactions", get(transactions))
}

/// 先在讀鎖下驗證，呼叫 Daraja 時不持有任何鎖，成功後才記錄
async fn stk_push(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(input): ApiJson<StkPushInput>,
) -> Result<(StatusCode, Json<MpesaTransaction>)> {
    let gateway = state.gateway()?;
    let request = state
        .read(|db| payments::prepare_stk_push(db, user.id, &input))
        .await?;

    tracing::info!(
        "🚀 STK push for {} ({} KES, {:?})",
        user.username,
        request.amount_shillings,
        input.purpose
    );
    let accepted = gateway.stk_push(&request).await?;

    let transaction = state
        .mutate(|db| {
            payments::record_stk_push(db, user.id, &input, &request, accepted, Utc::now())
        })
        .await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// Daraja 回呼不帶 token；無論結果都回覆 Accepted，避免重送
async fn callback(State(state): State<AppState>, body: Bytes) -> Json<CallbackAck> {
    let envelope: CallbackEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("❌ Unreadable M-Pesa callback: {}", e);
            return Json(CallbackAck::accepted());
        }
    };
    let callback = envelope.body.stk_callback;

    match state
        .mutate(|db| payments::handle_callback(db, &callback, Utc::now()))
        .await
    {
        Ok(Some(transaction)) => tracing::info!(
            "✅ M-Pesa callback {} settled as {:?}",
            callback.checkout_request_id,
            transaction.status
        ),
        Ok(None) => tracing::debug!(
            "Callback {} left the ledger unchanged",
            callback.checkout_request_id
        ),
        Err(e) => tracing::error!(
            "❌ Failed to apply callback {}: {}",
            callback.checkout_request_id,
            e
        ),
    }
    Json(CallbackAck::accepted())
}

async fn transactions(
    State(state): State<AppState>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(params): ApiQuery<PageParams>,
) -> Result<Json<Page<MpesaTransaction>>> {
    let items = state
        .read(|db| payments::list_transactions(db, user.id))
        .await;
    page(items, &params, &uri)
}
