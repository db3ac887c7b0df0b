use crate::app::auth::AuthUser;
use crate::app::error::{ApiJson, ApiPath, ApiQuery};
use crate::app::handlers::page;
use crate::app::pagination::{Page, PageParams};
use crate::app::AppState;
use crate::core::kyc::{self, ReviewRequest, SubmitDocumentRequest};
use crate::domain::model::{DocumentStatus, KycDocument};
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
        .route("/kyc/documents", get(list).post(submit))
        .route("/kyc/documents/:id/review", post(review))
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentFilter {
    pub status: Option<DocumentStatus>,
}

async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(params): ApiQuery<PageParams>,
    ApiQuery(filter): ApiQuery<DocumentFilter>,
) -> Result<Json<Page<KycDocument>>> {
    let items = state
        .read(|db| kyc::list_documents(db, user.id, filter.status))
        .await?;
    page(items, &params, &uri)
}

async fn submit(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<SubmitDocumentRequest>,
) -> Result<(StatusCode, Json<KycDocument>)> {
    let document = state
        .mutate(|db| kyc::submit_document(db, user.id, request, Utc::now()))
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn review(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<ReviewRequest>,
) -> Result<Json<KycDocument>> {
    let document = state
        .mutate(|db| kyc::review_document(db, user.id, id, request, Utc::now()))
        .await?;
    tracing::info!("✅ KYC document {} reviewed: {:?}", id, document.status);
    Ok(Json(document))
}
