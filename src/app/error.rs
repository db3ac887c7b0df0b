use crate::utils::error::{ChamaError, ErrorCategory};
use axum::async_trait;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

pub fn status_for(error: &ChamaError) -> StatusCode {
    match error {
        ChamaError::ValidationError { .. } => StatusCode::BAD_REQUEST,
        ChamaError::Unauthorized { .. } | ChamaError::TokenError(_) => StatusCode::UNAUTHORIZED,
        ChamaError::Forbidden { .. } => StatusCode::FORBIDDEN,
        ChamaError::NotFound { .. } => StatusCode::NOT_FOUND,
        ChamaError::Conflict { .. } | ChamaError::InvalidState { .. } => StatusCode::CONFLICT,
        ChamaError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ChamaError::PaymentGatewayError { .. } | ChamaError::ApiError(_) => StatusCode::BAD_GATEWAY,
        ChamaError::GatewayNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ChamaError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::error!(
                "❌ Request failed: {} (Category: {:?}, Severity: {:?})",
                self,
                self.category(),
                self.severity()
            );
        }
        let (detail, field) = match &self {
            ChamaError::ValidationError { field, message } => (message.clone(), Some(field.clone())),
            ChamaError::TokenError(_) => ("Given token not valid for any token type".to_string(), None),
            other if other.category() == ErrorCategory::Client => (other.to_string(), None),
            other => (other.user_friendly_message(), None),
        };
        let body = ErrorBody {
            detail,
            code: self.code(),
            field,
        };
        (status, Json(body)).into_response()
    }
}

/// `Json` 的包裝，解析失敗時回傳統一的 400 錯誤格式
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ChamaError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

/// 超過 body 上限維持 413，其餘都是 400
fn json_rejection(rejection: JsonRejection) -> ChamaError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ChamaError::PayloadTooLarge {
            message: rejection.body_text(),
        };
    }
    ChamaError::validation("body", rejection.body_text())
}

/// `Query` 的包裝，同樣回傳統一格式
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ChamaError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

fn query_rejection(rejection: QueryRejection) -> ChamaError {
    ChamaError::validation("query", rejection.body_text())
}

/// 路徑參數 (通常是 UUID) 解析失敗同樣回傳 400
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ChamaError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(ApiPath(value)),
            Err(rejection) => Err(path_rejection(rejection)),
        }
    }
}

fn path_rejection(rejection: PathRejection) -> ChamaError {
    ChamaError::validation("path", rejection.body_text())
}
