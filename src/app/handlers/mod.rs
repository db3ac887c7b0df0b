// One module per app; each exposes `routes()` with paths relative to the app prefix.

pub mod accounts;
pub mod analytics;
pub mod assistant;
pub mod audit;
pub mod automation;
pub mod credit;
pub mod education;
pub mod finance;
pub mod gamification;
pub mod gateway;
pub mod governance;
pub mod groups;
pub mod health;
pub mod investments;
pub mod kyc;
pub mod mpesa;
pub mod reports;
pub mod sync;
pub mod token;
pub mod wealth;

use crate::app::pagination::{paginate, Page, PageParams};
use crate::utils::error::{ChamaError, Result};
use axum::http::Uri;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

/// `?group=<uuid>` 篩選
#[derive(Debug, Default, Deserialize)]
pub struct GroupFilter {
    pub group: Option<Uuid>,
}

impl GroupFilter {
    pub fn required(&self) -> Result<Uuid> {
        self.group
            .ok_or_else(|| ChamaError::validation("group", "This query parameter is required"))
    }
}

/// 以請求路徑產生 next/previous 連結
pub fn page<T>(items: Vec<T>, params: &PageParams, uri: &Uri) -> Result<Json<Page<T>>> {
    Ok(Json(paginate(items, params, uri.path())?))
}
