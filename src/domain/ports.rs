use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait Storage: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;
    async fn exists(&self, path: &str) -> Result<bool>;
}

pub trait ConfigProvider: Send + Sync {
    fn bind_addr(&self) -> &str;
    fn data_dir(&self) -> &str;
    fn jwt_secret(&self) -> &str;
    fn access_token_ttl_minutes(&self) -> i64;
    fn refresh_token_ttl_days(&self) -> i64;
    fn admin_usernames(&self) -> &[String];
}

/// STK push 請求內容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkPushRequest {
    pub phone_number: String,
    /// 整數先令 (M-Pesa 不接受小數)
    pub amount_shillings: i64,
    pub account_reference: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkPushAccepted {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub customer_message: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn stk_push(&self, request: &StkPushRequest) -> Result<StkPushAccepted>;
}
