use crate::config::toml_config::MpesaConfig;
use crate::domain::ports::{PaymentGateway, StkPushAccepted, StkPushRequest};
use crate::utils::error::{ChamaError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Daraja 時間戳使用東非時間 (UTC+3)
const EAT_OFFSET_SECONDS: i64 = 3 * 3600;

#[derive(Debug, Deserialize)]
struct OAuthResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    transaction_type: &'static str,
    amount: i64,
    #[serde(rename = "PartyA")]
    party_a: &'a str,
    #[serde(rename = "PartyB")]
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    account_reference: &'a str,
    transaction_desc: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    response_code: String,
    response_description: String,
    #[serde(default)]
    customer_message: String,
}

#[derive(Debug, Deserialize)]
struct DarajaError {
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Safaricom Daraja STK push 客戶端
pub struct DarajaClient {
    config: MpesaConfig,
    client: Client,
    token: Mutex<Option<CachedToken>>,
}

impl DarajaClient {
    pub fn new(config: MpesaConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds.unwrap_or(30));
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            config,
            client,
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// 產生 Daraja 要求的時間戳與密碼
    pub fn password_for(shortcode: &str, passkey: &str, now: DateTime<Utc>) -> (String, String) {
        let local = now + chrono::Duration::seconds(EAT_OFFSET_SECONDS);
        let timestamp = local.format("%Y%m%d%H%M%S").to_string();
        let password = base64::engine::general_purpose::STANDARD
            .encode(format!("{}{}{}", shortcode, passkey, timestamp));
        (timestamp, password)
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!("Requesting Daraja OAuth token");
        let response = self
            .client
            .get(self.endpoint("/oauth/v1/generate"))
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChamaError::PaymentGatewayError {
                message: format!("OAuth request failed with status {}", response.status()),
            });
        }

        let body: OAuthResponse = response.json().await?;
        let ttl = body
            .expires_in
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(3599);
        // 提前一分鐘過期，避免邊界情況
        let expires_at = Instant::now() + Duration::from_secs(ttl.saturating_sub(60));
        *cached = Some(CachedToken {
            value: body.access_token.clone(),
            expires_at,
        });
        Ok(body.access_token)
    }
}

#[async_trait]
impl PaymentGateway for DarajaClient {
    async fn stk_push(&self, request: &StkPushRequest) -> Result<StkPushAccepted> {
        let token = self.access_token().await?;
        let (timestamp, password) =
            Self::password_for(&self.config.shortcode, &self.config.passkey, Utc::now());

        let body = StkPushBody {
            business_short_code: &self.config.shortcode,
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline",
            amount: request.amount_shillings,
            party_a: &request.phone_number,
            party_b: &self.config.shortcode,
            phone_number: &request.phone_number,
            callback_url: &self.config.callback_url,
            account_reference: &request.account_reference,
            transaction_desc: &request.description,
        };

        tracing::debug!(
            "Sending STK push of KES {} to {}",
            request.amount_shillings,
            request.phone_number
        );
        let response = self
            .client
            .post(self.endpoint("/mpesa/stkpush/v1/processrequest"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<DarajaError>()
                .await
                .ok()
                .and_then(|e| e.error_message)
                .unwrap_or_else(|| format!("STK push failed with status {}", status));
            return Err(ChamaError::PaymentGatewayError { message });
        }

        let accepted: StkPushResponse = response.json().await?;
        if accepted.response_code != "0" {
            return Err(ChamaError::PaymentGatewayError {
                message: accepted.response_description,
            });
        }

        Ok(StkPushAccepted {
            merchant_request_id: accepted.merchant_request_id,
            checkout_request_id: accepted.checkout_request_id,
            customer_message: accepted.customer_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use httpmock::prelude::*;

    fn config_for(server: &MockServer) -> MpesaConfig {
        MpesaConfig {
            base_url: server.base_url(),
            consumer_key: "key".to_string(),
            consumer_secret: "secret".to_string(),
            shortcode: "174379".to_string(),
            passkey: "passkey".to_string(),
            callback_url: "https://example.com/mpesa/callback".to_string(),
            timeout_seconds: Some(5),
        }
    }

    fn push_request() -> StkPushRequest {
        StkPushRequest {
            phone_number: "254712345678".to_string(),
            amount_shillings: 500,
            account_reference: "CHAMA".to_string(),
            description: "Wallet top up".to_string(),
        }
    }

    #[test]
    fn test_password_uses_east_africa_time() {
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 22, 15, 0).unwrap();
        let (timestamp, password) = DarajaClient::password_for("174379", "pk", now);
        assert_eq!(timestamp, "20240201011500");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(password)
            .unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "174379pk20240201011500");
    }

    #[tokio::test]
    async fn test_stk_push_success() {
        let server = MockServer::start();
        let oauth_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/oauth/v1/generate")
                .query_param("grant_type", "client_credentials");
            then.status(200).json_body(serde_json::json!({
                "access_token": "token-123",
                "expires_in": "3599"
            }));
        });
        let push_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/mpesa/stkpush/v1/processrequest")
                .json_body_partial(r#"{"Amount": 500, "PartyA": "254712345678", "TransactionType": "CustomerPayBillOnline"}"#);
            then.status(200).json_body(serde_json::json!({
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResponseCode": "0",
                "ResponseDescription": "Success. Request accepted for processing",
                "CustomerMessage": "Success. Request accepted for processing"
            }));
        });

        let client = DarajaClient::new(config_for(&server)).unwrap();
        let accepted = client.stk_push(&push_request()).await.unwrap();

        oauth_mock.assert();
        push_mock.assert();
        assert_eq!(accepted.checkout_request_id, "ws_CO_191220191020363925");
    }

    #[tokio::test]
    async fn test_oauth_token_is_reused() {
        let server = MockServer::start();
        let oauth_mock = server.mock(|when, then| {
            when.method(GET).path("/oauth/v1/generate");
            then.status(200).json_body(serde_json::json!({
                "access_token": "token-123",
                "expires_in": "3599"
            }));
        });
        server.mock(|when, then| {
            when.method(POST).path("/mpesa/stkpush/v1/processrequest");
            then.status(200).json_body(serde_json::json!({
                "MerchantRequestID": "m",
                "CheckoutRequestID": "c",
                "ResponseCode": "0",
                "ResponseDescription": "ok"
            }));
        });

        let client = DarajaClient::new(config_for(&server)).unwrap();
        client.stk_push(&push_request()).await.unwrap();
        client.stk_push(&push_request()).await.unwrap();

        oauth_mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_stk_push_rejected_by_gateway() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/oauth/v1/generate");
            then.status(200).json_body(serde_json::json!({"access_token": "t"}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/mpesa/stkpush/v1/processrequest");
            then.status(400).json_body(serde_json::json!({
                "requestId": "1",
                "errorCode": "400.002.02",
                "errorMessage": "Bad Request - Invalid PhoneNumber"
            }));
        });

        let client = DarajaClient::new(config_for(&server)).unwrap();
        let err = client.stk_push(&push_request()).await.unwrap_err();
        match err {
            ChamaError::PaymentGatewayError { message } => {
                assert_eq!(message, "Bad Request - Invalid PhoneNumber")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oauth_failure_is_gateway_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/oauth/v1/generate");
            then.status(401);
        });

        let client = DarajaClient::new(config_for(&server)).unwrap();
        let err = client.stk_push(&push_request()).await.unwrap_err();
        assert!(matches!(err, ChamaError::PaymentGatewayError { .. }));
    }
}
