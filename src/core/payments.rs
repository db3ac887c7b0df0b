//! M-Pesa STK push bookkeeping and callback settlement.

use crate::core::access;
use crate::core::accounts;
use crate::core::audit::{self, AuditEvent};
use crate::core::finance;
use crate::domain::model::{
    Amount, Database, MpesaPurpose, MpesaStatus, MpesaTransaction, PaymentMethod,
    WalletTransactionKind,
};
use crate::domain::ports::{StkPushAccepted, StkPushRequest};
use crate::utils::error::{ChamaError, Result};
use crate::utils::validation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 使用者取消付款時 Daraja 回傳的代碼
pub const RESULT_CANCELLED_BY_USER: i64 = 1032;

#[derive(Debug, Clone, Deserialize)]
pub struct StkPushInput {
    pub amount: Amount,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub purpose: MpesaPurpose,
    #[serde(default)]
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub result_code: i64,
    #[serde(default)]
    pub result_desc: String,
    #[serde(default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

impl StkCallback {
    pub fn receipt(&self) -> Option<String> {
        self.callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|i| i.name == "MpesaReceiptNumber")
            .and_then(|i| match &i.value {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
    }
}

/// Daraja 固定要求的回覆內容
#[derive(Debug, Clone, Serialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: &'static str,
}

impl CallbackAck {
    pub fn accepted() -> Self {
        Self {
            result_code: 0,
            result_desc: "Accepted",
        }
    }
}

/// 檢查請求並組出送往閘道的 STK push 內容 (不修改資料)
pub fn prepare_stk_push(db: &Database, actor: Uuid, input: &StkPushInput) -> Result<StkPushRequest> {
    validation::validate_amount("amount", input.amount)?;
    if input.amount % 100 != 0 {
        return Err(ChamaError::validation(
            "amount",
            "M-Pesa payments must be whole shillings",
        ));
    }
    let user = access::user(db, actor)?;
    let phone_number = match &input.phone_number {
        Some(raw) => validation::normalize_phone_number(raw)?,
        None => user.phone_number.clone(),
    };

    let account_reference = match (input.purpose, input.group_id) {
        (MpesaPurpose::Contribution, Some(group_id)) => {
            let group = access::active_group(db, group_id)?;
            let name = group.name.clone();
            access::require_active_member(db, group_id, actor)?;
            name.chars().filter(|c| c.is_ascii_alphanumeric()).take(12).collect()
        }
        (MpesaPurpose::Contribution, None) => {
            return Err(ChamaError::validation(
                "group_id",
                "A group is required for contributions",
            ))
        }
        (MpesaPurpose::WalletTopup, _) => "WALLET".to_string(),
    };

    Ok(StkPushRequest {
        phone_number,
        amount_shillings: input.amount / 100,
        account_reference,
        description: match input.purpose {
            MpesaPurpose::WalletTopup => "Wallet top up".to_string(),
            MpesaPurpose::Contribution => "Chama contribution".to_string(),
        },
    })
}

/// 閘道接受後記錄待處理交易
pub fn record_stk_push(
    db: &mut Database,
    actor: Uuid,
    input: &StkPushInput,
    request: &StkPushRequest,
    accepted: StkPushAccepted,
    now: DateTime<Utc>,
) -> Result<MpesaTransaction> {
    let transaction = MpesaTransaction {
        id: Uuid::new_v4(),
        user_id: actor,
        group_id: match input.purpose {
            MpesaPurpose::Contribution => input.group_id,
            MpesaPurpose::WalletTopup => None,
        },
        purpose: input.purpose,
        phone_number: request.phone_number.clone(),
        amount: input.amount,
        account_reference: request.account_reference.clone(),
        merchant_request_id: accepted.merchant_request_id,
        checkout_request_id: accepted.checkout_request_id,
        status: MpesaStatus::Pending,
        result_code: None,
        result_desc: accepted.customer_message,
        mpesa_receipt: None,
        created_at: now,
        completed_at: None,
    };
    db.mpesa_transactions.insert(transaction.id, transaction.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "stk_push",
            entity: "mpesa_transaction",
            entity_id: transaction.id,
            group_id: transaction.group_id,
            detail: format!("amount={} purpose={:?}", transaction.amount, transaction.purpose),
        },
        now,
    );
    Ok(transaction)
}

/// 處理 Daraja 回呼；重複或未知的回呼不做任何變更，回傳 None
pub fn handle_callback(
    db: &mut Database,
    callback: &StkCallback,
    now: DateTime<Utc>,
) -> Result<Option<MpesaTransaction>> {
    let Some(mut transaction) = db
        .mpesa_transactions
        .values()
        .find(|t| t.checkout_request_id == callback.checkout_request_id)
        .cloned()
    else {
        tracing::warn!(
            "💡 Callback for unknown checkout request {}",
            callback.checkout_request_id
        );
        return Ok(None);
    };
    if transaction.status != MpesaStatus::Pending {
        tracing::debug!(
            "Duplicate callback for {} ignored",
            transaction.checkout_request_id
        );
        return Ok(None);
    }

    transaction.result_code = Some(callback.result_code);
    transaction.result_desc = callback.result_desc.clone();
    transaction.completed_at = Some(now);
    transaction.status = match callback.result_code {
        0 => MpesaStatus::Completed,
        RESULT_CANCELLED_BY_USER => MpesaStatus::Cancelled,
        _ => MpesaStatus::Failed,
    };

    if transaction.status == MpesaStatus::Completed {
        let receipt = callback
            .receipt()
            .unwrap_or_else(|| transaction.checkout_request_id.clone());
        transaction.mpesa_receipt = Some(receipt.clone());
        accounts::post_wallet(
            db,
            transaction.user_id,
            WalletTransactionKind::Deposit,
            transaction.amount,
            &receipt,
            now,
        )?;

        if let (MpesaPurpose::Contribution, Some(group_id)) = (transaction.purpose, transaction.group_id) {
            if access::is_active_member(db, group_id, transaction.user_id) {
                let contribution = finance::contribute_from_wallet(
                    db,
                    transaction.user_id,
                    group_id,
                    transaction.amount,
                    PaymentMethod::Mpesa,
                    receipt,
                    now,
                )?;
                audit::record(
                    db,
                    AuditEvent {
                        actor: Some(transaction.user_id),
                        action: "create",
                        entity: "contribution",
                        entity_id: contribution.id,
                        group_id: Some(group_id),
                        detail: format!("amount={} method=Mpesa", contribution.amount),
                    },
                    now,
                );
            } else {
                tracing::warn!(
                    "💡 M-Pesa contribution {} kept in wallet: member no longer active",
                    transaction.id
                );
            }
        }
    }

    db.mpesa_transactions.insert(transaction.id, transaction.clone());
    audit::record(
        db,
        AuditEvent {
            actor: None,
            action: "callback",
            entity: "mpesa_transaction",
            entity_id: transaction.id,
            group_id: transaction.group_id,
            detail: format!("result_code={} status={:?}", callback.result_code, transaction.status),
        },
        now,
    );
    Ok(Some(transaction))
}

pub fn list_transactions(db: &Database, user_id: Uuid) -> Vec<MpesaTransaction> {
    let mut items: Vec<MpesaTransaction> = db
        .mpesa_transactions
        .values()
        .filter(|t| t.user_id == user_id)
        .cloned()
        .collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items
}
