use crate::core::access;
use crate::core::audit::{self, AuditEvent};
use crate::core::finance;
use crate::domain::model::{Amount, Database, Investment, InvestmentStatus, InvestmentType};
use crate::utils::error::{ChamaError, Result};
use crate::utils::validation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvestmentRequest {
    pub group_id: Uuid,
    pub name: String,
    pub investment_type: InvestmentType,
    pub amount: Amount,
    #[serde(default)]
    pub expected_return_bps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValuationRequest {
    pub current_value: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvestmentView {
    #[serde(flatten)]
    pub investment: Investment,
    pub gain: Amount,
    pub roi_bps: i64,
}

/// 報酬率 (bps)，本金為零時回傳 0
pub fn roi_bps(invested: Amount, current: Amount) -> i64 {
    if invested == 0 {
        return 0;
    }
    ((current - invested) as i128 * 10_000 / invested as i128) as i64
}

fn view(investment: Investment) -> InvestmentView {
    InvestmentView {
        gain: investment.current_value - investment.amount_invested,
        roi_bps: roi_bps(investment.amount_invested, investment.current_value),
        investment,
    }
}

fn find_investment(db: &Database, investment_id: Uuid) -> Result<Investment> {
    db.investments
        .get(&investment_id)
        .cloned()
        .ok_or_else(|| ChamaError::not_found("Investment", investment_id))
}

pub fn create_investment(
    db: &mut Database,
    actor: Uuid,
    request: CreateInvestmentRequest,
    now: DateTime<Utc>,
) -> Result<InvestmentView> {
    access::active_group(db, request.group_id)?;
    access::require_official(db, request.group_id, actor)?;
    let name = request.name.trim().to_string();
    validation::validate_non_empty_string("name", &name)?;
    validation::validate_amount("amount", request.amount)?;
    validation::validate_range("expected_return_bps", request.expected_return_bps, 0, 10_000)?;
    let available = finance::available_balance(db, request.group_id)?;
    if request.amount > available {
        return Err(ChamaError::invalid_state(format!(
            "Insufficient group funds: available {}, required {}",
            available, request.amount
        )));
    }

    let investment = Investment {
        id: Uuid::new_v4(),
        group_id: request.group_id,
        name,
        investment_type: request.investment_type,
        amount_invested: request.amount,
        current_value: request.amount,
        expected_return_bps: request.expected_return_bps,
        status: InvestmentStatus::Active,
        created_by: actor,
        created_at: now,
        updated_at: now,
        liquidated_at: None,
    };
    db.investments.insert(investment.id, investment.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "create",
            entity: "investment",
            entity_id: investment.id,
            group_id: Some(investment.group_id),
            detail: format!("amount={} type={:?}", investment.amount_invested, investment.investment_type),
        },
        now,
    );
    Ok(view(investment))
}

pub fn list_investments(db: &Database, viewer: Uuid, group_id: Uuid) -> Result<Vec<InvestmentView>> {
    access::require_active_member(db, group_id, viewer)?;
    let mut items: Vec<InvestmentView> = db
        .investments
        .values()
        .filter(|i| i.group_id == group_id)
        .cloned()
        .map(view)
        .collect();
    items.sort_by(|a, b| b.investment.created_at.cmp(&a.investment.created_at));
    Ok(items)
}

pub fn get_investment(db: &Database, viewer: Uuid, investment_id: Uuid) -> Result<InvestmentView> {
    let investment = find_investment(db, investment_id)?;
    access::require_active_member(db, investment.group_id, viewer)?;
    Ok(view(investment))
}

pub fn update_valuation(
    db: &mut Database,
    actor: Uuid,
    investment_id: Uuid,
    request: ValuationRequest,
    now: DateTime<Utc>,
) -> Result<InvestmentView> {
    let mut investment = find_investment(db, investment_id)?;
    access::require_official(db, investment.group_id, actor)?;
    if investment.status != InvestmentStatus::Active {
        return Err(ChamaError::invalid_state(
            "Liquidated investments cannot be revalued",
        ));
    }
    if request.current_value < 0 {
        return Err(ChamaError::validation(
            "current_value",
            "Value cannot be negative",
        ));
    }
    validation::validate_range("current_value", request.current_value, 0, validation::MAX_AMOUNT)?;

    let previous = investment.current_value;
    investment.current_value = request.current_value;
    investment.updated_at = now;
    db.investments.insert(investment.id, investment.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "revalue",
            entity: "investment",
            entity_id: investment.id,
            group_id: Some(investment.group_id),
            detail: format!("from={} to={}", previous, investment.current_value),
        },
        now,
    );
    Ok(view(investment))
}

pub fn liquidate_investment(
    db: &mut Database,
    actor: Uuid,
    investment_id: Uuid,
    now: DateTime<Utc>,
) -> Result<InvestmentView> {
    let mut investment = find_investment(db, investment_id)?;
    access::require_official(db, investment.group_id, actor)?;
    if investment.status != InvestmentStatus::Active {
        return Err(ChamaError::invalid_state(
            "This investment is already liquidated",
        ));
    }

    investment.status = InvestmentStatus::Liquidated;
    investment.liquidated_at = Some(now);
    investment.updated_at = now;
    db.investments.insert(investment.id, investment.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "liquidate",
            entity: "investment",
            entity_id: investment.id,
            group_id: Some(investment.group_id),
            detail: format!("proceeds={}", investment.current_value),
        },
        now,
    );
    Ok(view(investment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::finance::tests::fixture;

    fn request(group_id: Uuid, amount: Amount) -> CreateInvestmentRequest {
        CreateInvestmentRequest {
            group_id,
            name: "T-Bill 91".to_string(),
            investment_type: InvestmentType::Bonds,
            amount,
            expected_return_bps: 1200,
        }
    }

    #[test]
    fn test_roi() {
        assert_eq!(roi_bps(100_000, 112_000), 1200);
        assert_eq!(roi_bps(100_000, 90_000), -1000);
        assert_eq!(roi_bps(0, 5), 0);
    }

    #[test]
    fn test_investment_lifecycle_moves_group_cash() {
        let mut f = fixture();
        assert!(create_investment(&mut f.db, f.member, request(f.group_id, 10_000), Utc::now()).is_err());

        let created =
            create_investment(&mut f.db, f.treasurer, request(f.group_id, 200_000), Utc::now()).unwrap();
        assert_eq!(finance::available_balance(&f.db, f.group_id).unwrap(), 100_000);

        let revalued = update_valuation(
            &mut f.db,
            f.chair,
            created.investment.id,
            ValuationRequest {
                current_value: 230_000,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(revalued.roi_bps, 1500);

        liquidate_investment(&mut f.db, f.chair, created.investment.id, Utc::now()).unwrap();
        assert_eq!(finance::available_balance(&f.db, f.group_id).unwrap(), 330_000);
        assert!(update_valuation(
            &mut f.db,
            f.chair,
            created.investment.id,
            ValuationRequest { current_value: 1 },
            Utc::now(),
        )
        .is_err());
    }

    #[test]
    fn test_cannot_invest_more_than_available() {
        let mut f = fixture();
        let err = create_investment(&mut f.db, f.chair, request(f.group_id, 300_001), Utc::now())
            .unwrap_err();
        assert!(matches!(err, ChamaError::InvalidState { .. }));
    }
}
