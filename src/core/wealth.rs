use crate::core::access;
use crate::core::finance;
use crate::domain::model::{Amount, Database, InvestmentStatus};
use crate::utils::error::Result;
use crate::utils::validation;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Portfolio {
    pub group_id: Uuid,
    pub cash: Amount,
    pub investments_value: Amount,
    pub total_value: Amount,
    /// 各類資產佔總值的比例 (bps)
    pub allocation_bps: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProjectionPoint {
    pub month: u32,
    pub cash: Amount,
    pub investments_value: Amount,
    pub total_value: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct Projection {
    pub group_id: Uuid,
    pub months: u32,
    pub monthly_contributions: Amount,
    pub points: Vec<ProjectionPoint>,
}

fn share_bps(part: Amount, total: Amount) -> i64 {
    if total <= 0 {
        0
    } else {
        (part as i128 * 10_000 / total as i128) as i64
    }
}

pub fn portfolio(db: &Database, viewer: Uuid, group_id: Uuid) -> Result<Portfolio> {
    access::require_active_member(db, group_id, viewer)?;
    let cash = finance::available_balance(db, group_id)?;

    let mut by_type: BTreeMap<String, Amount> = BTreeMap::new();
    for investment in db
        .investments
        .values()
        .filter(|i| i.group_id == group_id && i.status == InvestmentStatus::Active)
    {
        let value = by_type
            .entry(investment.investment_type.as_str().to_string())
            .or_default();
        *value = validation::checked_add("current_value", *value, investment.current_value)?;
    }
    let investments_value = validation::checked_sum("investments_value", by_type.values().copied())?;
    let total_value = validation::checked_add("total_value", cash.max(0), investments_value)?;

    let mut allocation_bps: BTreeMap<String, i64> = by_type
        .iter()
        .map(|(k, v)| (k.clone(), share_bps(*v, total_value)))
        .collect();
    allocation_bps.insert("cash".to_string(), share_bps(cash.max(0), total_value));

    Ok(Portfolio {
        group_id,
        cash,
        investments_value,
        total_value,
        allocation_bps,
    })
}

/// 投資以預期年報酬按月複利，現金每月加上預期繳款
pub fn projection(db: &Database, viewer: Uuid, group_id: Uuid, months: u32) -> Result<Projection> {
    validation::validate_range("months", months, 1, 120)?;
    access::require_active_member(db, group_id, viewer)?;
    let group = access::group(db, group_id)?;
    let members = access::active_member_ids(db, group_id).len() as f64;
    let monthly_contributions = (group.contribution_amount as f64
        * members
        * group.contribution_frequency.periods_per_month())
    .round() as Amount;

    let mut holdings: Vec<(f64, f64)> = db
        .investments
        .values()
        .filter(|i| i.group_id == group_id && i.status == InvestmentStatus::Active)
        .map(|i| (i.current_value as f64, i.expected_return_bps as f64 / 10_000.0 / 12.0))
        .collect();
    let mut cash = finance::available_balance(db, group_id)?.max(0);

    let mut points = Vec::with_capacity(months as usize);
    for month in 1..=months {
        for (value, rate) in holdings.iter_mut() {
            *value *= 1.0 + *rate;
        }
        cash = validation::checked_add("cash", cash, monthly_contributions)?;
        let investments_value = holdings.iter().map(|(v, _)| v).sum::<f64>().round() as Amount;
        points.push(ProjectionPoint {
            month,
            cash,
            investments_value,
            total_value: validation::checked_add("total_value", cash, investments_value)?,
        });
    }

    Ok(Projection {
        group_id,
        months,
        monthly_contributions,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::finance::tests::fixture;
    use crate::core::investments::{create_investment, CreateInvestmentRequest};
    use crate::domain::model::InvestmentType;
    use chrono::Utc;

    #[test]
    fn test_portfolio_allocation() {
        let mut f = fixture();
        create_investment(
            &mut f.db,
            f.chair,
            CreateInvestmentRequest {
                group_id: f.group_id,
                name: "MMF".to_string(),
                investment_type: InvestmentType::MoneyMarket,
                amount: 75_000,
                expected_return_bps: 1200,
            },
            Utc::now(),
        )
        .unwrap();

        let p = portfolio(&f.db, f.member, f.group_id).unwrap();
        assert_eq!(p.cash, 225_000);
        assert_eq!(p.total_value, 300_000);
        assert_eq!(p.allocation_bps["money_market"], 2_500);
        assert_eq!(p.allocation_bps["cash"], 7_500);
    }

    #[test]
    fn test_projection_compounds_monthly() {
        let mut f = fixture();
        create_investment(
            &mut f.db,
            f.chair,
            CreateInvestmentRequest {
                group_id: f.group_id,
                name: "Bond".to_string(),
                investment_type: InvestmentType::Bonds,
                amount: 120_000,
                expected_return_bps: 1200,
            },
            Utc::now(),
        )
        .unwrap();

        let proj = projection(&f.db, f.member, f.group_id, 2).unwrap();
        // 三位會員，每月 100,000
        assert_eq!(proj.monthly_contributions, 300_000);
        assert_eq!(proj.points[0].investments_value, 121_200);
        assert_eq!(proj.points[1].investments_value, 122_412);
        assert_eq!(proj.points[1].cash, 180_000 + 600_000);
        assert!(projection(&f.db, f.member, f.group_id, 121).is_err());
    }
}
