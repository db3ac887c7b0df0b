use crate::core::access;
use crate::domain::model::{Amount, ContributionStatus, Database, LoanStatus};
use crate::utils::error::Result;
use chrono::{DateTime, Datelike, Months, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

const TREND_MONTHS: u32 = 12;
const TOP_CONTRIBUTORS: usize = 5;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MonthlyTotal {
    pub month: String,
    pub total: Amount,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Contributor {
    pub user_id: Uuid,
    pub username: String,
    pub total: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupAnalytics {
    pub group_id: Uuid,
    pub active_members: usize,
    pub current_period: String,
    pub compliance_bps: i64,
    pub monthly_contributions: Vec<MonthlyTotal>,
    pub loans_by_status: BTreeMap<String, usize>,
    pub default_rate_bps: i64,
    pub top_contributors: Vec<Contributor>,
    pub generated_at: DateTime<Utc>,
}

/// 最近 12 個月的月份字串，由舊到新
fn trailing_months(now: DateTime<Utc>) -> Vec<String> {
    let first = now.date_naive().with_day(1).unwrap_or(now.date_naive());
    (0..TREND_MONTHS)
        .rev()
        .filter_map(|back| first.checked_sub_months(Months::new(back)))
        .map(|d| d.format("%Y-%m").to_string())
        .collect()
}

fn loan_status_key(status: LoanStatus) -> &'static str {
    match status {
        LoanStatus::Pending => "pending",
        LoanStatus::Approved => "approved",
        LoanStatus::Rejected => "rejected",
        LoanStatus::Disbursed => "disbursed",
        LoanStatus::Repaid => "repaid",
        LoanStatus::Defaulted => "defaulted",
    }
}

pub fn group_analytics(
    db: &Database,
    viewer: Uuid,
    group_id: Uuid,
    now: DateTime<Utc>,
) -> Result<GroupAnalytics> {
    access::require_active_member(db, group_id, viewer)?;
    let group = access::group(db, group_id)?;
    let members = access::active_member_ids(db, group_id);
    let current_period = group.contribution_frequency.period_key(now);

    let confirmed: Vec<_> = db
        .contributions
        .values()
        .filter(|c| c.group_id == group_id && c.status == ContributionStatus::Confirmed)
        .collect();

    let mut by_month: BTreeMap<String, Amount> = trailing_months(now)
        .into_iter()
        .map(|m| (m, 0))
        .collect();
    let mut by_member: HashMap<Uuid, Amount> = HashMap::new();
    let mut paid_this_period: HashSet<Uuid> = HashSet::new();
    for c in &confirmed {
        if let Some(total) = by_month.get_mut(&c.created_at.format("%Y-%m").to_string()) {
            *total += c.amount;
        }
        *by_member.entry(c.member_id).or_default() += c.amount;
        if group.contribution_frequency.period_key(c.created_at) == current_period {
            paid_this_period.insert(c.member_id);
        }
    }

    let compliant = members.iter().filter(|m| paid_this_period.contains(m)).count();
    let compliance_bps = if members.is_empty() {
        0
    } else {
        (compliant * 10_000 / members.len()) as i64
    };

    let mut loans_by_status: BTreeMap<String, usize> = BTreeMap::new();
    for loan in db.loans.values().filter(|l| l.group_id == group_id) {
        *loans_by_status
            .entry(loan_status_key(loan.status).to_string())
            .or_default() += 1;
    }
    let count = |s: LoanStatus| loans_by_status.get(loan_status_key(s)).copied().unwrap_or(0);
    let defaulted = count(LoanStatus::Defaulted);
    let settled = count(LoanStatus::Disbursed) + count(LoanStatus::Repaid) + defaulted;
    let default_rate_bps = if settled == 0 {
        0
    } else {
        (defaulted * 10_000 / settled) as i64
    };

    let mut top_contributors: Vec<Contributor> = by_member
        .into_iter()
        .map(|(user_id, total)| Contributor {
            user_id,
            username: db
                .users
                .get(&user_id)
                .map(|u| u.username.clone())
                .unwrap_or_default(),
            total,
        })
        .collect();
    top_contributors.sort_by(|a, b| b.total.cmp(&a.total).then(a.username.cmp(&b.username)));
    top_contributors.truncate(TOP_CONTRIBUTORS);

    Ok(GroupAnalytics {
        group_id,
        active_members: members.len(),
        current_period,
        compliance_bps,
        monthly_contributions: by_month
            .into_iter()
            .map(|(month, total)| MonthlyTotal { month, total })
            .collect(),
        loans_by_status,
        default_rate_bps,
        top_contributors,
        generated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::finance::tests::{contribute, fixture};
    use chrono::TimeZone;

    #[test]
    fn test_trailing_months_cross_year_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let months = trailing_months(now);
        assert_eq!(months.len(), 12);
        assert_eq!(months.first().unwrap(), "2023-04");
        assert_eq!(months.last().unwrap(), "2024-03");
    }

    #[test]
    fn test_group_analytics() {
        let mut f = fixture();
        contribute(&mut f.db, f.member, f.group_id, 50_000);

        let report = group_analytics(&f.db, f.member, f.group_id, Utc::now()).unwrap();
        assert_eq!(report.active_members, 3);
        assert_eq!(report.compliance_bps, 10_000);
        assert_eq!(report.monthly_contributions.len(), 12);
        assert_eq!(report.monthly_contributions.last().unwrap().total, 350_000);
        assert_eq!(report.top_contributors[0].username, "member");
        assert_eq!(report.top_contributors[0].total, 150_000);
        assert_eq!(report.default_rate_bps, 0);
    }
}
