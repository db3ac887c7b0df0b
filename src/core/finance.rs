//! Contributions, the loan lifecycle and the group ledger.

use crate::core::access;
use crate::core::accounts;
use crate::core::audit::{self, AuditEvent};
use crate::domain::model::{
    Amount, Approval, Contribution, ContributionStatus, Database, Decision, InvestmentStatus, Loan,
    LoanRepayment, LoanStatus, OfficialPosition, PaymentMethod, WalletTransactionKind,
};
use crate::utils::error::{ChamaError, Result};
use crate::utils::validation;
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 貸款上限為會員已確認繳款的倍數
pub const LOAN_MULTIPLIER: Amount = 3;
pub const MAX_TERM_MONTHS: u32 = 36;

#[derive(Debug, Clone, Deserialize)]
pub struct RecordContributionRequest {
    pub group_id: Uuid,
    pub amount: Amount,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoanApplication {
    pub group_id: Uuid,
    pub principal: Amount,
    pub term_months: u32,
    #[serde(default)]
    pub purpose: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Installment {
    pub number: u32,
    pub due_date: DateTime<Utc>,
    pub amount: Amount,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct GroupSummary {
    pub group_id: Uuid,
    pub total_contributions: Amount,
    pub total_disbursed: Amount,
    pub total_repaid: Amount,
    pub total_invested: Amount,
    pub liquidation_proceeds: Amount,
    pub available_balance: Amount,
    pub outstanding_loans: Amount,
}

/// 單利: principal × rate_bps × months / 120000，四捨五入
pub fn total_due(principal: Amount, rate_bps: u32, term_months: u32) -> Amount {
    let numerator = principal as i128 * rate_bps as i128 * term_months as i128;
    let interest = (numerator + 60_000) / 120_000;
    principal + interest as Amount
}

fn reference_with_prefix(prefix: &str) -> String {
    format!(
        "{}-{}",
        prefix,
        Uuid::new_v4().simple().to_string()[..10].to_uppercase()
    )
}

/// 由錢包扣款並建立已確認的繳款
pub fn contribute_from_wallet(
    db: &mut Database,
    member_id: Uuid,
    group_id: Uuid,
    amount: Amount,
    method: PaymentMethod,
    reference: String,
    now: DateTime<Utc>,
) -> Result<Contribution> {
    accounts::post_wallet(
        db,
        member_id,
        WalletTransactionKind::ContributionDebit,
        -amount,
        &reference,
        now,
    )?;
    let contribution = Contribution {
        id: Uuid::new_v4(),
        group_id,
        member_id,
        amount,
        method,
        reference,
        status: ContributionStatus::Confirmed,
        created_at: now,
        confirmed_by: None,
    };
    db.contributions.insert(contribution.id, contribution.clone());
    Ok(contribution)
}

pub fn record_contribution(
    db: &mut Database,
    actor: Uuid,
    request: RecordContributionRequest,
    now: DateTime<Utc>,
) -> Result<Contribution> {
    validation::validate_amount("amount", request.amount)?;
    access::active_group(db, request.group_id)?;
    access::require_active_member(db, request.group_id, actor)?;

    let contribution = match request.method {
        PaymentMethod::Mpesa => {
            return Err(ChamaError::validation(
                "method",
                "M-Pesa contributions are made through an STK push",
            ))
        }
        PaymentMethod::Wallet => contribute_from_wallet(
            db,
            actor,
            request.group_id,
            request.amount,
            PaymentMethod::Wallet,
            reference_with_prefix("CW"),
            now,
        )?,
        PaymentMethod::Cash => {
            let contribution = Contribution {
                id: Uuid::new_v4(),
                group_id: request.group_id,
                member_id: actor,
                amount: request.amount,
                method: PaymentMethod::Cash,
                reference: request
                    .reference
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| reference_with_prefix("CC")),
                status: ContributionStatus::Pending,
                created_at: now,
                confirmed_by: None,
            };
            db.contributions.insert(contribution.id, contribution.clone());
            contribution
        }
    };

    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "create",
            entity: "contribution",
            entity_id: contribution.id,
            group_id: Some(contribution.group_id),
            detail: format!("amount={} method={:?}", contribution.amount, contribution.method),
        },
        now,
    );
    Ok(contribution)
}

fn settle_contribution(
    db: &mut Database,
    actor: Uuid,
    contribution_id: Uuid,
    status: ContributionStatus,
    now: DateTime<Utc>,
) -> Result<Contribution> {
    let contribution = db
        .contributions
        .get(&contribution_id)
        .cloned()
        .ok_or_else(|| ChamaError::not_found("Contribution", contribution_id))?;
    access::require_official(db, contribution.group_id, actor)?;
    if contribution.status != ContributionStatus::Pending {
        return Err(ChamaError::invalid_state(
            "Only pending contributions can be confirmed or rejected",
        ));
    }

    let mut updated = contribution;
    updated.status = status;
    updated.confirmed_by = Some(actor);
    db.contributions.insert(updated.id, updated.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: if status == ContributionStatus::Confirmed {
                "confirm"
            } else {
                "reject"
            },
            entity: "contribution",
            entity_id: updated.id,
            group_id: Some(updated.group_id),
            detail: format!("amount={}", updated.amount),
        },
        now,
    );
    Ok(updated)
}

pub fn confirm_contribution(
    db: &mut Database,
    actor: Uuid,
    contribution_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Contribution> {
    settle_contribution(db, actor, contribution_id, ContributionStatus::Confirmed, now)
}

pub fn reject_contribution(
    db: &mut Database,
    actor: Uuid,
    contribution_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Contribution> {
    settle_contribution(db, actor, contribution_id, ContributionStatus::Failed, now)
}

/// 指定群組時列出該群組全部繳款 (需為會員)，否則列出自己的
pub fn list_contributions(
    db: &Database,
    viewer: Uuid,
    group_id: Option<Uuid>,
) -> Result<Vec<Contribution>> {
    let mut items: Vec<Contribution> = match group_id {
        Some(group_id) => {
            access::require_active_member(db, group_id, viewer)?;
            db.contributions
                .values()
                .filter(|c| c.group_id == group_id)
                .cloned()
                .collect()
        }
        None => db
            .contributions
            .values()
            .filter(|c| c.member_id == viewer)
            .cloned()
            .collect(),
    };
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(items)
}

pub fn confirmed_contributions_of(db: &Database, group_id: Uuid, member_id: Uuid) -> Result<Amount> {
    validation::checked_sum(
        "amount",
        db.contributions
            .values()
            .filter(|c| {
                c.group_id == group_id
                    && c.member_id == member_id
                    && c.status == ContributionStatus::Confirmed
            })
            .map(|c| c.amount),
    )
}

pub fn group_summary(db: &Database, group_id: Uuid) -> Result<GroupSummary> {
    access::group(db, group_id)?;
    let mut summary = GroupSummary {
        group_id,
        ..Default::default()
    };
    summary.total_contributions = validation::checked_sum(
        "total_contributions",
        db.contributions
            .values()
            .filter(|c| c.group_id == group_id && c.status == ContributionStatus::Confirmed)
            .map(|c| c.amount),
    )?;
    for loan in db.loans.values().filter(|l| l.group_id == group_id) {
        if loan.disbursed_at.is_some() {
            summary.total_disbursed =
                validation::checked_add("total_disbursed", summary.total_disbursed, loan.principal)?;
        }
        summary.total_repaid =
            validation::checked_add("total_repaid", summary.total_repaid, loan.amount_repaid)?;
        if loan.carries_balance() {
            summary.outstanding_loans = validation::checked_add(
                "outstanding_loans",
                summary.outstanding_loans,
                loan.outstanding(),
            )?;
        }
    }
    for investment in db.investments.values().filter(|i| i.group_id == group_id) {
        summary.total_invested = validation::checked_add(
            "total_invested",
            summary.total_invested,
            investment.amount_invested,
        )?;
        if investment.status == InvestmentStatus::Liquidated {
            summary.liquidation_proceeds = validation::checked_add(
                "liquidation_proceeds",
                summary.liquidation_proceeds,
                investment.current_value,
            )?;
        }
    }
    let inflow = validation::checked_sum(
        "available_balance",
        [
            summary.total_contributions,
            summary.total_repaid,
            summary.liquidation_proceeds,
        ],
    )?;
    let outflow = validation::checked_add(
        "available_balance",
        summary.total_disbursed,
        summary.total_invested,
    )?;
    summary.available_balance = validation::checked_sub("available_balance", inflow, outflow)?;
    Ok(summary)
}

pub fn available_balance(db: &Database, group_id: Uuid) -> Result<Amount> {
    Ok(group_summary(db, group_id)?.available_balance)
}

fn find_loan(db: &Database, loan_id: Uuid) -> Result<Loan> {
    db.loans
        .get(&loan_id)
        .cloned()
        .ok_or_else(|| ChamaError::not_found("Loan", loan_id))
}

pub fn apply_for_loan(
    db: &mut Database,
    actor: Uuid,
    application: LoanApplication,
    now: DateTime<Utc>,
) -> Result<Loan> {
    validation::validate_amount("principal", application.principal)?;
    validation::validate_range("term_months", application.term_months, 1, MAX_TERM_MONTHS)?;
    let group = access::active_group(db, application.group_id)?;
    let rate_bps = group.loan_interest_rate_bps;
    access::require_active_member(db, application.group_id, actor)?;

    let has_open_loan = db.loans.values().any(|l| {
        l.group_id == application.group_id && l.borrower_id == actor && l.is_unsettled()
    });
    if has_open_loan {
        return Err(ChamaError::conflict(
            "You already have an open loan in this group",
        ));
    }
    let limit = validation::checked_mul(
        "principal",
        confirmed_contributions_of(db, application.group_id, actor)?,
        LOAN_MULTIPLIER,
    )?;
    if application.principal > limit {
        return Err(ChamaError::validation(
            "principal",
            format!(
                "Loan limit is {} ({}x your confirmed contributions)",
                limit, LOAN_MULTIPLIER
            ),
        ));
    }

    let loan = Loan {
        id: Uuid::new_v4(),
        group_id: application.group_id,
        borrower_id: actor,
        principal: application.principal,
        interest_rate_bps: rate_bps,
        term_months: application.term_months,
        purpose: application.purpose.trim().to_string(),
        total_due: total_due(application.principal, rate_bps, application.term_months),
        amount_repaid: 0,
        status: LoanStatus::Pending,
        approvals: Vec::new(),
        repayments: Vec::new(),
        created_at: now,
        disbursed_at: None,
        due_date: None,
    };
    db.loans.insert(loan.id, loan.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "apply",
            entity: "loan",
            entity_id: loan.id,
            group_id: Some(loan.group_id),
            detail: format!("principal={} term={}", loan.principal, loan.term_months),
        },
        now,
    );
    Ok(loan)
}

/// 需要的核准數: 群組設定值，但不超過可投票的幹部人數
pub fn approvals_needed(db: &Database, loan: &Loan) -> usize {
    let eligible = db
        .officials
        .values()
        .filter(|o| o.group_id == loan.group_id && o.user_id != loan.borrower_id)
        .count();
    let required = db
        .groups
        .get(&loan.group_id)
        .map(|g| g.required_approvals as usize)
        .unwrap_or(1);
    required.min(eligible)
}

pub fn decide_loan(
    db: &mut Database,
    actor: Uuid,
    loan_id: Uuid,
    decision: Decision,
    request: DecisionRequest,
    now: DateTime<Utc>,
) -> Result<Loan> {
    let mut loan = find_loan(db, loan_id)?;
    access::require_official(db, loan.group_id, actor)?;
    if loan.borrower_id == actor {
        return Err(ChamaError::forbidden("You cannot decide on your own loan"));
    }
    if loan.status != LoanStatus::Pending {
        return Err(ChamaError::invalid_state(format!(
            "Loan is already {:?}",
            loan.status
        )));
    }
    if loan.approvals.iter().any(|a| a.official_id == actor) {
        return Err(ChamaError::conflict("You have already decided on this loan"));
    }

    loan.approvals.push(Approval {
        official_id: actor,
        decision,
        comment: request.comment.trim().to_string(),
        decided_at: now,
    });
    let approvals = loan
        .approvals
        .iter()
        .filter(|a| a.decision == Decision::Approve)
        .count();
    let needed = approvals_needed(db, &loan);
    if decision == Decision::Reject {
        loan.status = LoanStatus::Rejected;
    } else if needed > 0 && approvals >= needed {
        loan.status = LoanStatus::Approved;
    }

    db.loans.insert(loan.id, loan.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: match decision {
                Decision::Approve => "approve",
                Decision::Reject => "reject",
            },
            entity: "loan",
            entity_id: loan.id,
            group_id: Some(loan.group_id),
            detail: format!("approvals={}/{} status={:?}", approvals, needed, loan.status),
        },
        now,
    );
    Ok(loan)
}

pub fn disburse_loan(
    db: &mut Database,
    actor: Uuid,
    loan_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Loan> {
    let mut loan = find_loan(db, loan_id)?;
    access::require_position(
        db,
        loan.group_id,
        actor,
        &[OfficialPosition::Treasurer, OfficialPosition::Chairperson],
    )?;
    if loan.status != LoanStatus::Approved {
        return Err(ChamaError::invalid_state(
            "Only approved loans can be disbursed",
        ));
    }
    let available = available_balance(db, loan.group_id)?;
    if loan.principal > available {
        return Err(ChamaError::invalid_state(format!(
            "Insufficient group funds: available {}, required {}",
            available, loan.principal
        )));
    }

    let reference = format!("LOAN-{}", loan.id.simple());
    accounts::post_wallet(
        db,
        loan.borrower_id,
        WalletTransactionKind::LoanDisbursement,
        loan.principal,
        &reference,
        now,
    )?;
    loan.status = LoanStatus::Disbursed;
    loan.disbursed_at = Some(now);
    loan.due_date = now.checked_add_months(Months::new(loan.term_months));
    db.loans.insert(loan.id, loan.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "disburse",
            entity: "loan",
            entity_id: loan.id,
            group_id: Some(loan.group_id),
            detail: format!("principal={}", loan.principal),
        },
        now,
    );
    Ok(loan)
}

pub fn repay_loan(
    db: &mut Database,
    actor: Uuid,
    loan_id: Uuid,
    amount: Amount,
    now: DateTime<Utc>,
) -> Result<Loan> {
    validation::validate_amount("amount", amount)?;
    let mut loan = find_loan(db, loan_id)?;
    if loan.borrower_id != actor {
        return Err(ChamaError::forbidden("Only the borrower can repay this loan"));
    }
    if !loan.carries_balance() {
        return Err(ChamaError::invalid_state(
            "Only disbursed or defaulted loans with a balance can be repaid",
        ));
    }
    if amount > loan.outstanding() {
        return Err(ChamaError::validation(
            "amount",
            format!("Amount exceeds the outstanding balance of {}", loan.outstanding()),
        ));
    }

    let reference = format!("REPAY-{}", loan.id.simple());
    accounts::post_wallet(
        db,
        actor,
        WalletTransactionKind::LoanRepayment,
        -amount,
        &reference,
        now,
    )?;
    let on_time = loan.due_date.map(|due| now <= due).unwrap_or(true);
    loan.repayments.push(LoanRepayment {
        id: Uuid::new_v4(),
        amount,
        paid_at: now,
        on_time,
    });
    loan.amount_repaid += amount;
    // 違約紀錄保留；結清後不再占用額度
    if loan.outstanding() == 0 && loan.status == LoanStatus::Disbursed {
        loan.status = LoanStatus::Repaid;
    }
    db.loans.insert(loan.id, loan.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "repay",
            entity: "loan",
            entity_id: loan.id,
            group_id: Some(loan.group_id),
            detail: format!("amount={} on_time={}", amount, on_time),
        },
        now,
    );
    Ok(loan)
}

/// 等額月付，餘數併入最後一期
pub fn loan_schedule(loan: &Loan) -> Vec<Installment> {
    let start = loan.disbursed_at.unwrap_or(loan.created_at);
    let months = loan.term_months.max(1);
    let base = loan.total_due / months as Amount;
    let remainder = loan.total_due - base * months as Amount;
    (1..=months)
        .map(|n| Installment {
            number: n,
            due_date: start.checked_add_months(Months::new(n)).unwrap_or(start),
            amount: if n == months { base + remainder } else { base },
        })
        .collect()
}

pub fn get_loan(db: &Database, viewer: Uuid, loan_id: Uuid) -> Result<Loan> {
    let loan = find_loan(db, loan_id)?;
    if loan.borrower_id != viewer {
        access::require_active_member(db, loan.group_id, viewer)?;
    }
    Ok(loan)
}

pub fn list_loans(
    db: &Database,
    viewer: Uuid,
    group_id: Option<Uuid>,
    status: Option<LoanStatus>,
) -> Result<Vec<Loan>> {
    if let Some(group_id) = group_id {
        access::require_active_member(db, group_id, viewer)?;
    }
    let mut loans: Vec<Loan> = db
        .loans
        .values()
        .filter(|l| match group_id {
            Some(g) => l.group_id == g,
            None => l.borrower_id == viewer,
        })
        .filter(|l| status.map(|s| l.status == s).unwrap_or(true))
        .cloned()
        .collect();
    loans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(loans)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::accounts::tests::register_user;
    use crate::core::groups::tests::{add_member, create_test_group};
    use crate::core::groups::{appoint_official, AppointOfficialRequest};

    pub(crate) struct Fixture {
        pub db: Database,
        pub group_id: Uuid,
        pub chair: Uuid,
        pub treasurer: Uuid,
        pub member: Uuid,
    }

    pub(crate) fn fund_wallet(db: &mut Database, user: Uuid, amount: Amount) {
        accounts::post_wallet(db, user, WalletTransactionKind::Deposit, amount, "TEST", Utc::now())
            .unwrap();
    }

    pub(crate) fn contribute(db: &mut Database, user: Uuid, group_id: Uuid, amount: Amount) {
        fund_wallet(db, user, amount);
        record_contribution(
            db,
            user,
            RecordContributionRequest {
                group_id,
                amount,
                method: PaymentMethod::Wallet,
                reference: None,
            },
            Utc::now(),
        )
        .unwrap();
    }

    /// 主席、財務與一般會員，三人各繳 100,000
    pub(crate) fn fixture() -> Fixture {
        let mut db = Database::default();
        let chair = register_user(&mut db, "chair", "0711000001");
        let treasurer = register_user(&mut db, "treasurer", "0711000002");
        let member = register_user(&mut db, "member", "0711000003");
        let group_id = create_test_group(&mut db, chair, "Umoja");
        add_member(&mut db, group_id, chair, treasurer);
        add_member(&mut db, group_id, chair, member);
        appoint_official(
            &mut db,
            chair,
            group_id,
            AppointOfficialRequest {
                user_id: treasurer,
                position: OfficialPosition::Treasurer,
            },
            Utc::now(),
        )
        .unwrap();
        for user in [chair, treasurer, member] {
            contribute(&mut db, user, group_id, 100_000);
        }
        Fixture {
            db,
            group_id,
            chair,
            treasurer,
            member,
        }
    }

    pub(crate) fn approved_loan(f: &mut Fixture, principal: Amount) -> Uuid {
        let loan = apply_for_loan(
            &mut f.db,
            f.member,
            LoanApplication {
                group_id: f.group_id,
                principal,
                term_months: 3,
                purpose: "stock".to_string(),
            },
            Utc::now(),
        )
        .unwrap();
        for official in [f.chair, f.treasurer] {
            decide_loan(
                &mut f.db,
                official,
                loan.id,
                Decision::Approve,
                DecisionRequest::default(),
                Utc::now(),
            )
            .unwrap();
        }
        loan.id
    }

    #[test]
    fn test_total_due_flat_interest_rounds_half_up() {
        // 10% 年利率，12 個月
        assert_eq!(total_due(100_000, 1000, 12), 110_000);
        assert_eq!(total_due(100_000, 1000, 1), 100_833);
        // 0.5 進位
        assert_eq!(total_due(6, 1000, 1), 6);
        assert_eq!(total_due(12, 5000, 1), 13);
        assert_eq!(total_due(50_000, 0, 6), 50_000);
    }

    #[test]
    fn test_cash_contribution_needs_confirmation() {
        let mut f = fixture();
        let cash = record_contribution(
            &mut f.db,
            f.member,
            RecordContributionRequest {
                group_id: f.group_id,
                amount: 5_000,
                method: PaymentMethod::Cash,
                reference: Some("RCPT-1".to_string()),
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(cash.status, ContributionStatus::Pending);
        let before = group_summary(&f.db, f.group_id).unwrap().total_contributions;

        assert!(confirm_contribution(&mut f.db, f.member, cash.id, Utc::now()).is_err());
        confirm_contribution(&mut f.db, f.treasurer, cash.id, Utc::now()).unwrap();
        let after = group_summary(&f.db, f.group_id).unwrap().total_contributions;
        assert_eq!(after - before, 5_000);
        assert!(reject_contribution(&mut f.db, f.treasurer, cash.id, Utc::now()).is_err());
    }

    #[test]
    fn test_wallet_contribution_requires_balance() {
        let mut f = fixture();
        let err = record_contribution(
            &mut f.db,
            f.member,
            RecordContributionRequest {
                group_id: f.group_id,
                amount: 1_000,
                method: PaymentMethod::Wallet,
                reference: None,
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, ChamaError::ValidationError { .. }));
    }

    #[test]
    fn test_mpesa_contributions_are_rejected_here() {
        let mut f = fixture();
        let result = record_contribution(
            &mut f.db,
            f.member,
            RecordContributionRequest {
                group_id: f.group_id,
                amount: 1_000,
                method: PaymentMethod::Mpesa,
                reference: None,
            },
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_loan_limit_is_three_times_contributions() {
        let mut f = fixture();
        let too_big = apply_for_loan(
            &mut f.db,
            f.member,
            LoanApplication {
                group_id: f.group_id,
                principal: 300_001,
                term_months: 6,
                purpose: String::new(),
            },
            Utc::now(),
        );
        assert!(too_big.is_err());

        let bad_term = apply_for_loan(
            &mut f.db,
            f.member,
            LoanApplication {
                group_id: f.group_id,
                principal: 1_000,
                term_months: 37,
                purpose: String::new(),
            },
            Utc::now(),
        );
        assert!(bad_term.is_err());
    }

    #[test]
    fn test_multisig_approval_and_single_rejection() {
        let mut f = fixture();
        let loan = apply_for_loan(
            &mut f.db,
            f.member,
            LoanApplication {
                group_id: f.group_id,
                principal: 50_000,
                term_months: 3,
                purpose: String::new(),
            },
            Utc::now(),
        )
        .unwrap();

        let once = decide_loan(
            &mut f.db,
            f.chair,
            loan.id,
            Decision::Approve,
            DecisionRequest::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(once.status, LoanStatus::Pending);
        // 同一幹部不可重複
        assert!(decide_loan(
            &mut f.db,
            f.chair,
            loan.id,
            Decision::Approve,
            DecisionRequest::default(),
            Utc::now(),
        )
        .is_err());
        // 一般會員不可核准
        assert!(decide_loan(
            &mut f.db,
            f.member,
            loan.id,
            Decision::Approve,
            DecisionRequest::default(),
            Utc::now(),
        )
        .is_err());

        let twice = decide_loan(
            &mut f.db,
            f.treasurer,
            loan.id,
            Decision::Approve,
            DecisionRequest::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(twice.status, LoanStatus::Approved);

        // 另一筆貸款被單一幹部否決
        let mut g = fixture();
        let loan = apply_for_loan(
            &mut g.db,
            g.member,
            LoanApplication {
                group_id: g.group_id,
                principal: 10_000,
                term_months: 1,
                purpose: String::new(),
            },
            Utc::now(),
        )
        .unwrap();
        let rejected = decide_loan(
            &mut g.db,
            g.treasurer,
            loan.id,
            Decision::Reject,
            DecisionRequest {
                comment: "not now".to_string(),
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(rejected.status, LoanStatus::Rejected);
    }

    #[test]
    fn test_required_approvals_capped_by_eligible_officials() {
        // 主席自己借款時只剩財務一位可核准
        let mut f = fixture();
        let loan = apply_for_loan(
            &mut f.db,
            f.chair,
            LoanApplication {
                group_id: f.group_id,
                principal: 10_000,
                term_months: 2,
                purpose: String::new(),
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(approvals_needed(&f.db, &loan), 1);
        assert!(decide_loan(
            &mut f.db,
            f.chair,
            loan.id,
            Decision::Approve,
            DecisionRequest::default(),
            Utc::now(),
        )
        .is_err());
        let approved = decide_loan(
            &mut f.db,
            f.treasurer,
            loan.id,
            Decision::Approve,
            DecisionRequest::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(approved.status, LoanStatus::Approved);
    }

    #[test]
    fn test_disburse_and_repay_in_full() {
        let mut f = fixture();
        let loan_id = approved_loan(&mut f, 60_000);

        assert!(disburse_loan(&mut f.db, f.member, loan_id, Utc::now()).is_err());
        let loan = disburse_loan(&mut f.db, f.treasurer, loan_id, Utc::now()).unwrap();
        assert_eq!(loan.status, LoanStatus::Disbursed);
        assert!(loan.due_date.is_some());
        assert_eq!(accounts::wallet(&f.db, f.member).unwrap().balance, 60_000);
        assert_eq!(loan.total_due, 61_500);

        fund_wallet(&mut f.db, f.member, 1_500);
        let partial = repay_loan(&mut f.db, f.member, loan_id, 20_000, Utc::now()).unwrap();
        assert_eq!(partial.outstanding(), 41_500);
        assert!(repay_loan(&mut f.db, f.member, loan_id, 50_000, Utc::now()).is_err());
        let repaid = repay_loan(&mut f.db, f.member, loan_id, 41_500, Utc::now()).unwrap();
        assert_eq!(repaid.status, LoanStatus::Repaid);
        assert!(repaid.repayments.iter().all(|r| r.on_time));

        let summary = group_summary(&f.db, f.group_id).unwrap();
        assert_eq!(summary.total_disbursed, 60_000);
        assert_eq!(summary.total_repaid, 61_500);
        assert_eq!(summary.available_balance, 300_000 - 60_000 + 61_500);
        assert_eq!(summary.outstanding_loans, 0);
    }

    #[test]
    fn test_disbursement_requires_group_funds() {
        let mut f = fixture();
        // 會員再多繳，讓額度超過群組餘額
        contribute(&mut f.db, f.member, f.group_id, 100_000);
        let loan_id = approved_loan(&mut f, 500_000);
        let err = disburse_loan(&mut f.db, f.treasurer, loan_id, Utc::now()).unwrap_err();
        assert!(matches!(err, ChamaError::InvalidState { .. }));
    }

    #[test]
    fn test_one_open_loan_per_group() {
        let mut f = fixture();
        approved_loan(&mut f, 10_000);
        let second = apply_for_loan(
            &mut f.db,
            f.member,
            LoanApplication {
                group_id: f.group_id,
                principal: 10_000,
                term_months: 1,
                purpose: String::new(),
            },
            Utc::now(),
        );
        assert!(matches!(second, Err(ChamaError::Conflict { .. })));
    }

    #[test]
    fn test_amounts_are_capped_and_totals_never_overflow() {
        let mut f = fixture();
        let too_big = record_contribution(
            &mut f.db,
            f.member,
            RecordContributionRequest {
                group_id: f.group_id,
                amount: validation::MAX_AMOUNT + 1,
                method: PaymentMethod::Cash,
                reference: None,
            },
            Utc::now(),
        );
        assert!(matches!(too_big, Err(ChamaError::ValidationError { .. })));

        // 從舊快照載入的異常金額不會讓計算 panic
        let mut huge = f.db.contributions.values().next().unwrap().clone();
        huge.id = Uuid::new_v4();
        huge.member_id = f.member;
        huge.amount = i64::MAX - 1_000;
        f.db.contributions.insert(huge.id, huge);

        let loan = apply_for_loan(
            &mut f.db,
            f.member,
            LoanApplication {
                group_id: f.group_id,
                principal: 1_000,
                term_months: 1,
                purpose: String::new(),
            },
            Utc::now(),
        );
        assert!(matches!(loan, Err(ChamaError::ValidationError { .. })));
        assert!(matches!(
            group_summary(&f.db, f.group_id),
            Err(ChamaError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_defaulted_balance_keeps_the_loan_open() {
        let mut f = fixture();
        let loan_id = approved_loan(&mut f, 60_000);
        disburse_loan(&mut f.db, f.treasurer, loan_id, Utc::now()).unwrap();
        if let Some(loan) = f.db.loans.get_mut(&loan_id) {
            loan.status = LoanStatus::Defaulted;
        }

        let summary = group_summary(&f.db, f.group_id).unwrap();
        assert_eq!(summary.outstanding_loans, 61_500);

        let again = apply_for_loan(
            &mut f.db,
            f.member,
            LoanApplication {
                group_id: f.group_id,
                principal: 10_000,
                term_months: 1,
                purpose: String::new(),
            },
            Utc::now(),
        );
        assert!(matches!(again, Err(ChamaError::Conflict { .. })));
        let leave = crate::core::groups::leave_group(&mut f.db, f.member, f.group_id, Utc::now());
        assert!(matches!(leave, Err(ChamaError::InvalidState { .. })));
        let close = crate::core::groups::deactivate_group(&mut f.db, f.chair, f.group_id, Utc::now());
        assert!(matches!(close, Err(ChamaError::InvalidState { .. })));

        // 還清後違約紀錄保留，但不再擋新貸款
        fund_wallet(&mut f.db, f.member, 1_500);
        let settled = repay_loan(&mut f.db, f.member, loan_id, 61_500, Utc::now()).unwrap();
        assert_eq!(settled.status, LoanStatus::Defaulted);
        assert_eq!(settled.outstanding(), 0);
        assert_eq!(group_summary(&f.db, f.group_id).unwrap().outstanding_loans, 0);
        assert!(apply_for_loan(
            &mut f.db,
            f.member,
            LoanApplication {
                group_id: f.group_id,
                principal: 10_000,
                term_months: 1,
                purpose: String::new(),
            },
            Utc::now(),
        )
        .is_ok());
    }

    #[test]
    fn test_schedule_puts_remainder_on_last_installment() {
        let mut f = fixture();
        let loan_id = approved_loan(&mut f, 100_000);
        let loan = f.db.loans.get(&loan_id).unwrap().clone();
        let schedule = loan_schedule(&loan);

        assert_eq!(schedule.len(), 3);
        assert_eq!(loan.total_due, 102_500);
        assert_eq!(schedule[0].amount, 34_166);
        assert_eq!(schedule[2].amount, 34_168);
        assert_eq!(schedule.iter().map(|i| i.amount).sum::<Amount>(), loan.total_due);
    }
}
