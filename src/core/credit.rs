use crate::core::access;
use crate::domain::model::{ContributionStatus, Database, KycStatus, LoanStatus};
use crate::utils::error::{ChamaError, Result};
use serde::Serialize;
use uuid::Uuid;

pub const MIN_SCORE: i64 = 300;
pub const MAX_SCORE: i64 = 850;
const BASE_SCORE: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditBand {
    Poor,
    Fair,
    Good,
    VeryGood,
    Excellent,
}

impl CreditBand {
    pub fn for_score(score: i64) -> Self {
        match score {
            s if s < 580 => CreditBand::Poor,
            s if s < 670 => CreditBand::Fair,
            s if s < 740 => CreditBand::Good,
            s if s < 800 => CreditBand::VeryGood,
            _ => CreditBand::Excellent,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ScoreFactors {
    pub confirmed_contributions: i64,
    pub repaid_loans: i64,
    pub on_time_repayments: i64,
    pub late_repayments: i64,
    pub defaulted_loans: i64,
    pub kyc_verified: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreditScore {
    pub user_id: Uuid,
    pub score: i64,
    pub band: CreditBand,
    pub factors: ScoreFactors,
}

pub fn score_from(factors: &ScoreFactors) -> i64 {
    let mut score = BASE_SCORE;
    score += (factors.confirmed_contributions * 5).min(120);
    score += (factors.repaid_loans * 40).min(160);
    score += (factors.on_time_repayments * 10).min(50);
    if factors.kyc_verified {
        score += 30;
    }
    score -= factors.late_repayments * 20;
    score -= factors.defaulted_loans * 150;
    score.clamp(MIN_SCORE, MAX_SCORE)
}

pub fn factors_for(db: &Database, user_id: Uuid) -> ScoreFactors {
    let mut factors = ScoreFactors {
        confirmed_contributions: db
            .contributions
            .values()
            .filter(|c| c.member_id == user_id && c.status == ContributionStatus::Confirmed)
            .count() as i64,
        kyc_verified: db
            .users
            .get(&user_id)
            .map(|u| u.kyc_status == KycStatus::Verified)
            .unwrap_or(false),
        ..Default::default()
    };
    for loan in db.loans.values().filter(|l| l.borrower_id == user_id) {
        match loan.status {
            LoanStatus::Repaid => factors.repaid_loans += 1,
            LoanStatus::Defaulted => factors.defaulted_loans += 1,
            _ => {}
        }
        for repayment in &loan.repayments {
            if repayment.on_time {
                factors.on_time_repayments += 1;
            } else {
                factors.late_repayments += 1;
            }
        }
    }
    factors
}

pub fn credit_score(db: &Database, user_id: Uuid) -> Result<CreditScore> {
    access::user(db, user_id)?;
    let factors = factors_for(db, user_id);
    let score = score_from(&factors);
    Ok(CreditScore {
        user_id,
        score,
        band: CreditBand::for_score(score),
        factors,
    })
}

/// 只能查自己的分數，員工可查任何人
pub fn user_score(db: &Database, viewer: Uuid, user_id: Uuid) -> Result<CreditScore> {
    if viewer != user_id && !access::user(db, viewer)?.is_staff {
        return Err(ChamaError::forbidden(
            "You can only view your own credit score",
        ));
    }
    credit_score(db, user_id)
}
