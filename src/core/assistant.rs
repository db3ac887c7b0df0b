//! Keyword-driven assistant that answers from the caller's own data.

use crate::core::{access, accounts, credit};
use crate::domain::model::{ContributionStatus, Database, LoanStatus, ProposalStatus};
use crate::utils::error::Result;
use crate::utils::validation;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Balance,
    Loans,
    Contributions,
    Credit,
    Governance,
    SavingsTips,
    Help,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub intent: Intent,
    pub answer: String,
    pub suggestions: Vec<&'static str>,
}

const TOPICS: [&str; 6] = [
    "What is my wallet balance?",
    "Do I have any loans?",
    "How much have I contributed?",
    "What is my credit score?",
    "Are there open proposals?",
    "Give me a savings tip",
];

const TIPS: [&str; 4] = [
    "Contribute on the same day every period so it becomes a habit.",
    "Keep an emergency buffer in your wallet before taking a loan.",
    "Repaying loans on time raises your credit score and your next loan limit.",
    "Ask your group to park idle cash in a money market fund.",
];

/// 依序比對，第一個符合的意圖勝出
fn rules() -> &'static [(Intent, Regex)] {
    static RULES: OnceLock<Vec<(Intent, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (Intent::SavingsTips, r"(?i)\b(tips?|advice|advise|save more|how (can|do) i save)\b"),
            (Intent::Credit, r"(?i)\b(credit|score|rating)\b"),
            (Intent::Loans, r"(?i)\b(loans?|borrow\w*|repay\w*|debt|owe)\b"),
            (Intent::Balance, r"(?i)\b(balance|wallet|money|funds)\b"),
            (Intent::Contributions, r"(?i)\b(contribut\w*|savings|saved|deposit\w*)\b"),
            (Intent::Governance, r"(?i)\b(votes?|voting|proposals?|meeting)\b"),
        ]
        .into_iter()
        .filter_map(|(intent, pattern)| Regex::new(pattern).ok().map(|re| (intent, re)))
        .collect()
    })
}

pub fn classify(question: &str) -> Intent {
    rules()
        .iter()
        .find(|(_, re)| re.is_match(question))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::Help)
}

fn shillings(cents: i64) -> String {
    format!("KES {}.{:02}", cents / 100, (cents % 100).abs())
}

pub fn ask(db: &Database, user_id: Uuid, request: &AskRequest) -> Result<Answer> {
    validation::validate_non_empty_string("question", &request.question)?;
    let user = access::user(db, user_id)?;
    let intent = classify(&request.question);

    let answer = match intent {
        Intent::Balance => {
            let wallet = accounts::wallet(db, user_id)?;
            format!("Your wallet balance is {}.", shillings(wallet.balance))
        }
        Intent::Loans => {
            let open: Vec<_> = db
                .loans
                .values()
                .filter(|l| l.borrower_id == user_id && l.is_unsettled())
                .collect();
            if open.is_empty() {
                "You have no open loans.".to_string()
            } else {
                let outstanding: i64 = open.iter().map(|l| l.outstanding()).sum();
                let disbursed = open.iter().filter(|l| l.status == LoanStatus::Disbursed).count();
                format!(
                    "You have {} open loan(s), {} disbursed, with {} outstanding.",
                    open.len(),
                    disbursed,
                    shillings(outstanding)
                )
            }
        }
        Intent::Contributions => {
            let total: i64 = db
                .contributions
                .values()
                .filter(|c| c.member_id == user_id && c.status == ContributionStatus::Confirmed)
                .map(|c| c.amount)
                .sum();
            let groups = access::active_group_ids(db, user_id).len();
            format!(
                "You have contributed {} across {} group(s).",
                shillings(total),
                groups
            )
        }
        Intent::Credit => {
            let score = credit::credit_score(db, user_id)?;
            format!(
                "Your credit score is {} ({:?}).",
                score.score, score.band
            )
        }
        Intent::Governance => {
            let groups = access::active_group_ids(db, user_id);
            let open = db
                .proposals
                .values()
                .filter(|p| groups.contains(&p.group_id) && p.status == ProposalStatus::Open)
                .count();
            format!("There are {} open proposal(s) in your groups.", open)
        }
        Intent::SavingsTips => {
            // 依使用者輪替建議
            let index = user.username.len() % TIPS.len();
            TIPS[index].to_string()
        }
        Intent::Help => format!(
            "Hi {}, I can help with: {}",
            user.username,
            TOPICS.join(" | ")
        ),
    };

    Ok(Answer {
        intent,
        answer,
        suggestions: TOPICS.to_vec(),
    })
}
