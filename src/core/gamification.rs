use crate::core::{access, education};
use crate::domain::model::{ContributionStatus, Database, KycStatus, LoanStatus};
use crate::utils::error::Result;
use serde::Serialize;
use uuid::Uuid;

const POINTS_CONTRIBUTION: u64 = 10;
const POINTS_REPAID_LOAN: u64 = 50;
const POINTS_ON_TIME_REPAYMENT: u64 = 5;
const POINTS_VOTE: u64 = 2;
const POINTS_PROPOSAL: u64 = 5;
const POINTS_KYC: u64 = 25;
const POINTS_LESSON: u64 = 15;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Activity {
    pub contributions: u64,
    pub repaid_loans: u64,
    pub on_time_repayments: u64,
    pub votes: u64,
    pub proposals: u64,
    pub kyc_verified: bool,
    pub lessons: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Badge {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameProfile {
    pub user_id: Uuid,
    pub username: String,
    pub points: u64,
    pub level: u64,
    pub badges: Vec<Badge>,
    pub activity: Activity,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: Uuid,
    pub username: String,
    pub points: u64,
    pub level: u64,
}

/// Contributions counted here are scoped to `group` when one is given.
fn activity(db: &Database, user_id: Uuid, group: Option<Uuid>) -> Activity {
    let in_scope = |g: Uuid| group.map(|x| x == g).unwrap_or(true);
    let mut a = Activity {
        contributions: db
            .contributions
            .values()
            .filter(|c| {
                c.member_id == user_id
                    && c.status == ContributionStatus::Confirmed
                    && in_scope(c.group_id)
            })
            .count() as u64,
        votes: db.votes.iter().filter(|v| v.voter_id == user_id).count() as u64,
        proposals: db
            .proposals
            .values()
            .filter(|p| p.created_by == user_id && in_scope(p.group_id))
            .count() as u64,
        kyc_verified: db
            .users
            .get(&user_id)
            .map(|u| u.kyc_status == KycStatus::Verified)
            .unwrap_or(false),
        lessons: education::completed_count(db, user_id) as u64,
        ..Default::default()
    };
    for loan in db
        .loans
        .values()
        .filter(|l| l.borrower_id == user_id && in_scope(l.group_id))
    {
        if loan.status == LoanStatus::Repaid {
            a.repaid_loans += 1;
        }
        a.on_time_repayments += loan.repayments.iter().filter(|r| r.on_time).count() as u64;
    }
    a
}

pub fn points(a: &Activity) -> u64 {
    a.contributions * POINTS_CONTRIBUTION
        + a.repaid_loans * POINTS_REPAID_LOAN
        + a.on_time_repayments * POINTS_ON_TIME_REPAYMENT
        + a.votes * POINTS_VOTE
        + a.proposals * POINTS_PROPOSAL
        + if a.kyc_verified { POINTS_KYC } else { 0 }
        + a.lessons * POINTS_LESSON
}

pub fn level(points: u64) -> u64 {
    points / 100 + 1
}

pub fn badges(a: &Activity) -> Vec<Badge> {
    let rules: [(bool, &'static str, &'static str); 6] = [
        (a.contributions >= 1, "First Contribution", "Made your first confirmed contribution"),
        (a.contributions >= 12, "Consistent Saver", "Twelve confirmed contributions"),
        (a.repaid_loans >= 1, "Debt Free", "Repaid a loan in full"),
        (a.votes >= 5, "Civic Voice", "Voted on five proposals"),
        (a.kyc_verified, "Verified", "Identity verified"),
        (a.lessons >= 3, "Scholar", "Completed three lessons"),
    ];
    rules
        .into_iter()
        .filter(|(earned, _, _)| *earned)
        .map(|(_, name, description)| Badge { name, description })
        .collect()
}

pub fn profile(db: &Database, user_id: Uuid) -> Result<GameProfile> {
    let user = access::user(db, user_id)?;
    let activity = activity(db, user_id, None);
    let points = points(&activity);
    Ok(GameProfile {
        user_id,
        username: user.username.clone(),
        points,
        level: level(points),
        badges: badges(&activity),
        activity,
    })
}

pub fn group_leaderboard(db: &Database, viewer: Uuid, group_id: Uuid) -> Result<Vec<LeaderboardEntry>> {
    access::require_active_member(db, group_id, viewer)?;
    let mut scored: Vec<(Uuid, String, u64)> = access::active_member_ids(db, group_id)
        .into_iter()
        .map(|id| {
            let username = db
                .users
                .get(&id)
                .map(|u| u.username.clone())
                .unwrap_or_default();
            (id, username, points(&activity(db, id, Some(group_id))))
        })
        .collect();
    scored.sort_by(|a, b| b.2.cmp(&a.2).then(a.1.cmp(&b.1)));
    Ok(scored
        .into_iter()
        .enumerate()
        .map(|(i, (user_id, username, points))| LeaderboardEntry {
            rank: i + 1,
            user_id,
            username,
            points,
            level: level(points),
        })
        .collect())
}
