use crate::core::access;
use crate::core::audit::{self, AuditEvent};
use crate::domain::model::{
    Database, Proposal, ProposalStatus, Vote, VoteChoice, VotingType,
};
use crate::utils::error::{ChamaError, Result};
use crate::utils::validation;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_quorum() -> u32 {
    50
}

fn default_duration_hours() -> i64 {
    72
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProposalRequest {
    pub group_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub voting_type: VotingType,
    #[serde(default = "default_quorum")]
    pub quorum_percent: u32,
    #[serde(default = "default_duration_hours")]
    pub duration_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CastVoteRequest {
    pub choice: VoteChoice,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Tally {
    pub yes: u32,
    pub no: u32,
    pub abstain: u32,
    pub cast: u32,
    pub eligible: u32,
    pub quorum_met: bool,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalResults {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub tally: Tally,
}

/// 計票規則: 先看法定人數，再依投票類型判定
pub fn tally(
    voting_type: VotingType,
    quorum_percent: u32,
    eligible: u32,
    votes: impl IntoIterator<Item = VoteChoice>,
) -> Tally {
    let (mut yes, mut no, mut abstain) = (0u32, 0u32, 0u32);
    for choice in votes {
        match choice {
            VoteChoice::Yes => yes += 1,
            VoteChoice::No => no += 1,
            VoteChoice::Abstain => abstain += 1,
        }
    }
    let cast = yes + no + abstain;
    let quorum_met = eligible > 0 && cast as u64 * 100 >= eligible as u64 * quorum_percent as u64;
    let decided = match voting_type {
        VotingType::Simple => yes > no,
        VotingType::TwoThirds => yes > 0 && yes * 3 >= (yes + no) * 2,
        VotingType::Unanimous => yes > 0 && yes == cast,
    };
    Tally {
        yes,
        no,
        abstain,
        cast,
        eligible,
        quorum_met,
        passed: quorum_met && decided,
    }
}

fn find_proposal(db: &Database, proposal_id: Uuid) -> Result<Proposal> {
    db.proposals
        .get(&proposal_id)
        .cloned()
        .ok_or_else(|| ChamaError::not_found("Proposal", proposal_id))
}

fn current_tally(db: &Database, proposal: &Proposal) -> Tally {
    let eligible = access::active_member_ids(db, proposal.group_id).len() as u32;
    tally(
        proposal.voting_type,
        proposal.quorum_percent,
        eligible,
        db.votes
            .iter()
            .filter(|v| v.proposal_id == proposal.id)
            .map(|v| v.choice),
    )
}

pub fn create_proposal(
    db: &mut Database,
    actor: Uuid,
    request: CreateProposalRequest,
    now: DateTime<Utc>,
) -> Result<Proposal> {
    access::active_group(db, request.group_id)?;
    access::require_active_member(db, request.group_id, actor)?;
    let title = request.title.trim().to_string();
    validation::validate_non_empty_string("title", &title)?;
    validation::validate_range("quorum_percent", request.quorum_percent, 1, 100)?;
    validation::validate_range("duration_hours", request.duration_hours, 1, 24 * 30)?;

    let proposal = Proposal {
        id: Uuid::new_v4(),
        group_id: request.group_id,
        title,
        description: request.description.trim().to_string(),
        voting_type: request.voting_type,
        quorum_percent: request.quorum_percent,
        status: ProposalStatus::Open,
        created_by: actor,
        created_at: now,
        closes_at: now + Duration::hours(request.duration_hours),
        closed_at: None,
    };
    db.proposals.insert(proposal.id, proposal.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "create",
            entity: "proposal",
            entity_id: proposal.id,
            group_id: Some(proposal.group_id),
            detail: format!("voting_type={:?}", proposal.voting_type),
        },
        now,
    );
    Ok(proposal)
}

pub fn list_proposals(
    db: &Database,
    viewer: Uuid,
    group_id: Option<Uuid>,
    status: Option<ProposalStatus>,
) -> Result<Vec<Proposal>> {
    let groups = match group_id {
        Some(g) => {
            access::require_active_member(db, g, viewer)?;
            vec![g]
        }
        None => access::active_group_ids(db, viewer),
    };
    let mut proposals: Vec<Proposal> = db
        .proposals
        .values()
        .filter(|p| groups.contains(&p.group_id))
        .filter(|p| status.map(|s| p.status == s).unwrap_or(true))
        .cloned()
        .collect();
    proposals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(proposals)
}

pub fn cast_vote(
    db: &mut Database,
    actor: Uuid,
    proposal_id: Uuid,
    request: CastVoteRequest,
    now: DateTime<Utc>,
) -> Result<Vote> {
    let proposal = find_proposal(db, proposal_id)?;
    access::require_active_member(db, proposal.group_id, actor)?;
    if proposal.status != ProposalStatus::Open || now >= proposal.closes_at {
        return Err(ChamaError::invalid_state("Voting on this proposal has closed"));
    }
    if db
        .votes
        .iter()
        .any(|v| v.proposal_id == proposal_id && v.voter_id == actor)
    {
        return Err(ChamaError::conflict("You have already voted on this proposal"));
    }

    let vote = Vote {
        id: Uuid::new_v4(),
        proposal_id,
        voter_id: actor,
        choice: request.choice,
        cast_at: now,
    };
    db.votes.push(vote.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "vote",
            entity: "proposal",
            entity_id: proposal_id,
            group_id: Some(proposal.group_id),
            detail: format!("choice={:?}", request.choice),
        },
        now,
    );
    Ok(vote)
}

pub fn results(db: &Database, viewer: Uuid, proposal_id: Uuid) -> Result<ProposalResults> {
    let proposal = find_proposal(db, proposal_id)?;
    access::require_active_member(db, proposal.group_id, viewer)?;
    let tally = current_tally(db, &proposal);
    Ok(ProposalResults { proposal, tally })
}

/// 建立者或幹部可隨時結束，其他會員需等到截止時間
pub fn close_proposal(
    db: &mut Database,
    actor: Uuid,
    proposal_id: Uuid,
    now: DateTime<Utc>,
) -> Result<ProposalResults> {
    let mut proposal = find_proposal(db, proposal_id)?;
    access::require_active_member(db, proposal.group_id, actor)?;
    if proposal.status != ProposalStatus::Open {
        return Err(ChamaError::invalid_state("This proposal is already closed"));
    }
    let privileged = proposal.created_by == actor
        || access::position_of(db, proposal.group_id, actor).is_some();
    if !privileged && now < proposal.closes_at {
        return Err(ChamaError::forbidden(
            "Only the creator or an official can close a proposal before it expires",
        ));
    }

    let tally = current_tally(db, &proposal);
    proposal.status = if tally.passed {
        ProposalStatus::Passed
    } else {
        ProposalStatus::Rejected
    };
    proposal.closed_at = Some(now);
    db.proposals.insert(proposal.id, proposal.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "close",
            entity: "proposal",
            entity_id: proposal.id,
            group_id: Some(proposal.group_id),
            detail: format!(
                "status={:?} yes={} no={} abstain={}",
                proposal.status, tally.yes, tally.no, tally.abstain
            ),
        },
        now,
    );
    Ok(ProposalResults { proposal, tally })
}
