use crate::core::access;
use crate::core::audit::{self, AuditEvent};
use crate::domain::model::{
    Amount, ChamaGroup, ContributionFrequency, Database, GroupType, Membership, MembershipRole,
    MembershipStatus, Official, OfficialPosition,
};
use crate::utils::error::{ChamaError, Result};
use crate::utils::validation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_max_members() -> u32 {
    50
}

fn default_required_approvals() -> u32 {
    2
}

fn default_interest_rate_bps() -> u32 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub group_type: GroupType,
    pub contribution_amount: Amount,
    pub contribution_frequency: ContributionFrequency,
    #[serde(default = "default_max_members")]
    pub max_members: u32,
    #[serde(default = "default_required_approvals")]
    pub required_approvals: u32,
    #[serde(default = "default_interest_rate_bps")]
    pub loan_interest_rate_bps: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub contribution_amount: Option<Amount>,
    pub contribution_frequency: Option<ContributionFrequency>,
    pub max_members: Option<u32>,
    pub required_approvals: Option<u32>,
    pub loan_interest_rate_bps: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointOfficialRequest {
    pub user_id: Uuid,
    pub position: OfficialPosition,
}

/// 群組資料加上目前有效會員數
#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    #[serde(flatten)]
    pub group: ChamaGroup,
    pub member_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub membership_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub role: MembershipRole,
    pub status: MembershipStatus,
    pub position: Option<OfficialPosition>,
    pub joined_at: DateTime<Utc>,
}

fn view(db: &Database, group: &ChamaGroup) -> GroupView {
    GroupView {
        group: group.clone(),
        member_count: access::active_member_ids(db, group.id).len(),
    }
}

fn validate_settings(
    contribution_amount: Amount,
    max_members: u32,
    required_approvals: u32,
    loan_interest_rate_bps: u32,
) -> Result<()> {
    validation::validate_amount("contribution_amount", contribution_amount)?;
    validation::validate_range("max_members", max_members, 2, 500)?;
    validation::validate_range("required_approvals", required_approvals, 1, 3)?;
    validation::validate_range("loan_interest_rate_bps", loan_interest_rate_bps, 0, 10_000)?;
    Ok(())
}

fn ensure_unique_name(db: &Database, name: &str, exclude: Option<Uuid>) -> Result<()> {
    if db
        .groups
        .values()
        .any(|g| Some(g.id) != exclude && g.name.eq_ignore_ascii_case(name))
    {
        return Err(ChamaError::conflict("A group with that name already exists."));
    }
    Ok(())
}

pub fn create_group(
    db: &mut Database,
    actor: Uuid,
    request: CreateGroupRequest,
    now: DateTime<Utc>,
) -> Result<GroupView> {
    access::user(db, actor)?;
    let name = request.name.trim().to_string();
    validation::validate_non_empty_string("name", &name)?;
    validate_settings(
        request.contribution_amount,
        request.max_members,
        request.required_approvals,
        request.loan_interest_rate_bps,
    )?;
    ensure_unique_name(db, &name, None)?;

    let group = ChamaGroup {
        id: Uuid::new_v4(),
        name,
        description: request.description.trim().to_string(),
        group_type: request.group_type,
        contribution_amount: request.contribution_amount,
        contribution_frequency: request.contribution_frequency,
        max_members: request.max_members,
        required_approvals: request.required_approvals,
        loan_interest_rate_bps: request.loan_interest_rate_bps,
        created_by: actor,
        is_active: true,
        created_at: now,
    };
    let membership = Membership {
        id: Uuid::new_v4(),
        group_id: group.id,
        user_id: actor,
        role: MembershipRole::Official,
        status: MembershipStatus::Active,
        joined_at: now,
    };
    let chair = Official {
        id: Uuid::new_v4(),
        group_id: group.id,
        user_id: actor,
        position: OfficialPosition::Chairperson,
        appointed_at: now,
    };
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "create",
            entity: "group",
            entity_id: group.id,
            group_id: Some(group.id),
            detail: format!("name={}", group.name),
        },
        now,
    );
    db.memberships.insert(membership.id, membership);
    db.officials.insert(chair.id, chair);
    db.groups.insert(group.id, group.clone());
    Ok(view(db, &group))
}

/// `mine` 只列出自己所屬 (非退出) 的群組
pub fn list_groups(db: &Database, viewer: Uuid, mine: bool) -> Vec<GroupView> {
    let mut groups: Vec<GroupView> = db
        .groups
        .values()
        .filter(|g| {
            if mine {
                access::membership(db, g.id, viewer).is_some()
            } else {
                g.is_active
            }
        })
        .map(|g| view(db, g))
        .collect();
    groups.sort_by(|a, b| a.group.name.cmp(&b.group.name));
    groups
}

pub fn get_group(db: &Database, group_id: Uuid) -> Result<GroupView> {
    let group = access::group(db, group_id)?;
    Ok(view(db, group))
}

pub fn update_group(
    db: &mut Database,
    actor: Uuid,
    group_id: Uuid,
    request: UpdateGroupRequest,
    now: DateTime<Utc>,
) -> Result<GroupView> {
    access::active_group(db, group_id)?;
    access::require_official(db, group_id, actor)?;

    let mut updated = access::group(db, group_id)?.clone();
    if let Some(name) = request.name {
        let name = name.trim().to_string();
        validation::validate_non_empty_string("name", &name)?;
        ensure_unique_name(db, &name, Some(group_id))?;
        updated.name = name;
    }
    if let Some(description) = request.description {
        updated.description = description.trim().to_string();
    }
    if let Some(amount) = request.contribution_amount {
        updated.contribution_amount = amount;
    }
    if let Some(frequency) = request.contribution_frequency {
        updated.contribution_frequency = frequency;
    }
    if let Some(max_members) = request.max_members {
        let active = access::active_member_ids(db, group_id).len() as u32;
        if max_members < active {
            return Err(ChamaError::validation(
                "max_members",
                format!("The group already has {} active members", active),
            ));
        }
        updated.max_members = max_members;
    }
    if let Some(required) = request.required_approvals {
        updated.required_approvals = required;
    }
    if let Some(rate) = request.loan_interest_rate_bps {
        updated.loan_interest_rate_bps = rate;
    }
    validate_settings(
        updated.contribution_amount,
        updated.max_members,
        updated.required_approvals,
        updated.loan_interest_rate_bps,
    )?;

    db.groups.insert(group_id, updated.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "update",
            entity: "group",
            entity_id: group_id,
            group_id: Some(group_id),
            detail: String::new(),
        },
        now,
    );
    Ok(view(db, &updated))
}

pub fn deactivate_group(
    db: &mut Database,
    actor: Uuid,
    group_id: Uuid,
    now: DateTime<Utc>,
) -> Result<GroupView> {
    access::active_group(db, group_id)?;
    access::require_position(db, group_id, actor, &[OfficialPosition::Chairperson])?;
    let has_open_loans = db
        .loans
        .values()
        .any(|l| l.group_id == group_id && l.is_unsettled());
    if has_open_loans {
        return Err(ChamaError::invalid_state(
            "Settle all open loans before deactivating the group",
        ));
    }
    if let Some(group) = db.groups.get_mut(&group_id) {
        group.is_active = false;
    }
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "deactivate",
            entity: "group",
            entity_id: group_id,
            group_id: Some(group_id),
            detail: String::new(),
        },
        now,
    );
    get_group(db, group_id)
}

pub fn join_group(
    db: &mut Database,
    actor: Uuid,
    group_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Membership> {
    access::user(db, actor)?;
    let group = access::active_group(db, group_id)?;
    let max_members = group.max_members as usize;
    if access::membership(db, group_id, actor).is_some() {
        return Err(ChamaError::conflict(
            "You already have a membership in this group",
        ));
    }
    if access::active_member_ids(db, group_id).len() >= max_members {
        return Err(ChamaError::invalid_state("This group is full"));
    }

    let membership = Membership {
        id: Uuid::new_v4(),
        group_id,
        user_id: actor,
        role: MembershipRole::Member,
        status: MembershipStatus::Pending,
        joined_at: now,
    };
    db.memberships.insert(membership.id, membership.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "join",
            entity: "membership",
            entity_id: membership.id,
            group_id: Some(group_id),
            detail: String::new(),
        },
        now,
    );
    Ok(membership)
}

fn membership_in_group(db: &Database, group_id: Uuid, membership_id: Uuid) -> Result<Membership> {
    db.memberships
        .get(&membership_id)
        .filter(|m| m.group_id == group_id)
        .cloned()
        .ok_or_else(|| ChamaError::not_found("Membership", membership_id))
}

fn set_membership_status(
    db: &mut Database,
    membership_id: Uuid,
    status: MembershipStatus,
) {
    if let Some(m) = db.memberships.get_mut(&membership_id) {
        m.status = status;
    }
}

pub fn approve_membership(
    db: &mut Database,
    actor: Uuid,
    group_id: Uuid,
    membership_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Membership> {
    let group = access::active_group(db, group_id)?;
    let max_members = group.max_members as usize;
    access::require_official(db, group_id, actor)?;
    let membership = membership_in_group(db, group_id, membership_id)?;
    if !matches!(
        membership.status,
        MembershipStatus::Pending | MembershipStatus::Suspended
    ) {
        return Err(ChamaError::invalid_state(format!(
            "Cannot approve a membership that is {:?}",
            membership.status
        )));
    }
    if access::active_member_ids(db, group_id).len() >= max_members {
        return Err(ChamaError::invalid_state("This group is full"));
    }

    set_membership_status(db, membership_id, MembershipStatus::Active);
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "approve",
            entity: "membership",
            entity_id: membership_id,
            group_id: Some(group_id),
            detail: format!("user={}", membership.user_id),
        },
        now,
    );
    membership_in_group(db, group_id, membership_id)
}

pub fn suspend_membership(
    db: &mut Database,
    actor: Uuid,
    group_id: Uuid,
    membership_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Membership> {
    access::require_official(db, group_id, actor)?;
    let membership = membership_in_group(db, group_id, membership_id)?;
    if membership.status != MembershipStatus::Active {
        return Err(ChamaError::invalid_state(
            "Only active memberships can be suspended",
        ));
    }
    if access::position_of(db, group_id, membership.user_id).is_some() {
        return Err(ChamaError::invalid_state(
            "Officials must be removed from office before suspension",
        ));
    }

    set_membership_status(db, membership_id, MembershipStatus::Suspended);
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "suspend",
            entity: "membership",
            entity_id: membership_id,
            group_id: Some(group_id),
            detail: format!("user={}", membership.user_id),
        },
        now,
    );
    membership_in_group(db, group_id, membership_id)
}

pub fn leave_group(db: &mut Database, actor: Uuid, group_id: Uuid, now: DateTime<Utc>) -> Result<()> {
    access::group(db, group_id)?;
    let membership = access::membership(db, group_id, actor)
        .cloned()
        .ok_or_else(|| ChamaError::forbidden("You are not a member of this group"))?;
    if access::position_of(db, group_id, actor) == Some(OfficialPosition::Chairperson) {
        return Err(ChamaError::invalid_state(
            "The chairperson cannot leave the group",
        ));
    }
    let has_open_loan = db
        .loans
        .values()
        .any(|l| l.group_id == group_id && l.borrower_id == actor && l.is_unsettled());
    if has_open_loan {
        return Err(ChamaError::invalid_state(
            "Repay your outstanding loan before leaving the group",
        ));
    }

    db.officials
        .retain(|_, o| !(o.group_id == group_id && o.user_id == actor));
    set_membership_status(db, membership.id, MembershipStatus::Exited);
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "leave",
            entity: "membership",
            entity_id: membership.id,
            group_id: Some(group_id),
            detail: String::new(),
        },
        now,
    );
    Ok(())
}

/// 會員可看到全部會員；非會員不可
pub fn list_members(db: &Database, viewer: Uuid, group_id: Uuid) -> Result<Vec<MemberView>> {
    access::group(db, group_id)?;
    if access::membership(db, group_id, viewer).is_none() && !access::user(db, viewer)?.is_staff {
        return Err(ChamaError::forbidden("You are not a member of this group"));
    }
    let mut members: Vec<MemberView> = db
        .memberships
        .values()
        .filter(|m| m.group_id == group_id && m.status != MembershipStatus::Exited)
        .map(|m| MemberView {
            membership_id: m.id,
            user_id: m.user_id,
            username: db
                .users
                .get(&m.user_id)
                .map(|u| u.username.clone())
                .unwrap_or_default(),
            role: m.role,
            status: m.status,
            position: access::position_of(db, group_id, m.user_id),
            joined_at: m.joined_at,
        })
        .collect();
    members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
    Ok(members)
}

pub fn list_officials(db: &Database, group_id: Uuid) -> Result<Vec<Official>> {
    access::group(db, group_id)?;
    let mut officials: Vec<Official> = db
        .officials
        .values()
        .filter(|o| o.group_id == group_id)
        .cloned()
        .collect();
    officials.sort_by_key(|o| o.appointed_at);
    Ok(officials)
}

pub fn appoint_official(
    db: &mut Database,
    actor: Uuid,
    group_id: Uuid,
    request: AppointOfficialRequest,
    now: DateTime<Utc>,
) -> Result<Official> {
    access::active_group(db, group_id)?;
    access::require_position(db, group_id, actor, &[OfficialPosition::Chairperson])?;
    if request.position == OfficialPosition::Chairperson {
        return Err(ChamaError::validation(
            "position",
            "The chairperson office cannot be reassigned",
        ));
    }
    if !access::is_active_member(db, group_id, request.user_id) {
        return Err(ChamaError::validation(
            "user_id",
            "Only active members can hold office",
        ));
    }
    if access::holder_of(db, group_id, request.position).is_some() {
        return Err(ChamaError::conflict(format!(
            "The {:?} office is already held",
            request.position
        )));
    }
    if access::position_of(db, group_id, request.user_id).is_some() {
        return Err(ChamaError::conflict("This member already holds an office"));
    }

    let official = Official {
        id: Uuid::new_v4(),
        group_id,
        user_id: request.user_id,
        position: request.position,
        appointed_at: now,
    };
    db.officials.insert(official.id, official.clone());
    if let Some(m) = db
        .memberships
        .values_mut()
        .find(|m| m.group_id == group_id && m.user_id == request.user_id && m.status == MembershipStatus::Active)
    {
        m.role = MembershipRole::Official;
    }
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "appoint",
            entity: "official",
            entity_id: official.id,
            group_id: Some(group_id),
            detail: format!("user={} position={:?}", request.user_id, request.position),
        },
        now,
    );
    Ok(official)
}

pub fn remove_official(
    db: &mut Database,
    actor: Uuid,
    group_id: Uuid,
    official_id: Uuid,
    now: DateTime<Utc>,
) -> Result<()> {
    access::require_position(db, group_id, actor, &[OfficialPosition::Chairperson])?;
    let official = db
        .officials
        .get(&official_id)
        .filter(|o| o.group_id == group_id)
        .cloned()
        .ok_or_else(|| ChamaError::not_found("Official", official_id))?;
    if official.position == OfficialPosition::Chairperson {
        return Err(ChamaError::invalid_state(
            "The chairperson office cannot be vacated",
        ));
    }

    db.officials.remove(&official_id);
    if let Some(m) = db
        .memberships
        .values_mut()
        .find(|m| m.group_id == group_id && m.user_id == official.user_id && m.status != MembershipStatus::Exited)
    {
        m.role = MembershipRole::Member;
    }
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "remove",
            entity: "official",
            entity_id: official_id,
            group_id: Some(group_id),
            detail: format!("user={}", official.user_id),
        },
        now,
    );
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::accounts::tests::register_user;

    pub(crate) fn create_test_group(db: &mut Database, chair: Uuid, name: &str) -> Uuid {
        create_group(
            db,
            chair,
            CreateGroupRequest {
                name: name.to_string(),
                description: String::new(),
                group_type: GroupType::Savings,
                contribution_amount: 100_000,
                contribution_frequency: ContributionFrequency::Monthly,
                max_members: 50,
                required_approvals: 2,
                loan_interest_rate_bps: 1000,
            },
            Utc::now(),
        )
        .unwrap()
        .group
        .id
    }

    /// 加入並核准，回傳 membership id
    pub(crate) fn add_member(db: &mut Database, group_id: Uuid, chair: Uuid, user: Uuid) -> Uuid {
        let membership = join_group(db, user, group_id, Utc::now()).unwrap();
        approve_membership(db, chair, group_id, membership.id, Utc::now()).unwrap();
        membership.id
    }

    #[test]
    fn test_creator_becomes_chairperson() {
        let mut db = Database::default();
        let chair = register_user(&mut db, "chair", "0711000001");
        let group_id = create_test_group(&mut db, chair, "Umoja");

        assert_eq!(
            access::position_of(&db, group_id, chair),
            Some(OfficialPosition::Chairperson)
        );
        assert!(access::is_active_member(&db, group_id, chair));
        assert_eq!(get_group(&db, group_id).unwrap().member_count, 1);
    }

    #[test]
    fn test_group_names_are_unique() {
        let mut db = Database::default();
        let chair = register_user(&mut db, "chair", "0711000001");
        create_test_group(&mut db, chair, "Umoja");

        let err = create_group(
            &mut db,
            chair,
            CreateGroupRequest {
                name: "umoja".to_string(),
                description: String::new(),
                group_type: GroupType::Welfare,
                contribution_amount: 50_000,
                contribution_frequency: ContributionFrequency::Weekly,
                max_members: 10,
                required_approvals: 1,
                loan_interest_rate_bps: 0,
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, ChamaError::Conflict { .. }));
    }

    #[test]
    fn test_join_requires_approval_and_rejects_duplicates() {
        let mut db = Database::default();
        let chair = register_user(&mut db, "chair", "0711000001");
        let member = register_user(&mut db, "member", "0711000002");
        let group_id = create_test_group(&mut db, chair, "Umoja");

        let pending = join_group(&mut db, member, group_id, Utc::now()).unwrap();
        assert_eq!(pending.status, MembershipStatus::Pending);
        assert!(!access::is_active_member(&db, group_id, member));
        assert!(join_group(&mut db, member, group_id, Utc::now()).is_err());

        // 一般會員不能核准
        assert!(approve_membership(&mut db, member, group_id, pending.id, Utc::now()).is_err());
        approve_membership(&mut db, chair, group_id, pending.id, Utc::now()).unwrap();
        assert!(access::is_active_member(&db, group_id, member));
    }

    #[test]
    fn test_full_group_rejects_join() {
        let mut db = Database::default();
        let chair = register_user(&mut db, "chair", "0711000001");
        let a = register_user(&mut db, "member_a", "0711000002");
        let b = register_user(&mut db, "member_b", "0711000003");
        let group_id = create_test_group(&mut db, chair, "Small");
        update_group(
            &mut db,
            chair,
            group_id,
            UpdateGroupRequest {
                max_members: Some(2),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();

        add_member(&mut db, group_id, chair, a);
        let err = join_group(&mut db, b, group_id, Utc::now()).unwrap_err();
        assert!(matches!(err, ChamaError::InvalidState { .. }));
    }

    #[test]
    fn test_appoint_and_remove_official() {
        let mut db = Database::default();
        let chair = register_user(&mut db, "chair", "0711000001");
        let member = register_user(&mut db, "treasurer", "0711000002");
        let group_id = create_test_group(&mut db, chair, "Umoja");
        add_member(&mut db, group_id, chair, member);

        let official = appoint_official(
            &mut db,
            chair,
            group_id,
            AppointOfficialRequest {
                user_id: member,
                position: OfficialPosition::Treasurer,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(
            access::position_of(&db, group_id, member),
            Some(OfficialPosition::Treasurer)
        );

        // 同一職位只能一人
        let other = register_user(&mut db, "other", "0711000003");
        add_member(&mut db, group_id, chair, other);
        assert!(appoint_official(
            &mut db,
            chair,
            group_id,
            AppointOfficialRequest {
                user_id: other,
                position: OfficialPosition::Treasurer,
            },
            Utc::now(),
        )
        .is_err());

        remove_official(&mut db, chair, group_id, official.id, Utc::now()).unwrap();
        assert_eq!(access::position_of(&db, group_id, member), None);
    }

    #[test]
    fn test_chairperson_cannot_leave_and_officials_cannot_be_suspended() {
        let mut db = Database::default();
        let chair = register_user(&mut db, "chair", "0711000001");
        let group_id = create_test_group(&mut db, chair, "Umoja");

        assert!(leave_group(&mut db, chair, group_id, Utc::now()).is_err());
        let chair_membership = access::membership(&db, group_id, chair).unwrap().id;
        assert!(suspend_membership(&mut db, chair, group_id, chair_membership, Utc::now()).is_err());
    }

    #[test]
    fn test_member_can_leave() {
        let mut db = Database::default();
        let chair = register_user(&mut db, "chair", "0711000001");
        let member = register_user(&mut db, "member", "0711000002");
        let group_id = create_test_group(&mut db, chair, "Umoja");
        add_member(&mut db, group_id, chair, member);

        leave_group(&mut db, member, group_id, Utc::now()).unwrap();
        assert!(access::membership(&db, group_id, member).is_none());
        assert!(list_groups(&db, member, true).is_empty());
    }
}
