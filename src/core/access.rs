//! Lookups and permission checks shared by the business modules.

use crate::domain::model::{
    ChamaGroup, Database, Membership, MembershipStatus, OfficialPosition, User,
};
use crate::utils::error::{ChamaError, Result};
use uuid::Uuid;

pub fn user(db: &Database, user_id: Uuid) -> Result<&User> {
    db.users
        .get(&user_id)
        .ok_or_else(|| ChamaError::not_found("User", user_id))
}

pub fn group(db: &Database, group_id: Uuid) -> Result<&ChamaGroup> {
    db.groups
        .get(&group_id)
        .ok_or_else(|| ChamaError::not_found("Group", group_id))
}

pub fn active_group(db: &Database, group_id: Uuid) -> Result<&ChamaGroup> {
    let group = group(db, group_id)?;
    if !group.is_active {
        return Err(ChamaError::invalid_state("This group has been deactivated"));
    }
    Ok(group)
}

/// 目前 (非退出) 的會員資格
pub fn membership(db: &Database, group_id: Uuid, user_id: Uuid) -> Option<&Membership> {
    db.memberships
        .values()
        .find(|m| m.group_id == group_id && m.user_id == user_id && m.status != MembershipStatus::Exited)
}

pub fn is_active_member(db: &Database, group_id: Uuid, user_id: Uuid) -> bool {
    membership(db, group_id, user_id)
        .map(|m| m.status == MembershipStatus::Active)
        .unwrap_or(false)
}

pub fn require_active_member(db: &Database, group_id: Uuid, user_id: Uuid) -> Result<()> {
    group(db, group_id)?;
    if !is_active_member(db, group_id, user_id) {
        return Err(ChamaError::forbidden(
            "You must be an active member of this group",
        ));
    }
    Ok(())
}

pub fn position_of(db: &Database, group_id: Uuid, user_id: Uuid) -> Option<OfficialPosition> {
    db.officials
        .values()
        .find(|o| o.group_id == group_id && o.user_id == user_id)
        .map(|o| o.position)
}

pub fn holder_of(db: &Database, group_id: Uuid, position: OfficialPosition) -> Option<Uuid> {
    db.officials
        .values()
        .find(|o| o.group_id == group_id && o.position == position)
        .map(|o| o.user_id)
}

pub fn require_official(db: &Database, group_id: Uuid, user_id: Uuid) -> Result<OfficialPosition> {
    require_active_member(db, group_id, user_id)?;
    position_of(db, group_id, user_id)
        .ok_or_else(|| ChamaError::forbidden("Only group officials can do this"))
}

pub fn require_position(
    db: &Database,
    group_id: Uuid,
    user_id: Uuid,
    allowed: &[OfficialPosition],
) -> Result<OfficialPosition> {
    let position = require_official(db, group_id, user_id)?;
    if !allowed.contains(&position) {
        let names: Vec<String> = allowed
            .iter()
            .map(|p| format!("{:?}", p).to_lowercase())
            .collect();
        return Err(ChamaError::forbidden(format!(
            "Only the {} can do this",
            names.join(" or ")
        )));
    }
    Ok(position)
}

pub fn require_staff(db: &Database, user_id: Uuid) -> Result<()> {
    if !user(db, user_id)?.is_staff {
        return Err(ChamaError::forbidden("Staff access required"));
    }
    Ok(())
}

/// 使用者為有效會員的群組
pub fn active_group_ids(db: &Database, user_id: Uuid) -> Vec<Uuid> {
    db.memberships
        .values()
        .filter(|m| m.user_id == user_id && m.status == MembershipStatus::Active)
        .map(|m| m.group_id)
        .collect()
}

pub fn active_member_ids(db: &Database, group_id: Uuid) -> Vec<Uuid> {
    db.memberships
        .values()
        .filter(|m| m.group_id == group_id && m.status == MembershipStatus::Active)
        .map(|m| m.user_id)
        .collect()
}
