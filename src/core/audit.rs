use crate::core::access;
use crate::domain::model::{AuditEntry, Database};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

pub struct AuditEvent<'a> {
    pub actor: Option<Uuid>,
    pub action: &'a str,
    pub entity: &'a str,
    pub entity_id: Uuid,
    pub group_id: Option<Uuid>,
    pub detail: String,
}

pub fn record(db: &mut Database, event: AuditEvent<'_>, now: DateTime<Utc>) {
    tracing::debug!(
        action = event.action,
        entity = event.entity,
        entity_id = %event.entity_id,
        "audit"
    );
    db.audit_log.push(AuditEntry {
        id: Uuid::new_v4(),
        actor_id: event.actor,
        action: event.action.to_string(),
        entity: event.entity.to_string(),
        entity_id: event.entity_id,
        group_id: event.group_id,
        detail: event.detail,
        at: now,
    });
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditFilter {
    pub entity: Option<String>,
    pub group: Option<Uuid>,
}

/// Staff see everything; others see their own actions plus the logs of
/// groups where they hold office. Newest first.
pub fn visible_logs(db: &Database, viewer: Uuid, filter: &AuditFilter) -> Vec<AuditEntry> {
    let is_staff = db.users.get(&viewer).map(|u| u.is_staff).unwrap_or(false);
    let office_groups: Vec<Uuid> = db
        .officials
        .values()
        .filter(|o| o.user_id == viewer)
        .map(|o| o.group_id)
        .collect();

    let mut entries: Vec<AuditEntry> = db
        .audit_log
        .iter()
        .filter(|e| {
            is_staff
                || e.actor_id == Some(viewer)
                || e.group_id.map(|g| office_groups.contains(&g)).unwrap_or(false)
        })
        .filter(|e| filter.entity.as_deref().map(|x| e.entity == x).unwrap_or(true))
        .filter(|e| filter.group.map(|g| e.group_id == Some(g)).unwrap_or(true))
        .cloned()
        .collect();
    entries.sort_by(|a, b| b.at.cmp(&a.at));
    entries
}

/// 使用者可同步的變更 (自己的動作與所屬群組的紀錄)，附上在 `audit_log` 中的位置
pub fn feed_for(
    db: &Database,
    user_id: Uuid,
) -> impl Iterator<Item = (usize, &AuditEntry)> {
    let groups = access::active_group_ids(db, user_id);
    db.audit_log.iter().enumerate().filter(move |(_, e)| {
        e.actor_id == Some(user_id) || e.group_id.map(|g| groups.contains(&g)).unwrap_or(false)
    })
}
