use crate::core::audit;
use crate::domain::model::{AuditEntry, Database};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_CHANGES: usize = 500;

/// `since` 只用於第一次同步；之後帶回 `next_cursor`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangesQuery {
    pub since: Option<DateTime<Utc>>,
    pub cursor: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeSet {
    pub server_time: DateTime<Utc>,
    pub changes: Vec<AuditEntry>,
    pub has_more: bool,
    /// `audit_log` 只會附加，位置可作為不受同時間戳影響的游標
    pub next_cursor: usize,
}

pub fn changes(
    db: &Database,
    user_id: Uuid,
    query: &ChangesQuery,
    now: DateTime<Utc>,
) -> ChangeSet {
    let start = query.cursor.unwrap_or(0);
    let mut pending = audit::feed_for(db, user_id)
        .filter(|(index, _)| *index >= start)
        .filter(|(_, e)| query.since.map(|since| e.at > since).unwrap_or(true));

    let mut entries = Vec::new();
    let mut next_cursor = db.audit_log.len().max(start);
    for (index, entry) in pending.by_ref().take(MAX_CHANGES) {
        next_cursor = index + 1;
        entries.push(entry.clone());
    }
    let has_more = pending.next().is_some();
    if !has_more {
        next_cursor = db.audit_log.len().max(start);
    }
    ChangeSet {
        server_time: now,
        changes: entries,
        has_more,
        next_cursor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit::AuditEvent;
    use crate::core::finance::tests::fixture;

    #[test]
    fn test_changes_since_filter() {
        let f = fixture();
        let all = changes(&f.db, f.member, &ChangesQuery::default(), Utc::now());
        assert!(!all.changes.is_empty());
        assert!(!all.has_more);
        assert!(all.changes.windows(2).all(|w| w[0].at <= w[1].at));
        assert_eq!(all.next_cursor, f.db.audit_log.len());

        let none = changes(
            &f.db,
            f.member,
            &ChangesQuery {
                since: None,
                cursor: Some(all.next_cursor),
            },
            Utc::now(),
        );
        assert!(none.changes.is_empty());

        let later = changes(
            &f.db,
            f.member,
            &ChangesQuery {
                since: all.changes.last().map(|e| e.at),
                cursor: None,
            },
            Utc::now(),
        );
        assert!(later.changes.is_empty());
    }

    #[test]
    fn test_resuming_across_a_batch_of_identical_timestamps() {
        let mut f = fixture();
        let at = Utc::now();
        for _ in 0..600 {
            audit::record(
                &mut f.db,
                AuditEvent {
                    actor: None,
                    action: "default",
                    entity: "loan",
                    entity_id: Uuid::new_v4(),
                    group_id: Some(f.group_id),
                    detail: String::new(),
                },
                at,
            );
        }

        let visible = audit::feed_for(&f.db, f.member).count();
        assert!(visible > MAX_CHANGES && visible <= 2 * MAX_CHANGES);

        let mut received = 0;
        let mut query = ChangesQuery::default();
        let mut rounds = 0;
        loop {
            let set = changes(&f.db, f.member, &query, Utc::now());
            assert!(set.changes.len() <= MAX_CHANGES);
            received += set.changes.len();
            rounds += 1;
            if !set.has_more {
                break;
            }
            query.cursor = Some(set.next_cursor);
        }
        assert_eq!(rounds, 2);
        assert_eq!(received, visible);
    }

    #[test]
    fn test_outsiders_see_only_their_own_actions() {
        let mut f = fixture();
        let outsider =
            crate::core::accounts::tests::register_user(&mut f.db, "outsider", "0711000009");
        let set = changes(&f.db, outsider, &ChangesQuery::default(), Utc::now());
        assert_eq!(set.changes.len(), 1);
        assert_eq!(set.changes[0].action, "register");
    }
}
