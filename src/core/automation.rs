use crate::core::access;
use crate::core::audit::{self, AuditEvent};
use crate::domain::model::{
    AutomationRule, ContributionStatus, Database, LoanStatus, Notification, RuleKind,
};
use crate::utils::error::{ChamaError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRuleRequest {
    pub group_id: Uuid,
    pub kind: RuleKind,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToggleRuleRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RunReport {
    pub group_id: Uuid,
    pub rules_run: usize,
    pub reminders_sent: usize,
    pub loans_defaulted: usize,
}

pub fn create_rule(
    db: &mut Database,
    actor: Uuid,
    request: CreateRuleRequest,
    now: DateTime<Utc>,
) -> Result<AutomationRule> {
    access::active_group(db, request.group_id)?;
    access::require_official(db, request.group_id, actor)?;
    if db
        .automation_rules
        .values()
        .any(|r| r.group_id == request.group_id && r.kind == request.kind)
    {
        return Err(ChamaError::conflict("This group already has a rule of that kind"));
    }

    let rule = AutomationRule {
        id: Uuid::new_v4(),
        group_id: request.group_id,
        kind: request.kind,
        enabled: request.enabled,
        created_by: actor,
        created_at: now,
        last_run_at: None,
    };
    db.automation_rules.insert(rule.id, rule.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "create",
            entity: "automation_rule",
            entity_id: rule.id,
            group_id: Some(rule.group_id),
            detail: format!("kind={:?}", rule.kind),
        },
        now,
    );
    Ok(rule)
}

pub fn list_rules(db: &Database, viewer: Uuid, group_id: Uuid) -> Result<Vec<AutomationRule>> {
    access::require_official(db, group_id, viewer)?;
    let mut rules: Vec<AutomationRule> = db
        .automation_rules
        .values()
        .filter(|r| r.group_id == group_id)
        .cloned()
        .collect();
    rules.sort_by_key(|r| r.created_at);
    Ok(rules)
}

pub fn toggle_rule(
    db: &mut Database,
    actor: Uuid,
    rule_id: Uuid,
    request: ToggleRuleRequest,
    now: DateTime<Utc>,
) -> Result<AutomationRule> {
    let mut rule = db
        .automation_rules
        .get(&rule_id)
        .cloned()
        .ok_or_else(|| ChamaError::not_found("AutomationRule", rule_id))?;
    access::require_official(db, rule.group_id, actor)?;
    rule.enabled = request.enabled;
    db.automation_rules.insert(rule.id, rule.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "toggle",
            entity: "automation_rule",
            entity_id: rule.id,
            group_id: Some(rule.group_id),
            detail: format!("enabled={}", rule.enabled),
        },
        now,
    );
    Ok(rule)
}

/// 通知以 dedupe_key 去重，已存在則不再發送
fn notify(
    db: &mut Database,
    user_id: Uuid,
    group_id: Option<Uuid>,
    message: String,
    dedupe_key: String,
    now: DateTime<Utc>,
) -> bool {
    if db
        .notifications
        .iter()
        .any(|n| n.user_id == user_id && n.dedupe_key == dedupe_key)
    {
        return false;
    }
    db.notifications.push(Notification {
        id: Uuid::new_v4(),
        user_id,
        group_id,
        message,
        dedupe_key,
        read: false,
        created_at: now,
    });
    true
}

fn send_reminders(db: &mut Database, group_id: Uuid, now: DateTime<Utc>) -> Result<usize> {
    let group = access::group(db, group_id)?.clone();
    let period = group.contribution_frequency.period_key(now);
    let paid: HashSet<Uuid> = db
        .contributions
        .values()
        .filter(|c| {
            c.group_id == group_id
                && c.status == ContributionStatus::Confirmed
                && group.contribution_frequency.period_key(c.created_at) == period
        })
        .map(|c| c.member_id)
        .collect();

    let mut sent = 0;
    for member in access::active_member_ids(db, group_id) {
        if paid.contains(&member) {
            continue;
        }
        let message = format!(
            "Reminder: your {} contribution of KES {} to {} is due.",
            period,
            group.contribution_amount / 100,
            group.name
        );
        let key = format!("reminder:{}:{}", group_id, period);
        if notify(db, member, Some(group_id), message, key, now) {
            sent += 1;
        }
    }
    Ok(sent)
}

fn mark_overdue_loans(db: &mut Database, group_id: Uuid, now: DateTime<Utc>) -> usize {
    let overdue: Vec<Uuid> = db
        .loans
        .values()
        .filter(|l| {
            l.group_id == group_id
                && l.status == LoanStatus::Disbursed
                && l.due_date.map(|due| due < now).unwrap_or(false)
        })
        .map(|l| l.id)
        .collect();

    for loan_id in &overdue {
        let Some(loan) = db.loans.get_mut(loan_id) else {
            continue;
        };
        loan.status = LoanStatus::Defaulted;
        let borrower = loan.borrower_id;
        let outstanding = loan.outstanding();
        notify(
            db,
            borrower,
            Some(group_id),
            format!(
                "Your loan is overdue and has been marked as defaulted. Outstanding: KES {}.",
                outstanding / 100
            ),
            format!("overdue:{}", loan_id),
            now,
        );
        audit::record(
            db,
            AuditEvent {
                actor: None,
                action: "default",
                entity: "loan",
                entity_id: *loan_id,
                group_id: Some(group_id),
                detail: format!("outstanding={}", outstanding),
            },
            now,
        );
    }
    overdue.len()
}

/// 執行群組所有啟用中的規則
pub fn run_rules(
    db: &mut Database,
    actor: Uuid,
    group_id: Uuid,
    now: DateTime<Utc>,
) -> Result<RunReport> {
    access::active_group(db, group_id)?;
    access::require_official(db, group_id, actor)?;

    let rules: Vec<AutomationRule> = db
        .automation_rules
        .values()
        .filter(|r| r.group_id == group_id && r.enabled)
        .cloned()
        .collect();
    let mut report = RunReport {
        group_id,
        ..Default::default()
    };
    for rule in &rules {
        match rule.kind {
            RuleKind::ContributionReminder => {
                report.reminders_sent += send_reminders(db, group_id, now)?
            }
            RuleKind::OverdueLoanCheck => report.loans_defaulted += mark_overdue_loans(db, group_id, now),
        }
        if let Some(r) = db.automation_rules.get_mut(&rule.id) {
            r.last_run_at = Some(now);
        }
        report.rules_run += 1;
    }

    tracing::info!(
        "📊 Automation run for group {}: {} rules, {} reminders, {} defaults",
        group_id,
        report.rules_run,
        report.reminders_sent,
        report.loans_defaulted
    );
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "run",
            entity: "automation_rule",
            entity_id: group_id,
            group_id: Some(group_id),
            detail: format!(
                "reminders={} defaults={}",
                report.reminders_sent, report.loans_defaulted
            ),
        },
        now,
    );
    Ok(report)
}

pub fn notifications(db: &Database, user_id: Uuid, unread_only: bool) -> Vec<Notification> {
    let mut items: Vec<Notification> = db
        .notifications
        .iter()
        .filter(|n| n.user_id == user_id && (!unread_only || !n.read))
        .cloned()
        .collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items
}

pub fn mark_read(db: &mut Database, user_id: Uuid, notification_id: Uuid) -> Result<Notification> {
    let notification = db
        .notifications
        .iter_mut()
        .find(|n| n.id == notification_id && n.user_id == user_id)
        .ok_or_else(|| ChamaError::not_found("Notification", notification_id))?;
    notification.read = true;
    Ok(notification.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::finance::tests::{approved_loan, fixture};
    use crate::core::finance::disburse_loan;
    use chrono::Duration;

    fn enable(db: &mut Database, actor: Uuid, group_id: Uuid, kind: RuleKind) {
        create_rule(
            db,
            actor,
            CreateRuleRequest {
                group_id,
                kind,
                enabled: true,
            },
            Utc::now(),
        )
        .unwrap();
    }

    #[test]
    fn test_reminders_are_sent_once_per_period() {
        let mut f = fixture();
        enable(&mut f.db, f.chair, f.group_id, RuleKind::ContributionReminder);

        // 所有人本月已繳
        let report = run_rules(&mut f.db, f.chair, f.group_id, Utc::now()).unwrap();
        assert_eq!(report.reminders_sent, 0);

        let next_period = Utc::now() + Duration::days(40);
        let report = run_rules(&mut f.db, f.chair, f.group_id, next_period).unwrap();
        assert_eq!(report.reminders_sent, 3);
        let again = run_rules(&mut f.db, f.chair, f.group_id, next_period).unwrap();
        assert_eq!(again.reminders_sent, 0);
        assert_eq!(notifications(&f.db, f.member, true).len(), 1);
    }

    #[test]
    fn test_overdue_loans_default() {
        let mut f = fixture();
        enable(&mut f.db, f.chair, f.group_id, RuleKind::OverdueLoanCheck);
        let loan_id = approved_loan(&mut f, 20_000);
        disburse_loan(&mut f.db, f.treasurer, loan_id, Utc::now()).unwrap();

        let report = run_rules(&mut f.db, f.chair, f.group_id, Utc::now()).unwrap();
        assert_eq!(report.loans_defaulted, 0);

        let late = Utc::now() + Duration::days(120);
        let report = run_rules(&mut f.db, f.chair, f.group_id, late).unwrap();
        assert_eq!(report.loans_defaulted, 1);
        assert_eq!(f.db.loans[&loan_id].status, LoanStatus::Defaulted);

        let inbox = notifications(&f.db, f.member, false);
        assert_eq!(inbox.len(), 1);
        let read = mark_read(&mut f.db, f.member, inbox[0].id).unwrap();
        assert!(read.read);
        assert!(mark_read(&mut f.db, f.chair, inbox[0].id).is_err());
    }

    #[test]
    fn test_disabled_rules_do_not_run_and_members_cannot_manage() {
        let mut f = fixture();
        enable(&mut f.db, f.chair, f.group_id, RuleKind::ContributionReminder);
        let rule_id = list_rules(&f.db, f.chair, f.group_id).unwrap()[0].id;
        assert!(toggle_rule(&mut f.db, f.member, rule_id, ToggleRuleRequest { enabled: false }, Utc::now()).is_err());
        toggle_rule(&mut f.db, f.chair, rule_id, ToggleRuleRequest { enabled: false }, Utc::now()).unwrap();

        let report = run_rules(&mut f.db, f.chair, f.group_id, Utc::now() + Duration::days(40)).unwrap();
        assert_eq!(report.rules_run, 0);
    }
}
