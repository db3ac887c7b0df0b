use crate::core::access;
use crate::core::finance::{self, GroupSummary};
use crate::domain::model::{Amount, ContributionStatus, Database, InvestmentStatus};
use crate::utils::error::{ChamaError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;
use zip::write::{FileOptions, ZipWriter};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub date: DateTime<Utc>,
    pub kind: &'static str,
    pub member: String,
    pub reference: String,
    pub inflow: Amount,
    pub outflow: Amount,
    pub balance: Amount,
}

#[derive(Debug, Serialize)]
struct StatementSummary<'a> {
    group_id: Uuid,
    group_name: &'a str,
    generated_at: DateTime<Utc>,
    entries: usize,
    summary: &'a GroupSummary,
}

pub struct Statement {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

fn username(db: &Database, user_id: Uuid) -> String {
    db.users
        .get(&user_id)
        .map(|u| u.username.clone())
        .unwrap_or_default()
}

/// 群組現金流水帳，依時間排序並計算累計餘額
pub fn ledger(db: &Database, group_id: Uuid) -> Vec<LedgerEntry> {
    let mut entries: Vec<LedgerEntry> = Vec::new();
    let mut push = |date, kind, member: String, reference: String, inflow, outflow| {
        entries.push(LedgerEntry {
            date,
            kind,
            member,
            reference,
            inflow,
            outflow,
            balance: 0,
        })
    };

    for c in db
        .contributions
        .values()
        .filter(|c| c.group_id == group_id && c.status == ContributionStatus::Confirmed)
    {
        push(c.created_at, "contribution", username(db, c.member_id), c.reference.clone(), c.amount, 0);
    }
    for loan in db.loans.values().filter(|l| l.group_id == group_id) {
        let borrower = username(db, loan.borrower_id);
        if let Some(disbursed_at) = loan.disbursed_at {
            push(disbursed_at, "loan_disbursement", borrower.clone(), loan.id.to_string(), 0, loan.principal);
        }
        for r in &loan.repayments {
            push(r.paid_at, "loan_repayment", borrower.clone(), loan.id.to_string(), r.amount, 0);
        }
    }
    for i in db.investments.values().filter(|i| i.group_id == group_id) {
        push(i.created_at, "investment", String::new(), i.name.clone(), 0, i.amount_invested);
        if let (InvestmentStatus::Liquidated, Some(at)) = (i.status, i.liquidated_at) {
            push(at, "liquidation", String::new(), i.name.clone(), i.current_value, 0);
        }
    }

    entries.sort_by(|a, b| a.date.cmp(&b.date));
    let mut balance = 0;
    for entry in entries.iter_mut() {
        balance += entry.inflow - entry.outflow;
        entry.balance = balance;
    }
    entries
}

fn write_delimited(entries: &[LedgerEntry], delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer.write_record(["date", "kind", "member", "reference", "inflow", "outflow", "balance"])?;
    for e in entries {
        writer.write_record([
            e.date.to_rfc3339(),
            e.kind.to_string(),
            e.member.clone(),
            e.reference.clone(),
            e.inflow.to_string(),
            e.outflow.to_string(),
            e.balance.to_string(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| ChamaError::IoError(e.into_error()))
}

/// 產生對帳單 ZIP (statement.csv, statement.tsv, summary.json)，不檢查權限
pub fn build_statement(db: &Database, group_id: Uuid, now: DateTime<Utc>) -> Result<Statement> {
    let group = access::group(db, group_id)?;
    let summary = finance::group_summary(db, group_id)?;
    let entries = ledger(db, group_id);

    tracing::debug!(
        "Building statement for group {} ({} ledger entries)",
        group.name,
        entries.len()
    );

    let bytes = {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

        zip.start_file::<_, ()>("statement.csv", FileOptions::default())?;
        zip.write_all(&write_delimited(&entries, b',')?)?;

        zip.start_file::<_, ()>("statement.tsv", FileOptions::default())?;
        zip.write_all(&write_delimited(&entries, b'\t')?)?;

        zip.start_file::<_, ()>("summary.json", FileOptions::default())?;
        let json = serde_json::to_string_pretty(&StatementSummary {
            group_id,
            group_name: &group.name,
            generated_at: now,
            entries: entries.len(),
            summary: &summary,
        })?;
        zip.write_all(json.as_bytes())?;

        zip.finish()?.into_inner()
    };

    let slug: String = group
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    Ok(Statement {
        file_name: format!("{}_statement_{}.zip", slug, now.format("%Y%m%d")),
        bytes,
    })
}

pub fn group_statement(
    db: &Database,
    viewer: Uuid,
    group_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Statement> {
    access::require_active_member(db, group_id, viewer)?;
    build_statement(db, group_id, now)
}
