use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// 金額一律以最小貨幣單位 (cents) 儲存
pub type Amount = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone_number: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub kyc_status: KycStatus,
    pub date_joined: DateTime<Utc>,
}

/// 對外輸出的使用者資料 (不含密碼雜湊)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone_number: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub kyc_status: KycStatus,
    pub date_joined: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            phone_number: user.phone_number.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_staff: user.is_staff,
            kyc_status: user.kyc_status,
            date_joined: user.date_joined,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    Unverified,
    Verified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberWallet {
    pub user_id: Uuid,
    pub balance: Amount,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionKind {
    Deposit,
    Withdrawal,
    ContributionDebit,
    LoanDisbursement,
    LoanRepayment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: WalletTransactionKind,
    pub amount: Amount,
    pub balance_after: Amount,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    Savings,
    Investment,
    Welfare,
    MerryGoRound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionFrequency {
    Weekly,
    Monthly,
}

impl ContributionFrequency {
    /// 每月預期的繳款次數
    pub fn periods_per_month(&self) -> f64 {
        match self {
            ContributionFrequency::Weekly => 52.0 / 12.0,
            ContributionFrequency::Monthly => 1.0,
        }
    }

    /// 繳款週期的識別字串: 週繳為 ISO 週 (2024-W05)，月繳為月份 (2024-02)
    pub fn period_key(&self, at: DateTime<Utc>) -> String {
        match self {
            ContributionFrequency::Weekly => {
                let week = at.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            ContributionFrequency::Monthly => at.format("%Y-%m").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChamaGroup {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub group_type: GroupType,
    pub contribution_amount: Amount,
    pub contribution_frequency: ContributionFrequency,
    pub max_members: u32,
    pub required_approvals: u32,
    pub loan_interest_rate_bps: u32,
    pub created_by: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipRole {
    Member,
    Official,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Pending,
    Active,
    Suspended,
    Exited,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub role: MembershipRole,
    pub status: MembershipStatus,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfficialPosition {
    Chairperson,
    Treasurer,
    Secretary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Official {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub position: OfficialPosition,
    pub appointed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Wallet,
    Mpesa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    pub id: Uuid,
    pub group_id: Uuid,
    pub member_id: Uuid,
    pub amount: Amount,
    pub method: PaymentMethod,
    pub reference: String,
    pub status: ContributionStatus,
    pub created_at: DateTime<Utc>,
    pub confirmed_by: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Disbursed,
    Repaid,
    Defaulted,
}

impl LoanStatus {
    /// 尚未結清的貸款狀態
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            LoanStatus::Pending | LoanStatus::Approved | LoanStatus::Disbursed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub official_id: Uuid,
    pub decision: Decision,
    pub comment: String,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanRepayment {
    pub id: Uuid,
    pub amount: Amount,
    pub paid_at: DateTime<Utc>,
    pub on_time: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: Uuid,
    pub group_id: Uuid,
    pub borrower_id: Uuid,
    pub principal: Amount,
    pub interest_rate_bps: u32,
    pub term_months: u32,
    pub purpose: String,
    pub total_due: Amount,
    pub amount_repaid: Amount,
    pub status: LoanStatus,
    pub approvals: Vec<Approval>,
    pub repayments: Vec<LoanRepayment>,
    pub created_at: DateTime<Utc>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
}

impl Loan {
    pub fn outstanding(&self) -> Amount {
        (self.total_due - self.amount_repaid).max(0)
    }

    /// 已撥款且仍有欠款 (含違約)
    pub fn carries_balance(&self) -> bool {
        matches!(self.status, LoanStatus::Disbursed | LoanStatus::Defaulted) && self.outstanding() > 0
    }

    /// 尚未結清：審核中、已核准、已撥款，或違約後仍有欠款
    pub fn is_unsettled(&self) -> bool {
        self.status.is_open() || self.carries_balance()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingType {
    Simple,
    TwoThirds,
    Unanimous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Open,
    Passed,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub group_id: Uuid,
    pub title: String,
    pub description: String,
    pub voting_type: VotingType,
    pub quorum_percent: u32,
    pub status: ProposalStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Yes,
    No,
    Abstain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub voter_id: Uuid,
    pub choice: VoteChoice,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentType {
    MoneyMarket,
    Bonds,
    Stocks,
    RealEstate,
    Other,
}

impl InvestmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentType::MoneyMarket => "money_market",
            InvestmentType::Bonds => "bonds",
            InvestmentType::Stocks => "stocks",
            InvestmentType::RealEstate => "real_estate",
            InvestmentType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentStatus {
    Active,
    Liquidated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    pub investment_type: InvestmentType,
    pub amount_invested: Amount,
    pub current_value: Amount,
    pub expected_return_bps: u32,
    pub status: InvestmentStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub liquidated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    NationalId,
    Passport,
    KraPin,
    BusinessRegistration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycDocument {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_type: DocumentType,
    pub document_number: String,
    pub status: DocumentStatus,
    pub reviewer_id: Option<Uuid>,
    pub review_note: String,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity: String,
    pub entity_id: Uuid,
    pub group_id: Option<Uuid>,
    pub detail: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MpesaPurpose {
    WalletTopup,
    Contribution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MpesaStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpesaTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub group_id: Option<Uuid>,
    pub purpose: MpesaPurpose,
    pub phone_number: String,
    pub amount: Amount,
    pub account_reference: String,
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub status: MpesaStatus,
    pub result_code: Option<i64>,
    pub result_desc: String,
    pub mpesa_receipt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    ContributionReminder,
    OverdueLoanCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: Uuid,
    pub group_id: Uuid,
    pub kind: RuleKind,
    pub enabled: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub group_id: Option<Uuid>,
    pub message: String,
    pub dedupe_key: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonCompletion {
    pub user_id: Uuid,
    pub slug: String,
    pub completed_at: DateTime<Utc>,
}

/// 全部資料的快照，序列化後透過 Storage 保存
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Database {
    pub users: BTreeMap<Uuid, User>,
    pub wallets: BTreeMap<Uuid, MemberWallet>,
    pub wallet_transactions: Vec<WalletTransaction>,
    pub groups: BTreeMap<Uuid, ChamaGroup>,
    pub memberships: BTreeMap<Uuid, Membership>,
    pub officials: BTreeMap<Uuid, Official>,
    pub contributions: BTreeMap<Uuid, Contribution>,
    pub loans: BTreeMap<Uuid, Loan>,
    pub proposals: BTreeMap<Uuid, Proposal>,
    pub votes: Vec<Vote>,
    pub investments: BTreeMap<Uuid, Investment>,
    pub kyc_documents: BTreeMap<Uuid, KycDocument>,
    pub audit_log: Vec<AuditEntry>,
    pub mpesa_transactions: BTreeMap<Uuid, MpesaTransaction>,
    pub automation_rules: BTreeMap<Uuid, AutomationRule>,
    pub notifications: Vec<Notification>,
    pub lesson_completions: Vec<LessonCompletion>,
}
