use crate::core::access;
use crate::core::audit::{self, AuditEvent};
use crate::domain::model::{
    Amount, Database, KycStatus, MemberWallet, User, UserProfile, WalletTransaction,
    WalletTransactionKind,
};
use crate::utils::error::{ChamaError, Result};
use crate::utils::validation;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const HASH_ITERATIONS: u32 = 10_000;
const HASH_SCHEME: &str = "sha256";

/// 密碼格式: sha256$<iterations>$<salt hex>$<digest hex>
pub fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::random();
    let salt_hex = hex::encode(salt);
    let digest = derive(password, &salt_hex, HASH_ITERATIONS);
    format!("{}${}${}${}", HASH_SCHEME, HASH_ITERATIONS, salt_hex, digest)
}

pub fn verify_password(password: &str, encoded: &str) -> bool {
    let parts: Vec<&str> = encoded.split('$').collect();
    if parts.len() != 4 || parts[0] != HASH_SCHEME {
        return false;
    }
    let Ok(iterations) = parts[1].parse::<u32>() else {
        return false;
    };
    let expected = derive(password, parts[2], iterations);
    // 長度固定，逐位元比較
    expected.len() == parts[3].len()
        && expected
            .bytes()
            .zip(parts[3].bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn derive(password: &str, salt_hex: &str, iterations: u32) -> String {
    let mut digest = Sha256::new()
        .chain_update(salt_hex.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..iterations {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(password.as_bytes())
            .finalize();
    }
    hex::encode(digest)
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub phone_number: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

fn ensure_unique(
    db: &Database,
    exclude: Option<Uuid>,
    username: Option<&str>,
    email: Option<&str>,
    phone: Option<&str>,
) -> Result<()> {
    for user in db.users.values().filter(|u| Some(u.id) != exclude) {
        if username.map(|n| user.username.eq_ignore_ascii_case(n)).unwrap_or(false) {
            return Err(ChamaError::conflict("A user with that username already exists."));
        }
        if email.map(|e| user.email.eq_ignore_ascii_case(e)).unwrap_or(false) {
            return Err(ChamaError::conflict("A user with that email already exists."));
        }
        if phone.map(|p| user.phone_number == p).unwrap_or(false) {
            return Err(ChamaError::conflict(
                "A user with that phone number already exists.",
            ));
        }
    }
    Ok(())
}

pub fn register(
    db: &mut Database,
    request: RegisterRequest,
    admin_usernames: &[String],
    now: DateTime<Utc>,
) -> Result<UserProfile> {
    let username = request.username.trim().to_string();
    let email = request.email.trim().to_lowercase();
    validation::validate_username(&username)?;
    validation::validate_email(&email)?;
    validation::validate_password(&request.password)?;
    let phone = validation::normalize_phone_number(&request.phone_number)?;
    ensure_unique(db, None, Some(&username), Some(&email), Some(&phone))?;

    let user = User {
        id: Uuid::new_v4(),
        is_staff: admin_usernames.iter().any(|a| a.eq_ignore_ascii_case(&username)),
        username,
        email,
        phone_number: phone,
        first_name: request.first_name.trim().to_string(),
        last_name: request.last_name.trim().to_string(),
        password_hash: hash_password(&request.password),
        is_active: true,
        kyc_status: KycStatus::Unverified,
        date_joined: now,
    };
    let profile = UserProfile::from(&user);

    db.wallets.insert(
        user.id,
        MemberWallet {
            user_id: user.id,
            balance: 0,
            currency: "KES".to_string(),
            updated_at: now,
        },
    );
    audit::record(
        db,
        AuditEvent {
            actor: Some(user.id),
            action: "register",
            entity: "user",
            entity_id: user.id,
            group_id: None,
            detail: format!("username={}", user.username),
        },
        now,
    );
    db.users.insert(user.id, user);
    Ok(profile)
}

/// 驗證帳號密碼，成功時回傳使用者
pub fn authenticate<'a>(db: &'a Database, username: &str, password: &str) -> Result<&'a User> {
    let user = db
        .users
        .values()
        .find(|u| u.username.eq_ignore_ascii_case(username.trim()))
        .filter(|u| verify_password(password, &u.password_hash));
    match user {
        Some(u) if u.is_active => Ok(u),
        _ => Err(ChamaError::unauthorized(
            "No active account found with the given credentials",
        )),
    }
}

pub fn update_profile(
    db: &mut Database,
    user_id: Uuid,
    request: UpdateProfileRequest,
    now: DateTime<Utc>,
) -> Result<UserProfile> {
    access::user(db, user_id)?;
    let email = match request.email {
        Some(e) => {
            let e = e.trim().to_lowercase();
            validation::validate_email(&e)?;
            Some(e)
        }
        None => None,
    };
    let phone = match request.phone_number {
        Some(p) => Some(validation::normalize_phone_number(&p)?),
        None => None,
    };
    ensure_unique(db, Some(user_id), None, email.as_deref(), phone.as_deref())?;

    let user = db
        .users
        .get_mut(&user_id)
        .ok_or_else(|| ChamaError::not_found("User", user_id))?;
    if let Some(first_name) = request.first_name {
        user.first_name = first_name.trim().to_string();
    }
    if let Some(last_name) = request.last_name {
        user.last_name = last_name.trim().to_string();
    }
    if let Some(email) = email {
        user.email = email;
    }
    if let Some(phone) = phone {
        user.phone_number = phone;
    }
    let profile = UserProfile::from(&*user);
    audit::record(
        db,
        AuditEvent {
            actor: Some(user_id),
            action: "update",
            entity: "user",
            entity_id: user_id,
            group_id: None,
            detail: String::new(),
        },
        now,
    );
    Ok(profile)
}

pub fn change_password(
    db: &mut Database,
    user_id: Uuid,
    request: ChangePasswordRequest,
    now: DateTime<Utc>,
) -> Result<()> {
    let user = access::user(db, user_id)?;
    if !verify_password(&request.old_password, &user.password_hash) {
        return Err(ChamaError::validation(
            "old_password",
            "Your old password was entered incorrectly.",
        ));
    }
    validation::validate_password(&request.new_password)?;
    if let Some(user) = db.users.get_mut(&user_id) {
        user.password_hash = hash_password(&request.new_password);
    }
    audit::record(
        db,
        AuditEvent {
            actor: Some(user_id),
            action: "change_password",
            entity: "user",
            entity_id: user_id,
            group_id: None,
            detail: String::new(),
        },
        now,
    );
    Ok(())
}

pub fn wallet(db: &Database, user_id: Uuid) -> Result<&MemberWallet> {
    db.wallets
        .get(&user_id)
        .ok_or_else(|| ChamaError::not_found("Wallet", user_id))
}

/// 入帳 (正數) 或扣款 (負數)，扣款不可超過餘額
pub fn post_wallet(
    db: &mut Database,
    user_id: Uuid,
    kind: WalletTransactionKind,
    delta: Amount,
    reference: &str,
    now: DateTime<Utc>,
) -> Result<Amount> {
    let wallet = db
        .wallets
        .get_mut(&user_id)
        .ok_or_else(|| ChamaError::not_found("Wallet", user_id))?;
    let balance = validation::checked_add("amount", wallet.balance, delta)?;
    if balance < 0 {
        return Err(ChamaError::validation(
            "amount",
            format!(
                "Insufficient wallet balance: available {}, required {}",
                wallet.balance, -delta
            ),
        ));
    }
    wallet.balance = balance;
    wallet.updated_at = now;
    db.wallet_transactions.push(WalletTransaction {
        id: Uuid::new_v4(),
        user_id,
        kind,
        amount: delta.abs(),
        balance_after: balance,
        reference: reference.to_string(),
        created_at: now,
    });
    Ok(balance)
}

pub fn wallet_transactions(db: &Database, user_id: Uuid) -> Vec<WalletTransaction> {
    let mut txns: Vec<WalletTransaction> = db
        .wallet_transactions
        .iter()
        .filter(|t| t.user_id == user_id)
        .cloned()
        .collect();
    txns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    txns
}

pub fn withdraw(db: &mut Database, user_id: Uuid, amount: Amount, now: DateTime<Utc>) -> Result<MemberWallet> {
    validation::validate_amount("amount", amount)?;
    let reference = format!("WD-{}", &Uuid::new_v4().simple().to_string()[..10]);
    post_wallet(db, user_id, WalletTransactionKind::Withdrawal, -amount, &reference, now)?;
    audit::record(
        db,
        AuditEvent {
            actor: Some(user_id),
            action: "withdraw",
            entity: "wallet",
            entity_id: user_id,
            group_id: None,
            detail: format!("amount={}", amount),
        },
        now,
    );
    Ok(wallet(db, user_id)?.clone())
}

pub fn list_users(db: &Database, viewer: Uuid, search: Option<&str>) -> Result<Vec<UserProfile>> {
    access::require_staff(db, viewer)?;
    let needle = search.map(|s| s.trim().to_lowercase());
    let mut users: Vec<UserProfile> = db
        .users
        .values()
        .filter(|u| match &needle {
            Some(n) => {
                u.username.to_lowercase().contains(n)
                    || u.email.contains(n)
                    || u.phone_number.contains(n)
            }
            None => true,
        })
        .map(UserProfile::from)
        .collect();
    users.sort_by(|a, b| a.date_joined.cmp(&b.date_joined));
    Ok(users)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn register_user(db: &mut Database, username: &str, phone: &str) -> Uuid {
        register(
            db,
            RegisterRequest {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                phone_number: phone.to_string(),
                password: "correct-horse".to_string(),
                first_name: String::new(),
                last_name: String::new(),
            },
            &["admin".to_string()],
            Utc::now(),
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_password_hash_round_trip() {
        let encoded = hash_password("s3cret-pass");
        assert!(encoded.starts_with("sha256$10000$"));
        assert!(verify_password("s3cret-pass", &encoded));
        assert!(!verify_password("wrong-pass", &encoded));
        assert!(!verify_password("s3cret-pass", "md5$1$aa$bb"));
    }

    #[test]
    fn test_register_creates_wallet_and_normalizes_phone() {
        let mut db = Database::default();
        let id = register_user(&mut db, "wanjiru", "0712345678");

        let user = db.users.get(&id).unwrap();
        assert_eq!(user.phone_number, "254712345678");
        assert!(!user.is_staff);
        assert_eq!(wallet(&db, id).unwrap().balance, 0);
        assert_eq!(db.audit_log.len(), 1);
    }

    #[test]
    fn test_register_rejects_duplicates_case_insensitively() {
        let mut db = Database::default();
        register_user(&mut db, "kamau", "0712345678");

        let err = register(
            &mut db,
            RegisterRequest {
                username: "KAMAU".to_string(),
                email: "other@example.com".to_string(),
                phone_number: "0722000000".to_string(),
                password: "correct-horse".to_string(),
                first_name: String::new(),
                last_name: String::new(),
            },
            &[],
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, ChamaError::Conflict { .. }));
    }

    #[test]
    fn test_admin_usernames_become_staff() {
        let mut db = Database::default();
        let id = register_user(&mut db, "admin", "0700000001");
        assert!(db.users.get(&id).unwrap().is_staff);
    }

    #[test]
    fn test_authenticate() {
        let mut db = Database::default();
        register_user(&mut db, "achieng", "0712345678");

        assert!(authenticate(&db, "achieng", "correct-horse").is_ok());
        assert!(authenticate(&db, "Achieng", "correct-horse").is_ok());
        assert!(authenticate(&db, "achieng", "wrong").is_err());
        assert!(authenticate(&db, "nobody", "correct-horse").is_err());
    }

    #[test]
    fn test_withdraw_cannot_overdraw() {
        let mut db = Database::default();
        let id = register_user(&mut db, "mutua", "0712345678");
        post_wallet(&mut db, id, WalletTransactionKind::Deposit, 10_000, "DEP", Utc::now()).unwrap();

        assert!(withdraw(&mut db, id, 20_000, Utc::now()).is_err());
        let wallet = withdraw(&mut db, id, 4_000, Utc::now()).unwrap();
        assert_eq!(wallet.balance, 6_000);
        assert_eq!(wallet_transactions(&db, id).len(), 2);
    }

    #[test]
    fn test_change_password_requires_old_password() {
        let mut db = Database::default();
        let id = register_user(&mut db, "njeri", "0712345678");

        let bad = change_password(
            &mut db,
            id,
            ChangePasswordRequest {
                old_password: "nope".to_string(),
                new_password: "another-pass".to_string(),
            },
            Utc::now(),
        );
        assert!(bad.is_err());

        change_password(
            &mut db,
            id,
            ChangePasswordRequest {
                old_password: "correct-horse".to_string(),
                new_password: "another-pass".to_string(),
            },
            Utc::now(),
        )
        .unwrap();
        assert!(authenticate(&db, "njeri", "another-pass").is_ok());
    }
}
