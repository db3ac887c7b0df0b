use crate::domain::model::Database;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// 全部資料放在一把讀寫鎖之後，每次寫入成功後保存快照
pub struct Store {
    db: RwLock<Database>,
    storage: Arc<dyn Storage>,
    snapshot_file: String,
    persist: bool,
    last_persist_error: Mutex<Option<String>>,
}

impl Store {
    /// 開啟資料庫，如果快照存在就載入
    pub async fn open(
        storage: Arc<dyn Storage>,
        snapshot_file: impl Into<String>,
        persist: bool,
    ) -> Result<Self> {
        let snapshot_file = snapshot_file.into();
        let db = if persist && storage.exists(&snapshot_file).await? {
            let bytes = storage.read_file(&snapshot_file).await?;
            let db: Database = serde_json::from_slice(&bytes)?;
            tracing::info!(
                "📂 Loaded snapshot '{}' ({} users, {} groups)",
                snapshot_file,
                db.users.len(),
                db.groups.len()
            );
            db
        } else {
            Database::default()
        };

        Ok(Self {
            db: RwLock::new(db),
            storage,
            snapshot_file,
            persist,
            last_persist_error: Mutex::new(None),
        })
    }

    pub fn in_memory() -> Self {
        Self::from_database(Database::default())
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            db: RwLock::new(db),
            storage: Arc::new(crate::adapters::MemoryStorage::new()),
            snapshot_file: String::new(),
            persist: false,
            last_persist_error: Mutex::new(None),
        }
    }

    pub async fn read<T>(&self, f: impl FnOnce(&Database) -> T) -> T {
        let guard = self.db.read().await;
        f(&guard)
    }

    /// 在複本上執行 `f`，成功才替換資料庫；失敗不會留下部分寫入。
    /// `audit_log` 與 `wallet_transactions` 只會附加，不複製而是移入複本，失敗時截回原長度。
    pub async fn mutate<T>(&self, f: impl FnOnce(&mut Database) -> Result<T>) -> Result<T> {
        let mut guard = self.db.write().await;
        let audit_log = std::mem::take(&mut guard.audit_log);
        let wallet_transactions = std::mem::take(&mut guard.wallet_transactions);
        let (audit_len, wallet_len) = (audit_log.len(), wallet_transactions.len());
        let mut staged = guard.clone();
        staged.audit_log = audit_log;
        staged.wallet_transactions = wallet_transactions;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&mut staged)));
        let out = match outcome {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                restore_logs(&mut guard, &mut staged, audit_len, wallet_len);
                return Err(e);
            }
            Err(payload) => {
                restore_logs(&mut guard, &mut staged, audit_len, wallet_len);
                drop(guard);
                panic::resume_unwind(payload);
            }
        };
        *guard = staged;

        if self.persist {
            // 降為讀鎖：讀取可同時進行，下一個寫入仍要等快照寫完
            let guard = guard.downgrade();
            let result = match serde_json::to_vec(&*guard) {
                Ok(bytes) => self.storage.write_file(&self.snapshot_file, &bytes).await,
                Err(e) => Err(e.into()),
            };
            let mut last_error = self
                .last_persist_error
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match result {
                Ok(()) => *last_error = None,
                Err(e) => {
                    tracing::error!("❌ Failed to persist snapshot: {}", e);
                    *last_error = Some(e.to_string());
                }
            }
        }

        Ok(out)
    }

    pub fn persistence_enabled(&self) -> bool {
        self.persist
    }

    /// 最近一次快照失敗的原因
    pub fn last_persist_error(&self) -> Option<String> {
        self.last_persist_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

fn restore_logs(live: &mut Database, staged: &mut Database, audit_len: usize, wallet_len: usize) {
    staged.audit_log.truncate(audit_len);
    staged.wallet_transactions.truncate(wallet_len);
    live.audit_log = std::mem::take(&mut staged.audit_log);
    live.wallet_transactions = std::mem::take(&mut staged.wallet_transactions);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStorage;
    use crate::domain::model::{AuditEntry, KycStatus, User};
    use crate::utils::error::ChamaError;
    use chrono::Utc;
    use uuid::Uuid;

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: name.to_string(),
            email: format!("{}@example.com", name),
            phone_number: "254712345678".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: "x".to_string(),
            is_active: true,
            is_staff: false,
            kyc_status: KycStatus::Unverified,
            date_joined: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_no_partial_write() {
        let store = Store::in_memory();
        let result: Result<()> = store
            .mutate(|db| {
                let u = user("amina");
                db.users.insert(u.id, u);
                Err(ChamaError::conflict("boom"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.read(|db| db.users.len()).await, 0);
    }

    fn entry(action: &str) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4(),
            actor_id: None,
            action: action.to_string(),
            entity: "user".to_string(),
            entity_id: Uuid::new_v4(),
            group_id: None,
            detail: String::new(),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_only_logs_survive_failed_and_panicking_mutations() {
        let store = Arc::new(Store::in_memory());
        store
            .mutate(|db| {
                db.audit_log.push(entry("register"));
                Ok(())
            })
            .await
            .unwrap();

        let failed: Result<()> = store
            .mutate(|db| {
                db.audit_log.push(entry("update"));
                Err(ChamaError::conflict("boom"))
            })
            .await;
        assert!(failed.is_err());

        let panicking = store.clone();
        let handle = tokio::spawn(async move {
            panicking
                .mutate(|db| -> Result<()> {
                    db.audit_log.push(entry("update"));
                    panic!("boom");
                })
                .await
        });
        assert!(handle.await.unwrap_err().is_panic());

        let actions = store
            .read(|db| db.audit_log.iter().map(|e| e.action.clone()).collect::<Vec<_>>())
            .await;
        assert_eq!(actions, vec!["register".to_string()]);
    }

    #[tokio::test]
    async fn test_snapshot_is_written_and_reloaded() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let store = Store::open(storage.clone(), "db.json", true).await.unwrap();
        store
            .mutate(|db| {
                let u = user("otieno");
                db.users.insert(u.id, u);
                Ok(())
            })
            .await
            .unwrap();
        assert!(store.last_persist_error().is_none());

        let reopened = Store::open(storage, "db.json", true).await.unwrap();
        let names = reopened
            .read(|db| db.users.values().map(|u| u.username.clone()).collect::<Vec<_>>())
            .await;
        assert_eq!(names, vec!["otieno".to_string()]);
    }
}
