//! Followed accounts: storage and follower sync
//!
//! The workflow only reads the active accounts. They are kept current by
//! `sync_following`, which mirrors the platform's following list into the
//! store, or added by hand when the platform's following endpoint is not
//! available to the app.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::db::{map_insert_error, Database};
use crate::error::{DbError, Result, XbotError};
use crate::platforms::Platform;
use crate::types::Account;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Accounts the workflow should monitor.
    async fn active_accounts(&self) -> Result<Vec<Account>>;

    /// Insert or update by platform id. Handle, display name and active flag
    /// are overwritten on conflict.
    async fn batch_upsert(&self, accounts: &[Account]) -> Result<()>;
}

#[async_trait]
impl AccountStore for Database {
    async fn active_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT platform_id, handle, display_name, active
            FROM followed_accounts
            WHERE active = 1
            ORDER BY id ASC
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(account_from_row).collect())
    }

    async fn batch_upsert(&self, accounts: &[Account]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool().begin().await.map_err(DbError::SqlxError)?;

        for account in accounts {
            sqlx::query(
                r#"
                INSERT INTO followed_accounts
                    (platform_id, handle, display_name, active, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(platform_id) DO UPDATE SET
                    handle = excluded.handle,
                    display_name = excluded.display_name,
                    active = excluded.active,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&account.platform_id)
            .bind(&account.handle)
            .bind(&account.display_name)
            .bind(account.active)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }
}

impl Database {
    /// Add an account by hand. Fails with `AlreadyExists` for a known id.
    pub async fn add_account(&self, account: &Account) -> Result<()> {
        if account.platform_id.trim().is_empty() {
            return Err(XbotError::InvalidInput("account id cannot be empty".to_string()));
        }

        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO followed_accounts
                (platform_id, handle, display_name, active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.platform_id)
        .bind(&account.handle)
        .bind(&account.display_name)
        .bind(account.active)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(|e| map_insert_error(e, || format!("account {}", account.platform_id)))?;

        Ok(())
    }

    /// All stored accounts, active or not
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT platform_id, handle, display_name, active
            FROM followed_accounts
            ORDER BY id ASC
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(account_from_row).collect())
    }

    pub async fn set_account_active(&self, platform_id: &str, active: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE followed_accounts SET active = ?, updated_at = ? WHERE platform_id = ?",
        )
        .bind(active)
        .bind(chrono::Utc::now().timestamp())
        .bind(platform_id)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(XbotError::NotFound(format!("account {}", platform_id)));
        }
        Ok(())
    }

    /// Stop tracking an account altogether. A later sync re-adds it if the
    /// bot still follows it.
    pub async fn delete_account(&self, platform_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM followed_accounts WHERE platform_id = ?")
            .bind(platform_id)
            .execute(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(XbotError::NotFound(format!("account {}", platform_id)));
        }
        Ok(())
    }
}

fn account_from_row(r: &sqlx::sqlite::SqliteRow) -> Account {
    use sqlx::Row;

    Account {
        platform_id: r.get("platform_id"),
        handle: r.get("handle"),
        display_name: r.get("display_name"),
        active: r.get::<i64, _>("active") != 0,
    }
}

/// In-memory account store for tests
#[derive(Default)]
pub struct MemoryAccounts {
    accounts: Mutex<BTreeMap<String, Account>>,
    unavailable: Mutex<bool>,
}

impl MemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        let store = Self::new();
        {
            let mut map = store.accounts.lock().unwrap();
            for account in accounts {
                map.insert(account.platform_id.clone(), account);
            }
        }
        store
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn all(&self) -> Vec<Account> {
        self.accounts.lock().unwrap().values().cloned().collect()
    }

    fn ensure_available(&self) -> Result<()> {
        if *self.unavailable.lock().unwrap() {
            return Err(DbError::IoError(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "account store unavailable",
            ))
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryAccounts {
    async fn active_accounts(&self) -> Result<Vec<Account>> {
        self.ensure_available()?;
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.active)
            .cloned()
            .collect())
    }

    async fn batch_upsert(&self, accounts: &[Account]) -> Result<()> {
        self.ensure_available()?;
        let mut map = self.accounts.lock().unwrap();
        for account in accounts {
            map.insert(account.platform_id.clone(), account.clone());
        }
        Ok(())
    }
}

/// Where the account list of a sync came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSource {
    Platform,
    Database,
}

/// Result of a follower sync
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncReport {
    pub total: usize,
    pub source: SyncSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Mirror the authenticated account's following list into `store`.
///
/// If the platform cannot be reached (or the app lacks access to the
/// following endpoint), fall back to the accounts already stored. That
/// fallback only succeeds when at least one active account exists;
/// otherwise the platform error is returned.
pub async fn sync_following(
    platform: &dyn Platform,
    store: &dyn AccountStore,
) -> Result<SyncReport> {
    let fetched = async {
        let me = platform.identify().await?;
        platform.list_followed(&me.platform_id).await
    }
    .await;

    match fetched {
        Ok(mut accounts) => {
            for account in &mut accounts {
                account.active = true;
            }
            store.batch_upsert(&accounts).await?;
            tracing::info!(
                platform = platform.name(),
                total = accounts.len(),
                "synced following list"
            );
            Ok(SyncReport {
                total: accounts.len(),
                source: SyncSource::Platform,
                note: None,
            })
        }
        Err(err) => {
            tracing::warn!(
                platform = platform.name(),
                error = %err,
                "could not fetch following list, falling back to stored accounts"
            );
            let stored = store.active_accounts().await?;
            if stored.is_empty() {
                tracing::error!(
                    "no stored accounts either; add accounts to monitor with `xbot-ctl account add`"
                );
                return Err(err);
            }
            Ok(SyncReport {
                total: stored.len(),
                source: SyncSource::Database,
                note: Some(format!(
                    "following list unavailable ({}); using {} stored accounts",
                    err,
                    stored.len()
                )),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::{MockConfig, MockPlatform};
    use tempfile::TempDir;

    async fn setup_test_db() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(&db_path.to_string_lossy()).await.unwrap();
        (temp_dir, db)
    }

    #[tokio::test]
    async fn test_batch_upsert_updates_on_conflict() {
        let (_dir, db) = setup_test_db().await;

        db.batch_upsert(&[Account::new("1", "alice"), Account::new("2", "bob")])
            .await
            .unwrap();

        let mut renamed = Account::new("1", "alice_new");
        renamed.display_name = "Alice".to_string();
        db.batch_upsert(&[renamed]).await.unwrap();

        let accounts = db.list_accounts().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].handle, "alice_new");
        assert_eq!(accounts[0].display_name, "Alice");
    }

    #[tokio::test]
    async fn test_batch_upsert_reactivates() {
        let (_dir, db) = setup_test_db().await;

        db.add_account(&Account::new("1", "alice")).await.unwrap();
        db.set_account_active("1", false).await.unwrap();
        assert!(db.active_accounts().await.unwrap().is_empty());

        db.batch_upsert(&[Account::new("1", "alice")]).await.unwrap();
        assert_eq!(db.active_accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_account_duplicate() {
        let (_dir, db) = setup_test_db().await;

        db.add_account(&Account::new("1", "alice")).await.unwrap();
        let err = db.add_account(&Account::new("1", "alice")).await.unwrap_err();
        assert!(matches!(err, XbotError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_disabled_account_can_be_enabled_again() {
        let (_dir, db) = setup_test_db().await;

        db.add_account(&Account::new("1", "alice")).await.unwrap();
        db.set_account_active("1", false).await.unwrap();
        assert!(db.active_accounts().await.unwrap().is_empty());

        db.set_account_active("1", true).await.unwrap();
        let active = db.active_accounts().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].handle, "alice");
    }

    #[tokio::test]
    async fn test_delete_account() {
        let (_dir, db) = setup_test_db().await;

        db.add_account(&Account::new("1", "alice")).await.unwrap();
        db.add_account(&Account::new("2", "bob")).await.unwrap();
        db.delete_account("1").await.unwrap();

        let accounts = db.list_accounts().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].platform_id, "2");

        // The id is free again for a manual add
        db.add_account(&Account::new("1", "alice")).await.unwrap();

        assert!(matches!(
            db.delete_account("missing").await,
            Err(XbotError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_account_active_unknown() {
        let (_dir, db) = setup_test_db().await;
        assert!(matches!(
            db.set_account_active("nope", false).await,
            Err(XbotError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_following_from_platform() {
        let (_dir, db) = setup_test_db().await;
        let platform = MockPlatform::with_config(MockConfig {
            following: vec![Account::new("10", "carol"), Account::new("11", "dave")],
            ..Default::default()
        });

        let report = sync_following(&platform, &db).await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.source, SyncSource::Platform);
        assert_eq!(db.active_accounts().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sync_following_falls_back_to_stored_accounts() {
        let (_dir, db) = setup_test_db().await;
        db.add_account(&Account::new("1", "alice")).await.unwrap();

        let platform = MockPlatform::with_config(MockConfig {
            fail_following: true,
            ..Default::default()
        });

        let report = sync_following(&platform, &db).await.unwrap();
        assert_eq!(report.source, SyncSource::Database);
        assert_eq!(report.total, 1);
        assert!(report.note.is_some());
    }

    #[tokio::test]
    async fn test_sync_following_fails_without_fallback() {
        let (_dir, db) = setup_test_db().await;
        let platform = MockPlatform::with_config(MockConfig {
            fail_identify: true,
            ..Default::default()
        });

        let err = sync_following(&platform, &db).await.unwrap_err();
        assert!(matches!(err, XbotError::Platform(_)));
    }
}
