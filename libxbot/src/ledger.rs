//! Reply ledger: which source posts have been handled, and how
//!
//! The ledger is the exactly-once oracle for the workflow. A record is keyed
//! by the source post id and the storage enforces uniqueness, so a second
//! `save` for the same post fails with `AlreadyExists` instead of creating a
//! duplicate.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::db::{map_insert_error, Database};
use crate::error::{DbError, Result, XbotError};
use crate::quota::day_start;
use crate::types::{ReplyRecord, ReplyStats, ReplyStatus};

#[async_trait]
pub trait ReplyLedger: Send + Sync {
    /// Whether any record exists for this source post.
    async fn exists(&self, source_post_id: &str) -> Result<bool>;

    /// Successful replies recorded since the start of the current UTC day.
    async fn count_successes_today(&self) -> Result<i64>;

    /// Persist a terminal record. Fails with `AlreadyExists` if the post
    /// already has one.
    async fn save(&self, record: &ReplyRecord) -> Result<()>;
}

#[async_trait]
impl ReplyLedger for Database {
    async fn exists(&self, source_post_id: &str) -> Result<bool> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COUNT(*) FROM reply_records WHERE source_post_id = ?
            "#,
        )
        .bind(source_post_id)
        .fetch_one(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.0 > 0)
    }

    async fn count_successes_today(&self) -> Result<i64> {
        let since = day_start(chrono::Utc::now().timestamp());
        self.count_successes_since(since).await
    }

    async fn save(&self, record: &ReplyRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reply_records (
                source_post_id, author_id, post_text, reply_post_id, creative_id,
                status, relevant, classifier_output, error_message, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.source_post_id)
        .bind(&record.author_id)
        .bind(&record.post_text)
        .bind(&record.reply_post_id)
        .bind(record.creative_id)
        .bind(record.status.as_str())
        .bind(record.relevant)
        .bind(&record.classifier_output)
        .bind(&record.error_message)
        .bind(record.created_at)
        .execute(self.pool())
        .await
        .map_err(|e| {
            map_insert_error(e, || {
                format!("reply record for post {}", record.source_post_id)
            })
        })?;

        Ok(())
    }
}

impl Database {
    pub async fn count_successes_since(&self, since: i64) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COUNT(*) FROM reply_records
            WHERE status = 'success' AND created_at >= ?
            "#,
        )
        .bind(since)
        .fetch_one(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.0)
    }

    /// Look up the record for a source post
    pub async fn get_reply_record(&self, source_post_id: &str) -> Result<Option<ReplyRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, source_post_id, author_id, post_text, reply_post_id, creative_id,
                   status, relevant, classifier_output, error_message, created_at
            FROM reply_records WHERE source_post_id = ?
            "#,
        )
        .bind(source_post_id)
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.as_ref().map(record_from_row))
    }

    /// Most recent records first
    pub async fn recent_reply_records(&self, limit: usize) -> Result<Vec<ReplyRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_post_id, author_id, post_text, reply_post_id, creative_id,
                   status, relevant, classifier_output, error_message, created_at
            FROM reply_records
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    /// Aggregate counts across the whole ledger
    pub async fn reply_stats(&self) -> Result<ReplyStats> {
        let today = day_start(chrono::Utc::now().timestamp());

        let row = sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64, i64, i64)>(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(status = 'success'), 0),
                COALESCE(SUM(status = 'failed'), 0),
                COALESCE(SUM(status = 'skipped'), 0),
                COALESCE(SUM(status = 'dry_run'), 0),
                COALESCE(SUM(created_at >= ?1), 0),
                COALESCE(SUM(created_at >= ?1 AND status = 'success'), 0),
                COALESCE(SUM(relevant = 1), 0)
            FROM reply_records
            "#,
        )
        .bind(today)
        .fetch_one(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(ReplyStats {
            total_count: row.0,
            success_count: row.1,
            failed_count: row.2,
            skipped_count: row.3,
            dry_run_count: row.4,
            today_count: row.5,
            today_success_count: row.6,
            relevant_count: row.7,
        })
    }
}

fn record_from_row(r: &sqlx::sqlite::SqliteRow) -> ReplyRecord {
    use sqlx::Row;

    ReplyRecord {
        id: r.get("id"),
        source_post_id: r.get("source_post_id"),
        author_id: r.get("author_id"),
        post_text: r.get("post_text"),
        reply_post_id: r.get("reply_post_id"),
        creative_id: r.get("creative_id"),
        status: ReplyStatus::parse(&r.get::<String, _>("status")),
        relevant: r.get::<i64, _>("relevant") != 0,
        classifier_output: r.get("classifier_output"),
        error_message: r.get("error_message"),
        created_at: r.get("created_at"),
    }
}

/// In-memory ledger for tests and dry experiments
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<HashMap<String, ReplyRecord>>,
    unavailable: Mutex<bool>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a record as if an earlier run had handled the post.
    pub fn mark_seen(&self, source_post_id: &str, status: ReplyStatus) {
        let record = ReplyRecord {
            id: None,
            source_post_id: source_post_id.to_string(),
            author_id: String::new(),
            post_text: String::new(),
            reply_post_id: None,
            creative_id: None,
            status,
            relevant: false,
            classifier_output: None,
            error_message: None,
            created_at: chrono::Utc::now().timestamp(),
        };
        self.records
            .lock()
            .unwrap()
            .insert(source_post_id.to_string(), record);
    }

    /// Make every call fail as if the backing store were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn get(&self, source_post_id: &str) -> Option<ReplyRecord> {
        self.records.lock().unwrap().get(source_post_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<()> {
        if *self.unavailable.lock().unwrap() {
            return Err(DbError::IoError(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "ledger unavailable",
            ))
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl ReplyLedger for MemoryLedger {
    async fn exists(&self, source_post_id: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self.records.lock().unwrap().contains_key(source_post_id))
    }

    async fn count_successes_today(&self) -> Result<i64> {
        self.ensure_available()?;
        let since = day_start(chrono::Utc::now().timestamp());
        let count = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status == ReplyStatus::Success && r.created_at >= since)
            .count();
        Ok(count as i64)
    }

    async fn save(&self, record: &ReplyRecord) -> Result<()> {
        self.ensure_available()?;
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.source_post_id) {
            return Err(XbotError::AlreadyExists(format!(
                "reply record for post {}",
                record.source_post_id
            )));
        }
        records.insert(record.source_post_id.clone(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Post;
    use tempfile::TempDir;

    async fn setup_test_db() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(&db_path.to_string_lossy()).await.unwrap();
        (temp_dir, db)
    }

    fn record(id: &str, status: ReplyStatus) -> ReplyRecord {
        let post = Post {
            id: id.to_string(),
            author_id: "author-1".to_string(),
            text: "Join our hackathon this weekend".to_string(),
            created_at: None,
        };
        ReplyRecord::for_post(&post, status)
    }

    #[tokio::test]
    async fn test_exists_after_save() {
        let (_dir, db) = setup_test_db().await;

        assert!(!db.exists("100").await.unwrap());
        db.save(&record("100", ReplyStatus::Skipped)).await.unwrap();
        assert!(db.exists("100").await.unwrap());
        assert!(!db.exists("101").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_save_is_already_exists() {
        let (_dir, db) = setup_test_db().await;

        db.save(&record("100", ReplyStatus::DryRun)).await.unwrap();
        let err = db
            .save(&record("100", ReplyStatus::Success))
            .await
            .unwrap_err();

        assert!(matches!(err, XbotError::AlreadyExists(_)));
        // The first record is untouched
        let stored = db.get_reply_record("100").await.unwrap().unwrap();
        assert_eq!(stored.status, ReplyStatus::DryRun);
    }

    #[tokio::test]
    async fn test_count_successes_today_ignores_other_statuses_and_days() {
        let (_dir, db) = setup_test_db().await;

        db.save(&record("1", ReplyStatus::Success)).await.unwrap();
        db.save(&record("2", ReplyStatus::Success)).await.unwrap();
        db.save(&record("3", ReplyStatus::DryRun)).await.unwrap();
        db.save(&record("4", ReplyStatus::Failed)).await.unwrap();

        let mut yesterday = record("5", ReplyStatus::Success);
        yesterday.created_at = day_start(chrono::Utc::now().timestamp()) - 60;
        db.save(&yesterday).await.unwrap();

        assert_eq!(db.count_successes_today().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_record_fields_round_trip() {
        let (_dir, db) = setup_test_db().await;

        let mut rec = record("42", ReplyStatus::Success);
        rec.reply_post_id = Some("9001".to_string());
        rec.relevant = true;
        rec.classifier_output = Some(r#"{"is_hackathon_related": true}"#.to_string());
        db.save(&rec).await.unwrap();

        let stored = db.get_reply_record("42").await.unwrap().unwrap();
        assert!(stored.id.is_some());
        assert_eq!(stored.reply_post_id.as_deref(), Some("9001"));
        assert_eq!(stored.author_id, "author-1");
        assert!(stored.relevant);
        assert_eq!(stored.classifier_output, rec.classifier_output);
        assert_eq!(stored.creative_id, None);
    }

    #[tokio::test]
    async fn test_recent_records_newest_first_with_limit() {
        let (_dir, db) = setup_test_db().await;

        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let mut rec = record(id, ReplyStatus::Skipped);
            rec.created_at = 1_000 + i as i64;
            db.save(&rec).await.unwrap();
        }

        let recent = db.recent_reply_records(2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|r| r.source_post_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_reply_stats() {
        let (_dir, db) = setup_test_db().await;

        let mut relevant = record("1", ReplyStatus::Success);
        relevant.relevant = true;
        db.save(&relevant).await.unwrap();
        db.save(&record("2", ReplyStatus::Skipped)).await.unwrap();
        db.save(&record("3", ReplyStatus::Failed)).await.unwrap();
        let mut old = record("4", ReplyStatus::DryRun);
        old.created_at = 10;
        db.save(&old).await.unwrap();

        let stats = db.reply_stats().await.unwrap();
        assert_eq!(stats.total_count, 4);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failed_count, 1);
        assert_eq!(stats.skipped_count, 1);
        assert_eq!(stats.dry_run_count, 1);
        assert_eq!(stats.today_count, 3);
        assert_eq!(stats.today_success_count, 1);
        assert_eq!(stats.relevant_count, 1);
    }

    #[tokio::test]
    async fn test_reply_stats_on_empty_ledger() {
        let (_dir, db) = setup_test_db().await;
        assert_eq!(db.reply_stats().await.unwrap(), ReplyStats::default());
    }

    #[tokio::test]
    async fn test_memory_ledger_matches_database_semantics() {
        let ledger = MemoryLedger::new();
        ledger.save(&record("1", ReplyStatus::Success)).await.unwrap();
        assert!(ledger.exists("1").await.unwrap());
        assert!(matches!(
            ledger.save(&record("1", ReplyStatus::Failed)).await,
            Err(XbotError::AlreadyExists(_))
        ));
        assert_eq!(ledger.count_successes_today().await.unwrap(), 1);

        ledger.set_unavailable(true);
        assert!(ledger.exists("1").await.is_err());
    }
}
