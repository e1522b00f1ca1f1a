//! Promotional creatives used as reply text
//!
//! Selection favours higher priority first, then the least used creative,
//! with ties broken at random so equal creatives rotate.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::db::Database;
use crate::error::{DbError, Result, XbotError};
use crate::types::{Creative, CreativeUpdate, NewCreative};

#[async_trait]
pub trait CreativeSelector: Send + Sync {
    /// Pick the next active creative in `category`.
    ///
    /// Returns `XbotError::NotFound` when the category has no active creative.
    async fn next(&self, category: &str) -> Result<Creative>;

    /// Increment the use count and stamp the last-used time.
    async fn mark_used(&self, creative_id: i64) -> Result<()>;
}

#[async_trait]
impl CreativeSelector for Database {
    async fn next(&self, category: &str) -> Result<Creative> {
        let row = sqlx::query(
            r#"
            SELECT id, name, content, category, priority, active, use_count,
                   last_used_at, created_at
            FROM creatives
            WHERE category = ? AND active = 1
            ORDER BY priority DESC, use_count ASC, RANDOM()
            LIMIT 1
            "#,
        )
        .bind(category)
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(creative_from_row).ok_or_else(|| {
            XbotError::NotFound(format!("no active creative in category {}", category))
        })
    }

    async fn mark_used(&self, creative_id: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE creatives
            SET use_count = use_count + 1, last_used_at = ?
            WHERE id = ?
            "#,
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(creative_id)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(XbotError::NotFound(format!("creative {}", creative_id)));
        }
        Ok(())
    }
}

impl Database {
    /// Create an active creative and return it
    pub async fn create_creative(&self, new: &NewCreative) -> Result<Creative> {
        if new.name.trim().is_empty() {
            return Err(XbotError::InvalidInput("creative name cannot be empty".to_string()));
        }
        if new.content.trim().is_empty() {
            return Err(XbotError::InvalidInput(
                "creative content cannot be empty".to_string(),
            ));
        }

        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO creatives (name, content, category, priority, active, use_count, created_at)
            VALUES (?, ?, ?, ?, 1, 0, ?)
            "#,
        )
        .bind(&new.name)
        .bind(&new.content)
        .bind(&new.category)
        .bind(new.priority)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(Creative {
            id: result.last_insert_rowid(),
            name: new.name.clone(),
            content: new.content.clone(),
            category: new.category.clone(),
            priority: new.priority,
            active: true,
            use_count: 0,
            last_used_at: None,
            created_at: now,
        })
    }

    /// List creatives, optionally restricted to one category
    pub async fn list_creatives(&self, category: Option<&str>) -> Result<Vec<Creative>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, content, category, priority, active, use_count,
                   last_used_at, created_at
            FROM creatives
            WHERE ?1 IS NULL OR category = ?1
            ORDER BY priority DESC, id ASC
            "#,
        )
        .bind(category)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(creative_from_row).collect())
    }

    pub async fn set_creative_active(&self, creative_id: i64, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE creatives SET active = ? WHERE id = ?")
            .bind(active)
            .bind(creative_id)
            .execute(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(XbotError::NotFound(format!("creative {}", creative_id)));
        }
        Ok(())
    }

    pub async fn get_creative(&self, creative_id: i64) -> Result<Creative> {
        let row = sqlx::query(
            r#"
            SELECT id, name, content, category, priority, active, use_count,
                   last_used_at, created_at
            FROM creatives
            WHERE id = ?
            "#,
        )
        .bind(creative_id)
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref()
            .map(creative_from_row)
            .ok_or_else(|| XbotError::NotFound(format!("creative {}", creative_id)))
    }

    /// Apply a partial edit. Use count and last-used time are kept.
    pub async fn update_creative(
        &self,
        creative_id: i64,
        update: &CreativeUpdate,
    ) -> Result<Creative> {
        if update.is_empty() {
            return Err(XbotError::InvalidInput("nothing to update".to_string()));
        }

        let mut creative = self.get_creative(creative_id).await?;
        if let Some(name) = &update.name {
            creative.name = name.clone();
        }
        if let Some(content) = &update.content {
            creative.content = content.clone();
        }
        if let Some(category) = &update.category {
            creative.category = category.clone();
        }
        if let Some(priority) = update.priority {
            creative.priority = priority;
        }
        if let Some(active) = update.active {
            creative.active = active;
        }

        if creative.name.trim().is_empty() {
            return Err(XbotError::InvalidInput("creative name cannot be empty".to_string()));
        }
        if creative.content.trim().is_empty() {
            return Err(XbotError::InvalidInput(
                "creative content cannot be empty".to_string(),
            ));
        }

        sqlx::query(
            r#"
            UPDATE creatives
            SET name = ?, content = ?, category = ?, priority = ?, active = ?
            WHERE id = ?
            "#,
        )
        .bind(&creative.name)
        .bind(&creative.content)
        .bind(&creative.category)
        .bind(creative.priority)
        .bind(creative.active)
        .bind(creative_id)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(creative)
    }

    /// Delete a creative that has never been used in a reply record. Used
    /// creatives stay referenced by the ledger and can only be disabled.
    pub async fn delete_creative(&self, creative_id: i64) -> Result<()> {
        let references: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reply_records WHERE creative_id = ?")
                .bind(creative_id)
                .fetch_one(self.pool())
                .await
                .map_err(DbError::SqlxError)?;

        if references > 0 {
            return Err(XbotError::InvalidInput(format!(
                "creative {} is referenced by {} reply record(s); disable it instead",
                creative_id, references
            )));
        }

        let result = sqlx::query("DELETE FROM creatives WHERE id = ?")
            .bind(creative_id)
            .execute(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(XbotError::NotFound(format!("creative {}", creative_id)));
        }
        Ok(())
    }
}

fn creative_from_row(r: &sqlx::sqlite::SqliteRow) -> Creative {
    use sqlx::Row;

    Creative {
        id: r.get("id"),
        name: r.get("name"),
        content: r.get("content"),
        category: r.get("category"),
        priority: r.get("priority"),
        active: r.get::<i64, _>("active") != 0,
        use_count: r.get("use_count"),
        last_used_at: r.get("last_used_at"),
        created_at: r.get("created_at"),
    }
}

/// In-memory selector with the same ordering rules, minus the random
/// tie-break (ties go to the lowest id).
#[derive(Default)]
pub struct MemoryCreatives {
    creatives: Mutex<Vec<Creative>>,
    fail_mark_used: Mutex<bool>,
}

impl MemoryCreatives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: &str, content: &str, category: &str, priority: i64) -> i64 {
        let mut creatives = self.creatives.lock().unwrap();
        let id = creatives.len() as i64 + 1;
        creatives.push(Creative {
            id,
            name: name.to_string(),
            content: content.to_string(),
            category: category.to_string(),
            priority,
            active: true,
            use_count: 0,
            last_used_at: None,
            created_at: chrono::Utc::now().timestamp(),
        });
        id
    }

    pub fn get(&self, creative_id: i64) -> Option<Creative> {
        self.creatives
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == creative_id)
            .cloned()
    }

    /// Make `mark_used` fail, to exercise the log-only path.
    pub fn set_fail_mark_used(&self, fail: bool) {
        *self.fail_mark_used.lock().unwrap() = fail;
    }
}

#[async_trait]
impl CreativeSelector for MemoryCreatives {
    async fn next(&self, category: &str) -> Result<Creative> {
        self.creatives
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.active && c.category == category)
            .min_by_key(|c| (-c.priority, c.use_count, c.id))
            .cloned()
            .ok_or_else(|| {
                XbotError::NotFound(format!("no active creative in category {}", category))
            })
    }

    async fn mark_used(&self, creative_id: i64) -> Result<()> {
        if *self.fail_mark_used.lock().unwrap() {
            return Err(XbotError::NotFound(format!("creative {}", creative_id)));
        }
        let mut creatives = self.creatives.lock().unwrap();
        let creative = creatives
            .iter_mut()
            .find(|c| c.id == creative_id)
            .ok_or_else(|| XbotError::NotFound(format!("creative {}", creative_id)))?;
        creative.use_count += 1;
        creative.last_used_at = Some(chrono::Utc::now().timestamp());
        Ok(())
    }
}
