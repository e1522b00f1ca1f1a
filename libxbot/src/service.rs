//! Service layer for xbot
//!
//! `XbotService` wires the production collaborators together (SQLite ledger,
//! creative and account stores, the X client and the configured classifier)
//! and exposes the operations the daemon and the CLI share.
//!
//! # Example
//!
//! ```no_run
//! use libxbot::service::XbotService;
//! use libxbot::types::RunParams;
//!
//! # async fn example() -> libxbot::Result<()> {
//! let service = XbotService::new().await?;
//!
//! let report = service
//!     .run(RunParams { tweet_count: 20, dry_run: true })
//!     .await?;
//! println!("{} relevant posts", report.relevant_posts);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::accounts::{self, SyncReport};
use crate::classifier::{create_classifier, Classifier};
use crate::config::{resolve_db_path, Config};
use crate::db::Database;
use crate::error::Result;
use crate::platforms::{x::XClient, Platform};
use crate::types::{ReplyRecord, ReplyStats, RunParams, RunReport};
use crate::workflow::{WorkflowEngine, WorkflowSettings};

/// Default number of records returned by [`XbotService::recent_records`]
pub const DEFAULT_RECENT_LIMIT: usize = 20;
/// Upper bound for [`XbotService::recent_records`]
pub const MAX_RECENT_LIMIT: usize = 100;

/// Main service facade
///
/// Cheap to share behind an `Arc`; the engine inside serializes runs.
pub struct XbotService {
    config: Arc<Config>,
    db: Database,
    engine: Arc<WorkflowEngine>,
}

impl XbotService {
    /// Create a service from the default configuration file
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Create a service with the production platform and classifier
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Platform credentials are missing
    /// - Database cannot be initialized or migrated
    pub async fn from_config(config: Config) -> Result<Self> {
        let platform: Arc<dyn Platform> = Arc::new(XClient::new(&config.platform)?);
        let classifier: Arc<dyn Classifier> = Arc::from(create_classifier(&config.classifier)?);

        let db_path = resolve_db_path(&config.database.path);
        let db = Database::new(&db_path.to_string_lossy()).await?;

        Ok(Self::with_components(config, db, platform, classifier))
    }

    /// Assemble a service around an open database and explicit platform and
    /// classifier implementations.
    pub fn with_components(
        config: Config,
        db: Database,
        platform: Arc<dyn Platform>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        let store = Arc::new(db.clone());
        let engine = WorkflowEngine::new(
            platform,
            classifier,
            store.clone(),
            store.clone(),
            store,
            WorkflowSettings::from(&config.workflow),
        );

        Self {
            config: Arc::new(config),
            db,
            engine: Arc::new(engine),
        }
    }

    /// Run the reply workflow once
    pub async fn run(&self, params: RunParams) -> Result<RunReport> {
        self.engine.run(params).await
    }

    /// Refresh the monitored accounts from the platform's following list
    pub async fn sync_following(&self) -> Result<SyncReport> {
        accounts::sync_following(self.engine.platform().as_ref(), &self.db).await
    }

    pub async fn stats(&self) -> Result<ReplyStats> {
        self.db.reply_stats().await
    }

    /// Newest reply records first. `None` or zero means the default limit;
    /// larger requests are capped.
    pub async fn recent_records(&self, limit: Option<usize>) -> Result<Vec<ReplyRecord>> {
        self.db.recent_reply_records(clamp_recent_limit(limit)).await
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }
}

pub fn clamp_recent_limit(limit: Option<usize>) -> usize {
    match limit {
        None | Some(0) => DEFAULT_RECENT_LIMIT,
        Some(n) => n.min(MAX_RECENT_LIMIT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::mock::{MockAnswer, MockClassifier};
    use crate::creatives::CreativeSelector;
    use crate::platforms::mock::{MockConfig, MockPlatform};
    use crate::types::{Account, NewCreative, Post};
    use tempfile::TempDir;

    const CONFIG: &str = r#"
        [platform]
        consumer_key = "ck"
        consumer_secret = "cs"
        access_token = "at"
        access_secret = "as"

        [classifier]
        model = "test-model"

        [workflow]
        max_daily_replies = 1
    "#;

    async fn service(platform: MockPlatform) -> (TempDir, XbotService) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("service.db");
        let db = Database::new(&db_path.to_string_lossy()).await.unwrap();
        let config = Config::from_toml(CONFIG).unwrap();
        let classifier = MockClassifier::new(MockAnswer::Relevant);
        let service =
            XbotService::with_components(config, db, Arc::new(platform), Arc::new(classifier));
        (temp_dir, service)
    }

    fn post(id: &str) -> Post {
        Post {
            id: id.to_string(),
            author_id: "7".to_string(),
            text: format!("hackathon {}", id),
            created_at: None,
        }
    }

    #[test]
    fn test_clamp_recent_limit() {
        assert_eq!(clamp_recent_limit(None), 20);
        assert_eq!(clamp_recent_limit(Some(0)), 20);
        assert_eq!(clamp_recent_limit(Some(5)), 5);
        assert_eq!(clamp_recent_limit(Some(500)), 100);
    }

    #[tokio::test]
    async fn test_sync_then_run_against_sqlite() {
        let mut config = MockConfig {
            following: vec![Account::new("7", "builder")],
            ..Default::default()
        };
        config.posts.insert("7".to_string(), vec![post("a"), post("b")]);
        let (_dir, service) = service(MockPlatform::with_config(config)).await;

        service
            .database()
            .create_creative(&NewCreative {
                name: "promo".to_string(),
                content: "Ship it at our hackathon".to_string(),
                category: "hackathon".to_string(),
                priority: 0,
            })
            .await
            .unwrap();

        let sync = service.sync_following().await.unwrap();
        assert_eq!(sync.total, 1);

        let report = service.run(RunParams::default()).await.unwrap();
        assert_eq!(report.total_accounts, 1);
        assert_eq!(report.total_posts, 2);
        // max_daily_replies = 1
        assert_eq!(report.successful_replies, 1);
        assert_eq!(report.skipped_posts, 1);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.today_success_count, 1);

        let records = service.recent_records(None).await.unwrap();
        assert_eq!(records.len(), 1);

        let creative = service.database().next("hackathon").await.unwrap();
        assert_eq!(creative.use_count, 1);
    }
}
