//! Reply workflow
//!
//! One run walks every active account, fetches its recent posts and decides
//! for each post, in order:
//!
//! 1. already in the ledger: skip, nothing written
//! 2. daily success quota used up: skip, nothing written
//! 3. classify; a failure is reported and nothing is written, so the post is
//!    retried next run
//! 4. not relevant: `skipped` record
//! 5. dry run: `dry_run` record, no reply, no creative used
//! 6. no creative available: reported, nothing written
//! 7. reply; a failure writes a `failed` record
//! 8. success: creative marked used, `success` record
//!
//! Accounts and posts are handled one at a time, and runs never overlap:
//! the engine holds a lock for the duration of a run, so a scheduled run and
//! a manual trigger queue behind each other and the daily cap holds across
//! both.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::accounts::AccountStore;
use crate::classifier::Classifier;
use crate::config::WorkflowConfig;
use crate::creatives::CreativeSelector;
use crate::error::{Result, XbotError};
use crate::ledger::ReplyLedger;
use crate::platforms::Platform;
use crate::quota::DailyQuota;
use crate::types::{Account, Post, ReplyRecord, ReplyStatus, RunParams, RunReport};

/// Knobs the engine needs from `[workflow]`
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub default_tweet_count: u32,
    pub max_daily_replies: i64,
    pub category: String,
}

impl From<&WorkflowConfig> for WorkflowSettings {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            default_tweet_count: config.default_tweet_count,
            max_daily_replies: config.max_daily_replies,
            category: config.category.clone(),
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            default_tweet_count: 10,
            max_daily_replies: 50,
            category: crate::types::default_category(),
        }
    }
}

/// Terminal state of one post within a run
#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    SkippedSeen,
    SkippedQuota,
    SkippedNotRelevant,
    ClassifyFailed(String),
    /// The ledger could not be read, so the post was left alone
    LedgerFailed(String),
    DryRunLogged,
    AdUnavailable(String),
    ReplyFailed(String),
    Success { reply_id: String },
}

impl PostOutcome {
    /// Fold this outcome into the run counters.
    pub fn tally(&self, report: &mut RunReport, post_id: &str) {
        match self {
            PostOutcome::SkippedSeen
            | PostOutcome::SkippedQuota
            | PostOutcome::SkippedNotRelevant => report.skipped_posts += 1,
            PostOutcome::ClassifyFailed(e) => {
                report.failed_replies += 1;
                report
                    .errors
                    .push(format!("post {}: classification failed: {}", post_id, e));
            }
            PostOutcome::LedgerFailed(e) => {
                report.failed_replies += 1;
                report
                    .errors
                    .push(format!("post {}: ledger unavailable: {}", post_id, e));
            }
            PostOutcome::DryRunLogged => report.relevant_posts += 1,
            PostOutcome::AdUnavailable(e) => {
                report.relevant_posts += 1;
                report.failed_replies += 1;
                report
                    .errors
                    .push(format!("post {}: no creative available: {}", post_id, e));
            }
            PostOutcome::ReplyFailed(e) => {
                report.relevant_posts += 1;
                report.failed_replies += 1;
                report
                    .errors
                    .push(format!("post {}: reply failed: {}", post_id, e));
            }
            PostOutcome::Success { .. } => {
                report.relevant_posts += 1;
                report.successful_replies += 1;
            }
        }
    }
}

pub struct WorkflowEngine {
    platform: Arc<dyn Platform>,
    classifier: Arc<dyn Classifier>,
    ledger: Arc<dyn ReplyLedger>,
    creatives: Arc<dyn CreativeSelector>,
    accounts: Arc<dyn AccountStore>,
    settings: WorkflowSettings,
    quota: DailyQuota,
    run_lock: Mutex<()>,
}

impl WorkflowEngine {
    pub fn new(
        platform: Arc<dyn Platform>,
        classifier: Arc<dyn Classifier>,
        ledger: Arc<dyn ReplyLedger>,
        creatives: Arc<dyn CreativeSelector>,
        accounts: Arc<dyn AccountStore>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            quota: DailyQuota::new(settings.max_daily_replies),
            platform,
            classifier,
            ledger,
            creatives,
            accounts,
            settings,
            run_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    /// Posts to fetch per account for `params`.
    pub fn resolve_tweet_count(&self, params: &RunParams) -> u32 {
        if params.tweet_count <= 0 {
            self.settings.default_tweet_count
        } else {
            u32::try_from(params.tweet_count).unwrap_or(u32::MAX)
        }
    }

    /// Execute one run.
    ///
    /// Fails only when the active accounts cannot be listed. Everything
    /// after that is isolated per account and per post and ends up in the
    /// report.
    pub async fn run(&self, params: RunParams) -> Result<RunReport> {
        let _guard = self.run_lock.lock().await;

        let tweet_count = self.resolve_tweet_count(&params);
        let accounts = self.accounts.active_accounts().await?;

        info!(
            accounts = accounts.len(),
            tweet_count,
            dry_run = params.dry_run,
            "starting workflow run"
        );

        let mut report = RunReport {
            total_accounts: accounts.len(),
            ..Default::default()
        };

        for account in &accounts {
            self.process_account(account, tweet_count, params.dry_run, &mut report)
                .await;
        }

        info!(
            total_posts = report.total_posts,
            relevant = report.relevant_posts,
            success = report.successful_replies,
            failed = report.failed_replies,
            skipped = report.skipped_posts,
            "workflow run finished"
        );

        Ok(report)
    }

    async fn process_account(
        &self,
        account: &Account,
        tweet_count: u32,
        dry_run: bool,
        report: &mut RunReport,
    ) {
        let posts = match self.platform.list_posts(&account.platform_id, tweet_count).await {
            Ok(posts) => posts,
            Err(e) => {
                warn!(account = %account.handle, error = %e, "failed to fetch posts");
                report
                    .errors
                    .push(format!("account @{}: failed to fetch posts: {}", account.handle, e));
                return;
            }
        };

        debug!(account = %account.handle, posts = posts.len(), "fetched posts");
        report.total_posts += posts.len();

        for mut post in posts {
            if post.author_id.is_empty() {
                post.author_id = account.platform_id.clone();
            }
            let outcome = self.process_post(&post, dry_run, report).await;
            debug!(post_id = %post.id, outcome = ?outcome, "post processed");
            outcome.tally(report, &post.id);
        }
    }

    async fn process_post(
        &self,
        post: &Post,
        dry_run: bool,
        report: &mut RunReport,
    ) -> PostOutcome {
        match self.ledger.exists(&post.id).await {
            Ok(true) => return PostOutcome::SkippedSeen,
            Ok(false) => {}
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "ledger lookup failed");
                return PostOutcome::LedgerFailed(e.to_string());
            }
        }

        match self.quota.check(self.ledger.as_ref()).await {
            Ok(_) => {}
            Err(XbotError::DailyLimitReached(max)) => {
                debug!(post_id = %post.id, max, "daily reply limit reached");
                return PostOutcome::SkippedQuota;
            }
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "could not count today's replies");
                return PostOutcome::LedgerFailed(e.to_string());
            }
        }

        let verdict = match self.classifier.classify(&post.text).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "classification failed");
                return PostOutcome::ClassifyFailed(e.to_string());
            }
        };

        if !verdict.relevant {
            let mut record = ReplyRecord::for_post(post, ReplyStatus::Skipped);
            record.classifier_output = Some(verdict.raw);
            self.persist(&record, report).await;
            return PostOutcome::SkippedNotRelevant;
        }

        info!(post_id = %post.id, author = %post.author_id, "relevant post");

        if dry_run {
            let mut record = ReplyRecord::for_post(post, ReplyStatus::DryRun);
            record.relevant = true;
            record.classifier_output = Some(verdict.raw);
            self.persist(&record, report).await;
            return PostOutcome::DryRunLogged;
        }

        let creative = match self.creatives.next(&self.settings.category).await {
            Ok(creative) => creative,
            Err(e) => {
                warn!(
                    post_id = %post.id,
                    category = %self.settings.category,
                    error = %e,
                    "no creative to reply with"
                );
                return PostOutcome::AdUnavailable(e.to_string());
            }
        };

        let reply = match self.platform.reply(&post.id, &creative.content).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(post_id = %post.id, creative_id = creative.id, error = %e, "reply failed");
                let mut record = ReplyRecord::for_post(post, ReplyStatus::Failed);
                record.relevant = true;
                record.creative_id = Some(creative.id);
                record.classifier_output = Some(verdict.raw);
                record.error_message = Some(e.to_string());
                self.persist(&record, report).await;
                return PostOutcome::ReplyFailed(e.to_string());
            }
        };

        if let Err(e) = self.creatives.mark_used(creative.id).await {
            warn!(creative_id = creative.id, error = %e, "failed to mark creative used");
        }

        let mut record = ReplyRecord::for_post(post, ReplyStatus::Success);
        record.relevant = true;
        record.reply_post_id = Some(reply.id.clone());
        record.creative_id = Some(creative.id);
        record.classifier_output = Some(verdict.raw);
        self.persist(&record, report).await;

        info!(post_id = %post.id, reply_id = %reply.id, creative_id = creative.id, "replied");

        PostOutcome::Success { reply_id: reply.id }
    }

    /// Save a terminal record. A failure does not change the outcome; it is
    /// logged and surfaced in the report.
    async fn persist(&self, record: &ReplyRecord, report: &mut RunReport) {
        if let Err(e) = self.ledger.save(record).await {
            warn!(
                post_id = %record.source_post_id,
                status = %record.status,
                error = %e,
                "failed to save reply record"
            );
            report.errors.push(format!(
                "post {}: failed to save {} record: {}",
                record.source_post_id, record.status, e
            ));
        }
    }
}
