//! Mock platform implementation for testing
//!
//! A configurable platform that serves canned accounts and posts, can be told
//! to fail individual operations, and records every call so tests can assert
//! on what the workflow did without network access.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::{clamp_post_count, Platform};
use crate::types::{Account, Post};

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name used in logs
    pub name: String,

    /// Account returned by `identify`
    pub identity: Account,

    /// Accounts returned by `list_followed`
    pub following: Vec<Account>,

    /// Posts served per account id, newest first
    pub posts: HashMap<String, Vec<Post>>,

    /// Whether `identify` fails
    pub fail_identify: bool,

    /// Whether `list_followed` fails
    pub fail_following: bool,

    /// Account ids whose `list_posts` fails
    pub failing_accounts: HashSet<String>,

    /// Error returned by `reply`, if any
    pub reply_error: Option<String>,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Number of times identify has been called
    pub identify_call_count: Arc<Mutex<usize>>,

    /// Number of times list_posts has been called
    pub list_posts_call_count: Arc<Mutex<usize>>,

    /// Replies that were attempted, as (post id, text)
    pub replies: Arc<Mutex<Vec<(String, String)>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            identity: Account::new("0", "xbot"),
            following: Vec::new(),
            posts: HashMap::new(),
            fail_identify: false,
            fail_following: false,
            failing_accounts: HashSet::new(),
            reply_error: None,
            delay: Duration::from_millis(0),
            identify_call_count: Arc::new(Mutex::new(0)),
            list_posts_call_count: Arc::new(Mutex::new(0)),
            replies: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform for testing
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    /// Create a mock platform with the given configuration
    pub fn with_config(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock platform that serves `posts` for a single account
    pub fn with_posts(account_id: &str, posts: Vec<Post>) -> Self {
        let mut config = MockConfig::default();
        config.posts.insert(account_id.to_string(), posts);
        Self::with_config(config)
    }

    /// Create a mock platform whose replies always fail
    pub fn reply_failure(error: &str) -> Self {
        Self::with_config(MockConfig {
            reply_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// Get the number of times identify was called
    pub fn identify_call_count(&self) -> usize {
        *self.config.identify_call_count.lock().unwrap()
    }

    /// Get the number of times list_posts was called
    pub fn list_posts_call_count(&self) -> usize {
        *self.config.list_posts_call_count.lock().unwrap()
    }

    /// Get the number of reply attempts
    pub fn reply_call_count(&self) -> usize {
        self.config.replies.lock().unwrap().len()
    }

    /// Get every attempted reply as (post id, text)
    pub fn replies(&self) -> Vec<(String, String)> {
        self.config.replies.lock().unwrap().clone()
    }

    async fn simulate_latency(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn identify(&self) -> Result<Account> {
        *self.config.identify_call_count.lock().unwrap() += 1;
        self.simulate_latency().await;

        if self.config.fail_identify {
            return Err(PlatformError::from_status("mock", 401, "identify failed").into());
        }
        Ok(self.config.identity.clone())
    }

    async fn list_followed(&self, _account_id: &str) -> Result<Vec<Account>> {
        self.simulate_latency().await;

        if self.config.fail_following {
            return Err(PlatformError::from_status("mock", 403, "following unavailable").into());
        }
        Ok(self.config.following.clone())
    }

    async fn list_posts(&self, account_id: &str, count: u32) -> Result<Vec<Post>> {
        *self.config.list_posts_call_count.lock().unwrap() += 1;
        self.simulate_latency().await;

        if self.config.failing_accounts.contains(account_id) {
            return Err(PlatformError::from_status(
                "mock",
                500,
                format!("timeline for {} unavailable", account_id),
            )
            .into());
        }

        let count = clamp_post_count(count) as usize;
        Ok(self
            .config
            .posts
            .get(account_id)
            .map(|posts| posts.iter().take(count).cloned().collect())
            .unwrap_or_default())
    }

    async fn reply(&self, post_id: &str, text: &str) -> Result<Post> {
        self.config
            .replies
            .lock()
            .unwrap()
            .push((post_id.to_string(), text.to_string()));
        self.simulate_latency().await;

        if let Some(error) = &self.config.reply_error {
            return Err(PlatformError::from_status("mock", 500, error.clone()).into());
        }

        Ok(Post {
            id: format!("{}-reply-{}", self.config.name, uuid::Uuid::new_v4()),
            author_id: self.config.identity.platform_id.clone(),
            text: text.to_string(),
            created_at: Some(chrono::Utc::now()),
        })
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}
