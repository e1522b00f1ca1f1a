//! Core types for xbot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An account on the platform that the bot follows and monitors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub platform_id: String,
    pub handle: String,
    pub display_name: String,
    pub active: bool,
}

impl Account {
    pub fn new(platform_id: impl Into<String>, handle: impl Into<String>) -> Self {
        let handle = handle.into();
        Self {
            platform_id: platform_id.into(),
            display_name: handle.clone(),
            handle,
            active: true,
        }
    }
}

/// A single post fetched from the platform. Never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub author_id: String,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Pending,
    Success,
    Failed,
    Skipped,
    DryRun,
}

impl ReplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyStatus::Pending => "pending",
            ReplyStatus::Success => "success",
            ReplyStatus::Failed => "failed",
            ReplyStatus::Skipped => "skipped",
            ReplyStatus::DryRun => "dry_run",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => ReplyStatus::Success,
            "failed" => ReplyStatus::Failed,
            "skipped" => ReplyStatus::Skipped,
            "dry_run" => ReplyStatus::DryRun,
            _ => ReplyStatus::Pending,
        }
    }
}

impl std::fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal record for a source post. At most one exists per
/// `source_post_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplyRecord {
    pub id: Option<i64>,
    pub source_post_id: String,
    pub author_id: String,
    pub post_text: String,
    pub reply_post_id: Option<String>,
    pub creative_id: Option<i64>,
    pub status: ReplyStatus,
    pub relevant: bool,
    pub classifier_output: Option<String>,
    pub error_message: Option<String>,
    pub created_at: i64,
}

impl ReplyRecord {
    /// Start a record for `post` with the given status, stamped now.
    pub fn for_post(post: &Post, status: ReplyStatus) -> Self {
        Self {
            id: None,
            source_post_id: post.id.clone(),
            author_id: post.author_id.clone(),
            post_text: post.text.clone(),
            reply_post_id: None,
            creative_id: None,
            status,
            relevant: false,
            classifier_output: None,
            error_message: None,
            created_at: Utc::now().timestamp(),
        }
    }
}

/// A reusable promotional text eligible for posting as a reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Creative {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub category: String,
    pub priority: i64,
    pub active: bool,
    pub use_count: i64,
    pub last_used_at: Option<i64>,
    pub created_at: i64,
}

/// Input for creating a creative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCreative {
    pub name: String,
    pub content: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub priority: i64,
}

/// Partial edit of a creative; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreativeUpdate {
    pub name: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub priority: Option<i64>,
    pub active: Option<bool>,
}

impl CreativeUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.content.is_none()
            && self.category.is_none()
            && self.priority.is_none()
            && self.active.is_none()
    }
}

pub fn default_category() -> String {
    "hackathon".to_string()
}

/// Parameters for a single workflow run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunParams {
    /// Posts to fetch per account; zero or negative means "use the default".
    #[serde(default)]
    pub tweet_count: i64,
    #[serde(default)]
    pub dry_run: bool,
}

/// Aggregate counters for one workflow execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub total_accounts: usize,
    pub total_posts: usize,
    pub relevant_posts: usize,
    pub successful_replies: usize,
    pub failed_replies: usize,
    pub skipped_posts: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Aggregate counts over the reply ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyStats {
    pub total_count: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub skipped_count: i64,
    pub dry_run_count: i64,
    pub today_count: i64,
    pub today_success_count: i64,
    pub relevant_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_status_round_trips_through_str() {
        for status in [
            ReplyStatus::Pending,
            ReplyStatus::Success,
            ReplyStatus::Failed,
            ReplyStatus::Skipped,
            ReplyStatus::DryRun,
        ] {
            assert_eq!(ReplyStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_reply_status_serializes_snake_case() {
        let json = serde_json::to_string(&ReplyStatus::DryRun).unwrap();
        assert_eq!(json, "\"dry_run\"");
    }

    #[test]
    fn test_run_params_defaults_when_fields_missing() {
        let params: RunParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.tweet_count, 0);
        assert!(!params.dry_run);
    }

    #[test]
    fn test_post_parses_platform_payload() {
        let json =
            r#"{"id":"1","text":"hello","author_id":"42","created_at":"2026-03-01T10:00:00.000Z"}"#;
        let post: Post = serde_json::from_str(json).unwrap();
        assert_eq!(post.author_id, "42");
        assert!(post.created_at.is_some());
    }

    #[test]
    fn test_run_report_omits_empty_errors() {
        let json = serde_json::to_value(RunReport::default()).unwrap();
        assert!(json.get("errors").is_none());
        assert_eq!(json["total_posts"], 0);
    }
}
