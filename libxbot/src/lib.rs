//! xbot - hackathon reply bot
//!
//! This library watches the accounts a bot follows, asks a language model
//! which of their posts are about hackathons, and replies to those posts
//! with a promotional creative, at most once per post and within a daily
//! cap.

pub mod accounts;
pub mod classifier;
pub mod config;
pub mod creatives;
pub mod db;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod platforms;
pub mod quota;
pub mod service;
pub mod types;
pub mod workflow;

// Re-export commonly used types
pub use accounts::{AccountStore, SyncReport, SyncSource};
pub use classifier::{Classifier, Verdict};
pub use config::Config;
pub use creatives::CreativeSelector;
pub use db::Database;
pub use error::{ErrorKind, Result, XbotError};
pub use ledger::ReplyLedger;
pub use platforms::Platform;
pub use service::XbotService;
pub use types::{
    Account, Creative, CreativeUpdate, NewCreative, Post, ReplyRecord, ReplyStats, ReplyStatus,
    RunParams, RunReport,
};
pub use workflow::{WorkflowEngine, WorkflowSettings};
