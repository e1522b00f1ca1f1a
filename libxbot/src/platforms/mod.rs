//! Platform abstraction and implementations
//!
//! The workflow talks to the social platform only through the [`Platform`]
//! trait. [`x::XClient`] is the production implementation, signing every
//! request with [`oauth::RequestSigner`]; [`mock::MockPlatform`] is a
//! configurable stand-in for tests.
//!
//! # Examples
//!
//! ```no_run
//! use libxbot::platforms::{Platform, x::XClient};
//! use libxbot::config::Config;
//!
//! # async fn example() -> libxbot::error::Result<()> {
//! let config = Config::load()?;
//! let client = XClient::new(&config.platform)?;
//!
//! let me = client.identify().await?;
//! for post in client.list_posts(&me.platform_id, 10).await? {
//!     println!("{}: {}", post.id, post.text);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Account, Post};

pub mod oauth;
pub mod x;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Smallest page the platform accepts for a timeline request
pub const MIN_POST_COUNT: u32 = 5;
/// Largest page the platform accepts for a timeline request
pub const MAX_POST_COUNT: u32 = 100;

/// Platform trait for the read and reply operations the bot needs
///
/// Every call is a single attempt; implementations do not retry. Errors
/// from the platform surface as `PlatformError` wrapped in `XbotError`.
#[async_trait]
pub trait Platform: Send + Sync {
    /// The account the credentials belong to
    ///
    /// Implementations may memoize the first successful answer for the
    /// lifetime of the client. A failed call is not cached.
    async fn identify(&self) -> Result<Account>;

    /// Every account `account_id` follows
    ///
    /// Follows pagination to the end. The first failing page fails the
    /// whole call; partial results are discarded.
    async fn list_followed(&self, account_id: &str) -> Result<Vec<Account>>;

    /// The most recent posts of `account_id`, newest first
    ///
    /// `count` is clamped to the range the platform accepts (see
    /// [`clamp_post_count`]).
    async fn list_posts(&self, account_id: &str, count: u32) -> Result<Vec<Post>>;

    /// Publish `text` as a reply to `post_id` and return the created post
    async fn reply(&self, post_id: &str, text: &str) -> Result<Post>;

    /// Lowercase identifier used in logs (e.g. "x")
    fn name(&self) -> &str;
}

/// Clamp a requested post count to [`MIN_POST_COUNT`, `MAX_POST_COUNT`].
pub fn clamp_post_count(count: u32) -> u32 {
    count.clamp(MIN_POST_COUNT, MAX_POST_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_post_count() {
        assert_eq!(clamp_post_count(1000), 100);
        assert_eq!(clamp_post_count(1), 5);
        assert_eq!(clamp_post_count(0), 5);
        assert_eq!(clamp_post_count(5), 5);
        assert_eq!(clamp_post_count(42), 42);
        assert_eq!(clamp_post_count(100), 100);
    }
}
