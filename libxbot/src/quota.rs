//! Daily reply quota
//!
//! Caps the number of successful replies per UTC day. The count comes from
//! the reply ledger, so the quota survives restarts and is shared by every
//! trigger that goes through the same ledger.

use crate::error::{Result, XbotError};
use crate::ledger::ReplyLedger;

const SECONDS_PER_DAY: i64 = 86_400;

/// Quota guard for successful replies per day
#[derive(Debug, Clone, Copy)]
pub struct DailyQuota {
    max_per_day: i64,
}

impl DailyQuota {
    pub fn new(max_per_day: i64) -> Self {
        Self { max_per_day }
    }

    pub fn max_per_day(&self) -> i64 {
        self.max_per_day
    }

    /// Whether another reply fits, given `used` successes so far today.
    pub fn allows(&self, used: i64) -> bool {
        used < self.max_per_day
    }

    /// Check the ledger and fail with `DailyLimitReached` once the cap is hit.
    pub async fn check(&self, ledger: &dyn ReplyLedger) -> Result<i64> {
        let used = ledger.count_successes_today().await?;
        if !self.allows(used) {
            return Err(XbotError::DailyLimitReached(self.max_per_day));
        }
        Ok(self.max_per_day - used)
    }
}

/// Start of the UTC day containing `timestamp` (floor to midnight)
pub fn day_start(timestamp: i64) -> i64 {
    timestamp - timestamp.rem_euclid(SECONDS_PER_DAY)
}
