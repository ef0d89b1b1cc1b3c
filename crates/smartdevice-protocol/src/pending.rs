//! In-flight request bookkeeping.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A request sent to the device that has not been answered yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Message ID, reused by every resend
    pub id: u64,
    pub method: String,
    pub params: Option<JsonValue>,
    /// Timestamp of the latest transmission
    pub sent_at: DateTime<Utc>,
    /// Number of resends so far
    pub repeat: u32,
}

impl PendingRequest {
    pub fn new(
        id: u64,
        method: impl Into<String>,
        params: Option<JsonValue>,
        repeat: u32,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            method: method.into(),
            params,
            sent_at,
            repeat,
        }
    }

    /// Time since the latest transmission.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now - self.sent_at
    }

    /// Whether the reply is overdue at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.elapsed(now) > timeout
    }

    /// Whether another resend fits in the retry budget.
    pub fn can_retry(&self, max_repeats: u32) -> bool {
        self.repeat < max_repeats
    }
}
