//! Device availability.
//!
//! Every device record owns an [`AvailabilityTracker`]; freshness is judged
//! against a workspace-wide [`AvailabilityPolicy`].

use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Upper bound for the refresh ticker period.
pub const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// How long a device may stay silent before it is reported unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityPolicy {
    /// Timeout in seconds, `0` means "always available".
    pub timeout_secs: u64,
}

impl AvailabilityPolicy {
    #[must_use]
    pub const fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    /// A policy under which every device is always available.
    #[must_use]
    pub const fn always() -> Self {
        Self { timeout_secs: 0 }
    }

    /// Period of the availability refresh ticker: `min(timeout, 300s)`.
    ///
    /// Returns `None` when the timeout is disabled, in which case no ticker
    /// is needed.
    #[must_use]
    pub fn refresh_interval(self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            return None;
        }
        Some(Duration::from_secs(self.timeout_secs).min(MAX_REFRESH_INTERVAL))
    }
}

impl Default for AvailabilityPolicy {
    fn default() -> Self {
        Self::new(300)
    }
}

/// Per-device last-seen clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityTracker {
    last_seen: Option<Timestamp>,
    assumed: bool,
}

impl Default for AvailabilityTracker {
    fn default() -> Self {
        Self {
            last_seen: None,
            assumed: true,
        }
    }
}

impl AvailabilityTracker {
    /// Record a message for this device at `at`.
    ///
    /// `last_seen` never moves backwards. Returns `true` when this call
    /// confirmed the device, i.e. flipped `assumed` to `false`.
    pub fn mark_seen(&mut self, at: Timestamp) -> bool {
        self.last_seen = Some(match self.last_seen {
            Some(previous) if previous > at => previous,
            _ => at,
        });
        let confirmed = self.assumed;
        self.assumed = false;
        confirmed
    }

    /// `true` until the first real status message has been observed.
    #[must_use]
    pub fn is_assumed(&self) -> bool {
        self.assumed
    }

    #[must_use]
    pub fn last_seen(&self) -> Option<Timestamp> {
        self.last_seen
    }

    #[must_use]
    pub fn is_available(&self, policy: AvailabilityPolicy, at: Timestamp) -> bool {
        if policy.timeout_secs == 0 || self.assumed {
            return true;
        }
        let Some(last_seen) = self.last_seen else {
            return false;
        };
        let timeout = i64::try_from(policy.timeout_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        at - last_seen <= timeout
    }
}
