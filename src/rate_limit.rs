use std::collections::VecDeque;
use std::num::NonZeroU32;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::warn;

pub const DEFAULT_QUOTA_LIMIT: u32 = 50;
pub const DEFAULT_QUOTA_WINDOW_SECS: u64 = 24 * 60 * 60;
/// Ten years. Keeps `instant + window` well inside chrono's range.
pub const MAX_QUOTA_WINDOW_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// How many queries a session may issue within a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub limit: NonZeroU32,
    pub window: TimeDelta,
}

impl QuotaPolicy {
    pub fn new(limit: NonZeroU32, window: TimeDelta) -> Self {
        Self { limit, window }
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            limit: NonZeroU32::new(DEFAULT_QUOTA_LIMIT).unwrap_or(NonZeroU32::MIN),
            window: TimeDelta::seconds(DEFAULT_QUOTA_WINDOW_SECS as i64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Reject { retry_after: TimeDelta },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit)
    }
}

/// Sliding-window history of the queries one session has spent.
///
/// Timestamps are only appended through [`SessionQuota::record`] and are
/// pruned lazily by [`SessionQuota::check`]. The window is the half-open
/// interval `(now - window, now]`: an entry exactly `window` old has expired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionQuota {
    timestamps: VecDeque<DateTime<Utc>>,
}

impl SessionQuota {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prunes expired entries, then decides whether one more query fits.
    ///
    /// Pruning sticks even when the query is rejected. Admission does not
    /// consume a slot; call [`SessionQuota::record`] once the gated call
    /// has succeeded.
    pub fn check(&mut self, now: DateTime<Utc>, policy: &QuotaPolicy) -> Admission {
        self.prune_expired(now, policy);

        if self.timestamps.len() < policy.limit.get() as usize {
            return Admission::Admit;
        }

        // `record` keeps the history ordered, so the front is the oldest.
        let Some(oldest) = self.timestamps.front() else {
            unreachable!("rejection with a non-zero limit implies a non-empty history");
        };
        let retry_after = oldest
            .checked_add_signed(policy.window)
            .map_or(TimeDelta::MAX, |frees_at| frees_at.signed_duration_since(now));
        Admission::Reject { retry_after }
    }

    /// Spends one slot at `now`. A clock that stepped backwards is clamped to
    /// the latest recorded instant so the history stays ordered.
    pub fn record(&mut self, now: DateTime<Utc>) {
        let at = match self.timestamps.back() {
            Some(last) if *last > now => {
                warn!(
                    last = %last,
                    now = %now,
                    "clock moved backwards; recording query at the previous instant"
                );
                *last
            }
            _ => now,
        };
        self.timestamps.push_back(at);
    }

    /// Drops entries that have left the window ending at `now`.
    pub fn prune_expired(&mut self, now: DateTime<Utc>, policy: &QuotaPolicy) {
        let Some(cutoff) = now.checked_sub_signed(policy.window) else {
            return;
        };
        self.timestamps.retain(|at| *at > cutoff);
    }

    /// Slots left as of the last pruning pass.
    pub fn remaining(&self, policy: &QuotaPolicy) -> u32 {
        let used = u32::try_from(self.timestamps.len()).unwrap_or(u32::MAX);
        policy.limit.get().saturating_sub(used)
    }

    pub fn used(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Renders a wait as whole hours and minutes, rounding partial minutes up.
pub fn format_retry_after(retry_after: TimeDelta) -> String {
    let secs = retry_after.num_seconds().max(0);
    let minutes = (secs + 59) / 60;
    format!("{}h {}m", minutes / 60, minutes % 60)
}
