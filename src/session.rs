use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::rate_limit::{Admission, QuotaPolicy, SessionQuota};

pub const SESSION_COOKIE: &str = "qa_session";

/// Minimum spacing between two idle sweeps of the store.
const SWEEP_INTERVAL_SECS: i64 = 60;
/// Idle time after which a session that never spent a slot is dropped.
const UNUSED_SESSION_TTL: TimeDelta = TimeDelta::minutes(15);

#[derive(Debug, Clone)]
struct Session {
    quota: SessionQuota,
    in_flight: bool,
    last_seen: DateTime<Utc>,
}

impl Session {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            quota: SessionQuota::new(),
            in_flight: false,
            last_seen: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    QuotaExceeded { retry_after: TimeDelta },
    /// Another question from the same session has not been answered yet.
    Busy,
}

/// Per-browser quota state. Each session owns its own [`SessionQuota`];
/// nothing is shared between sessions and nothing outlives the process.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<Uuid, Session>,
    policy: QuotaPolicy,
    /// Unix seconds of the last idle sweep.
    last_sweep: AtomicI64,
}

impl SessionStore {
    pub fn new(policy: QuotaPolicy) -> Self {
        Self {
            sessions: DashMap::new(),
            policy,
            last_sweep: AtomicI64::new(i64::MIN),
        }
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Returns the session named by the cookie value, or starts a new one.
    /// The flag is `true` when a new session was created.
    pub fn resolve(&self, cookie: Option<&str>, now: DateTime<Utc>) -> (Uuid, bool) {
        let known = cookie
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .filter(|id| self.touch(*id, now));
        if let Some(id) = known {
            return (id, false);
        }

        self.evict_idle(now);
        let id = Uuid::new_v4();
        self.sessions.insert(id, Session::new(now));
        debug!(session_id = %id, sessions = self.sessions.len(), "started session");
        (id, true)
    }

    /// Consults the limiter and, when admitted, marks the session busy until
    /// the returned guard is settled or dropped.
    pub fn begin(&self, id: Uuid, now: DateTime<Utc>) -> Result<InFlight<'_>, Rejection> {
        let mut session = self
            .sessions
            .entry(id)
            .or_insert_with(|| Session::new(now));
        session.last_seen = now;

        if session.in_flight {
            return Err(Rejection::Busy);
        }

        match session.quota.check(now, &self.policy) {
            Admission::Admit => {
                session.in_flight = true;
                Ok(InFlight {
                    store: self,
                    id,
                    settled: false,
                })
            }
            Admission::Reject { retry_after } => Err(Rejection::QuotaExceeded { retry_after }),
        }
    }

    /// Queries left for display, after pruning expired entries.
    pub fn remaining(&self, id: Uuid, now: DateTime<Utc>) -> u32 {
        match self.sessions.get_mut(&id) {
            Some(mut session) => {
                session.quota.prune_expired(now, &self.policy);
                session.quota.remaining(&self.policy)
            }
            None => self.policy.limit.get(),
        }
    }

    fn touch(&self, id: Uuid, now: DateTime<Utc>) -> bool {
        match self.sessions.get_mut(&id) {
            Some(mut session) => {
                session.last_seen = now;
                true
            }
            None => false,
        }
    }

    fn finish(&self, id: Uuid, completed_at: Option<DateTime<Utc>>) {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            session.in_flight = false;
            if let Some(at) = completed_at {
                session.quota.record(at);
                session.last_seen = at;
            }
        }
    }

    /// Drops idle sessions, at most once per [`SWEEP_INTERVAL_SECS`].
    ///
    /// A session holding quota history is kept for a whole window, after
    /// which every entry has expired. One that never spent a slot only
    /// survives [`UNUSED_SESSION_TTL`]; losing it loses nothing.
    fn evict_idle(&self, now: DateTime<Utc>) {
        let now_secs = now.timestamp();
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now_secs.saturating_sub(last) < SWEEP_INTERVAL_SECS
            || self
                .last_sweep
                .compare_exchange(last, now_secs, Ordering::Relaxed, Ordering::Relaxed)
                .is_err()
        {
            return;
        }

        let used_ttl = self.policy.window;
        let unused_ttl = UNUSED_SESSION_TTL.min(used_ttl);
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            let ttl = if session.quota.is_empty() {
                unused_ttl
            } else {
                used_ttl
            };
            session.in_flight
                || session
                    .last_seen
                    .checked_add_signed(ttl)
                    .is_none_or(|expires| expires > now)
        });
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.sessions.len(), "evicted idle sessions");
        }
    }
}

/// An admitted query. Dropping it without [`InFlight::succeed`] releases the
/// session without consuming a quota slot.
#[must_use = "an admitted query must be settled"]
pub struct InFlight<'a> {
    store: &'a SessionStore,
    id: Uuid,
    settled: bool,
}

impl InFlight<'_> {
    pub fn session_id(&self) -> Uuid {
        self.id
    }

    /// The gated call succeeded: spend one slot at `completed_at`.
    pub fn succeed(mut self, completed_at: DateTime<Utc>) {
        self.settled = true;
        self.store.finish(self.id, Some(completed_at));
    }

    /// The gated call failed: release the session, quota untouched.
    pub fn fail(mut self) {
        self.settled = true;
        self.store.finish(self.id, None);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.store.finish(self.id, None);
        }
    }
}
