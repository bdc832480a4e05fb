//! Rate limits on persisting face crops.
//!
//! Unknown subjects share one cooldown window ([`SharedCooldown`]); their
//! per-subject cap lives on the unknown record itself. Recognized subjects
//! each get their own cap and cooldown ([`SubjectThrottle`]).

use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;

/// Saved crops per recognized name.
pub const RECOGNIZED_CAPTURE_LIMIT: u32 = 3;
/// Minimum gap between two recognized captures of the same name.
pub const RECOGNIZED_CAPTURE_COOLDOWN_MS: i64 = 1_000;

/// One cooldown window shared by every subject it guards.
#[derive(Debug, Clone, Default)]
pub struct SharedCooldown {
    last: Option<NaiveDateTime>,
}

impl SharedCooldown {
    /// Whether at least `interval` has passed since the last capture.
    /// Always true before the first capture.
    pub fn ready(&self, now: NaiveDateTime, interval: Duration) -> bool {
        match self.last {
            None => true,
            Some(last) => now - last >= interval,
        }
    }

    pub fn mark(&mut self, now: NaiveDateTime) {
        self.last = Some(now);
    }

    pub fn last(&self) -> Option<NaiveDateTime> {
        self.last
    }
}

/// Capture history of one subject.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectCaptures {
    pub last_attempt: Option<NaiveDateTime>,
    pub saved: u32,
}

/// Per-subject cap + cooldown.
#[derive(Debug, Clone)]
pub struct SubjectThrottle {
    limit: u32,
    cooldown: Duration,
    subjects: HashMap<String, SubjectCaptures>,
}

impl Default for SubjectThrottle {
    fn default() -> Self {
        Self::new(
            RECOGNIZED_CAPTURE_LIMIT,
            Duration::milliseconds(RECOGNIZED_CAPTURE_COOLDOWN_MS),
        )
    }
}

impl SubjectThrottle {
    pub fn new(limit: u32, cooldown: Duration) -> Self {
        Self {
            limit,
            cooldown,
            subjects: HashMap::new(),
        }
    }

    /// Reserve a capture slot for `key`.
    ///
    /// Returns the 1-based number the next saved crop would carry, or `None`
    /// when the subject is capped or still cooling down. A granted slot
    /// restarts the cooldown whether or not the save later succeeds.
    pub fn try_acquire(&mut self, key: &str, now: NaiveDateTime) -> Option<u32> {
        let state = self.subjects.entry(key.to_string()).or_default();
        if state.saved >= self.limit {
            return None;
        }
        if let Some(last) = state.last_attempt {
            if now - last < self.cooldown {
                return None;
            }
        }
        state.last_attempt = Some(now);
        Some(state.saved + 1)
    }

    /// Count a crop that actually reached storage.
    pub fn record_saved(&mut self, key: &str) {
        if let Some(state) = self.subjects.get_mut(key) {
            state.saved += 1;
        }
    }

    pub fn state(&self, key: &str) -> Option<&SubjectCaptures> {
        self.subjects.get(key)
    }
}
