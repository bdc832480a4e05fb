//! Deduplication of faces that match nobody in the gallery.
//!
//! Sightings are clustered first-fit: the new descriptor joins the first
//! existing record (in creation order) whose descriptor accepts it, not the
//! closest one. Records are never evicted during a run.

use crate::matcher::Matcher;
use crate::throttle::SharedCooldown;
use crate::types::Descriptor;
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

const UNKNOWN_PREFIX: &str = "Unknown-";

#[derive(Debug, Clone, Serialize)]
pub struct UnknownFaceRecord {
    #[serde(skip)]
    pub descriptor: Descriptor,
    /// Starts at 1; each capture bumps it.
    pub occurrence_count: u32,
    pub assigned_name: String,
    pub last_capture_time: Option<NaiveDateTime>,
}

/// Working set of unknown records plus the single cooldown window all of
/// them share for captures.
#[derive(Debug, Clone, Default)]
pub struct UnknownFaces {
    records: Vec<UnknownFaceRecord>,
    cooldown: SharedCooldown,
}

impl UnknownFaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the record that accepts `descriptor`, creating one if none does.
    ///
    /// With `apply_update` the found record's count is incremented; a freshly
    /// created record is returned as-is. Returns the record index.
    pub fn check_or_update(
        &mut self,
        descriptor: &Descriptor,
        apply_update: bool,
        matcher: &dyn Matcher,
    ) -> usize {
        if let Some(idx) = self
            .records
            .iter()
            .position(|r| matcher.accepts(&r.descriptor, descriptor))
        {
            if apply_update {
                self.records[idx].occurrence_count += 1;
            }
            return idx;
        }

        let assigned_name = format!("{UNKNOWN_PREFIX}{}", self.records.len() + 1);
        tracing::info!(name = %assigned_name, "new unknown face");
        self.records.push(UnknownFaceRecord {
            descriptor: descriptor.clone(),
            occurrence_count: 1,
            assigned_name,
            last_capture_time: None,
        });
        self.records.len() - 1
    }

    /// Count and cooldown gates for capturing record `idx`. Liveness is
    /// checked by the caller.
    pub fn capture_eligible(
        &self,
        idx: usize,
        now: NaiveDateTime,
        max_captures: u32,
        interval: Duration,
    ) -> bool {
        let Some(record) = self.records.get(idx) else {
            return false;
        };
        record.occurrence_count <= max_captures && self.cooldown.ready(now, interval)
    }

    /// Register a capture of `descriptor`: bump its record and restart the
    /// shared cooldown. Returns the index of the updated record.
    pub fn record_capture(
        &mut self,
        descriptor: &Descriptor,
        now: NaiveDateTime,
        matcher: &dyn Matcher,
    ) -> usize {
        let idx = self.check_or_update(descriptor, true, matcher);
        self.records[idx].last_capture_time = Some(now);
        self.cooldown.mark(now);
        idx
    }

    pub fn get(&self, idx: usize) -> Option<&UnknownFaceRecord> {
        self.records.get(idx)
    }

    pub fn records(&self) -> &[UnknownFaceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Time of the last unknown capture of any subject.
    pub fn last_capture(&self) -> Option<NaiveDateTime> {
        self.cooldown.last()
    }
}
