//! Attendance ledger.
//!
//! One record per display name. A record counts distinct attendance events:
//! a repeat sighting only opens a new event once the re-arm window has
//! passed since the previous one. The closest match distance ever seen is
//! kept independently of events.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default gap before a repeat sighting counts as a new attendance event.
pub const DEFAULT_REARM_HOURS: i64 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub name: String,
    pub first_seen: NaiveDateTime,
    pub most_recent: NaiveDateTime,
    /// Minimum match distance observed. Never increases.
    pub best_distance: f32,
    /// Number of distinct attendance events, starting at 1.
    pub events: u32,
}

/// What a call to [`AttendanceLedger::mark`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarkOutcome {
    /// First sighting of this name.
    Created,
    /// Re-arm window elapsed; `most_recent` advanced. May also have tightened.
    NewEvent,
    /// Same event, but a closer distance was recorded.
    Tightened,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct AttendanceLedger {
    records: Vec<AttendanceRecord>,
    index: HashMap<String, usize>,
    rearm: Duration,
}

impl Default for AttendanceLedger {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_REARM_HOURS))
    }
}

impl AttendanceLedger {
    pub fn new(rearm: Duration) -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            rearm,
        }
    }

    pub fn mark(&mut self, name: &str, distance: f32, now: NaiveDateTime) -> MarkOutcome {
        let Some(&idx) = self.index.get(name) else {
            self.index.insert(name.to_string(), self.records.len());
            self.records.push(AttendanceRecord {
                name: name.to_string(),
                first_seen: now,
                most_recent: now,
                best_distance: distance,
                events: 1,
            });
            tracing::info!(name, distance, "attendance recorded");
            return MarkOutcome::Created;
        };

        let record = &mut self.records[idx];

        let rearmed = now - record.most_recent > self.rearm;
        if rearmed {
            record.most_recent = now;
            record.events += 1;
            tracing::info!(name, events = record.events, "new attendance event");
        }

        let tightened = distance < record.best_distance;
        if tightened {
            record.best_distance = distance;
        }

        match (rearmed, tightened) {
            (true, _) => MarkOutcome::NewEvent,
            (false, true) => MarkOutcome::Tightened,
            (false, false) => MarkOutcome::Unchanged,
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttendanceRecord> {
        self.index.get(name).map(|&idx| &self.records[idx])
    }

    /// Records in first-seen order.
    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
