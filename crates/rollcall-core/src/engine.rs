//! Recognition orchestrator.
//!
//! One call to [`Engine::process_frame`] handles every face in a frame,
//! sequentially. Per face:
//!
//! ```text
//! DETECTED → MATCHED | UNMATCHED → LIVENESS_CHECKED → outcome
//! ```
//!
//! The engine itself carries no per-face state between frames; everything
//! that persists lives in the gallery, the unknown records, the ledger and
//! the capture throttles it owns. It is not internally synchronized: callers
//! that share it across threads must serialize access (see `rollcalld`).

use crate::capture::CaptureSink;
use crate::clock::Clock;
use crate::config::{ConfigError, EngineConfig};
use crate::gallery::{Gallery, GalleryError, IdentityMap, IdentityStore};
use crate::ledger::{AttendanceLedger, AttendanceRecord, MarkOutcome};
use crate::liveness::{self, LivenessReport};
use crate::matcher::{EuclideanMatcher, MatchOutcome, Matcher};
use crate::provider::EmbeddingProvider;
use crate::throttle::SubjectThrottle;
use crate::types::{BoundingBox, Detection, Frame};
use crate::unknown::{UnknownFaceRecord, UnknownFaces};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("gallery error: {0}")]
    Gallery(#[from] GalleryError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("engine has no identity store to reload from")]
    NoIdentityStore,
}

/// A gallery candidate shown next to a face.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub name: String,
    pub distance: f32,
}

/// Who a face was classified as.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Known {
        label: String,
        name: String,
        distance: f32,
        runner_up: Option<Candidate>,
    },
    Unknown {
        name: String,
        occurrence_count: u32,
    },
}

impl Identity {
    pub fn name(&self) -> &str {
        match self {
            Identity::Known { name, .. } | Identity::Unknown { name, .. } => name,
        }
    }
}

/// Terminal state of one face in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FaceOutcome {
    NoOp,
    UnknownCaptured,
    RecognizedCaptured,
    LedgerUpdated,
    CapturedAndLedgerUpdated,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaceReport {
    pub bbox: BoundingBox,
    pub identity: Identity,
    /// Box tall enough to count as close to the camera.
    pub near: bool,
    pub liveness: LivenessReport,
    /// Where a crop was saved this frame, if anywhere.
    pub captured: Option<PathBuf>,
    /// Ledger result, when the face passed every recognition gate.
    pub ledger: Option<MarkOutcome>,
}

impl FaceReport {
    pub fn outcome(&self) -> FaceOutcome {
        let ledger_updated = matches!(self.ledger, Some(o) if o != MarkOutcome::Unchanged);
        match (&self.identity, self.captured.is_some(), ledger_updated) {
            (_, true, true) => FaceOutcome::CapturedAndLedgerUpdated,
            (Identity::Unknown { .. }, true, false) => FaceOutcome::UnknownCaptured,
            (Identity::Known { .. }, true, false) => FaceOutcome::RecognizedCaptured,
            (_, false, true) => FaceOutcome::LedgerUpdated,
            (_, false, false) => FaceOutcome::NoOp,
        }
    }

    /// Preview label lines: name and distance, the runner-up when there is
    /// one, then range and a spoof marker.
    pub fn caption_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(3);
        match &self.identity {
            Identity::Known {
                name,
                distance,
                runner_up,
                ..
            } => {
                lines.push(format!("{name} - {distance:.2}"));
                if let Some(c) = runner_up {
                    lines.push(format!("{} - {:.2}", c.name, c.distance));
                }
            }
            Identity::Unknown { name, .. } => lines.push(name.clone()),
        }
        let range = if self.near { "near" } else { "far" };
        if self.liveness.accepted() {
            lines.push(range.to_string());
        } else {
            lines.push(format!("{range} [spoof?]"));
        }
        lines
    }

    /// [`caption_lines`](Self::caption_lines) on one line.
    pub fn caption(&self) -> String {
        self.caption_lines().join(" | ")
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameReport {
    pub sequence: u64,
    pub faces: Vec<FaceReport>,
}

pub struct Engine {
    config: EngineConfig,
    store: Option<IdentityStore>,
    gallery: Gallery,
    names: IdentityMap,
    matcher: Box<dyn Matcher>,
    unknowns: UnknownFaces,
    ledger: AttendanceLedger,
    recognized_captures: SubjectThrottle,
    provider: Box<dyn EmbeddingProvider>,
    sink: Box<dyn CaptureSink>,
    clock: Box<dyn Clock>,
    last_liveness: Option<LivenessReport>,
}

impl Engine {
    /// Load the identity store and build an engine around it.
    pub fn new(
        store: IdentityStore,
        mut provider: Box<dyn EmbeddingProvider>,
        sink: Box<dyn CaptureSink>,
        clock: Box<dyn Clock>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let (gallery, names) = store.load(provider.as_mut())?;
        let mut engine = Self::from_gallery(gallery, names, provider, sink, clock, config);
        engine.store = Some(store);
        Ok(engine)
    }

    /// Build an engine around an already-loaded gallery. Such an engine
    /// cannot [`reload`](Self::reload).
    pub fn from_gallery(
        gallery: Gallery,
        names: IdentityMap,
        provider: Box<dyn EmbeddingProvider>,
        sink: Box<dyn CaptureSink>,
        clock: Box<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            config,
            store: None,
            gallery,
            names,
            matcher: Box::new(EuclideanMatcher::default()),
            unknowns: UnknownFaces::new(),
            ledger: AttendanceLedger::default(),
            recognized_captures: SubjectThrottle::default(),
            provider,
            sink,
            clock,
            last_liveness: None,
        }
    }

    pub fn with_matcher(mut self, matcher: Box<dyn Matcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_ledger(mut self, ledger: AttendanceLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_recognized_throttle(mut self, throttle: SubjectThrottle) -> Self {
        self.recognized_captures = throttle;
        self
    }

    /// Replace gallery and identity map from the identity store.
    ///
    /// Must not overlap a frame pass; with `&mut self` that holds by
    /// construction. On failure the current gallery is kept.
    pub fn reload(&mut self) -> Result<usize, EngineError> {
        let store = self.store.as_ref().ok_or(EngineError::NoIdentityStore)?;
        let (gallery, names) = store.load(self.provider.as_mut())?;
        tracing::info!(entries = gallery.len(), names = names.len(), "gallery reloaded");
        self.gallery = gallery;
        self.names = names;
        Ok(self.gallery.len())
    }

    /// Swap in a new configuration; used from the next frame on.
    pub fn apply_config(&mut self, config: EngineConfig) {
        tracing::info!(?config, "engine config applied");
        self.config = config;
    }

    /// Apply `key = value` settings atomically on top of the current config.
    pub fn apply_settings<'a, I>(&mut self, settings: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let next = self.config.with_overrides(settings).map_err(|e| {
            tracing::warn!(error = %e, "rejected config update");
            e
        })?;
        self.apply_config(next);
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn names(&self) -> &IdentityMap {
        &self.names
    }

    pub fn attendance(&self) -> &[AttendanceRecord] {
        self.ledger.records()
    }

    pub fn unknown_faces(&self) -> &[UnknownFaceRecord] {
        self.unknowns.records()
    }

    /// Metrics of the most recently evaluated face, for diagnostics.
    pub fn last_liveness(&self) -> Option<&LivenessReport> {
        self.last_liveness.as_ref()
    }

    /// Run one frame through the pipeline.
    ///
    /// Never fails: a provider error or a face-less frame yields an empty
    /// report and leaves every store untouched.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameReport {
        let detections = match self.provider.detect(frame) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(seq = frame.sequence(), error = %e, "detection failed; skipping frame");
                return FrameReport {
                    sequence: frame.sequence(),
                    faces: Vec::new(),
                };
            }
        };

        let now = self.clock.now();
        let faces = detections
            .into_iter()
            .map(|detection| self.process_face(frame, detection, now))
            .collect::<Vec<_>>();

        if !faces.is_empty() {
            tracing::debug!(seq = frame.sequence(), faces = faces.len(), "frame processed");
        }

        FrameReport {
            sequence: frame.sequence(),
            faces,
        }
    }

    fn process_face(&mut self, frame: &Frame, detection: Detection, now: NaiveDateTime) -> FaceReport {
        let crop = frame.crop(&detection.bbox, self.config.crop_expand_ratio);
        let near = detection.bbox.height >= self.config.near_face_height_threshold;

        let matched = self
            .matcher
            .compare(&detection.descriptor, &self.gallery)
            .filter(MatchOutcome::is_known);

        let liveness = liveness::evaluate(
            crop.as_ref(),
            self.config.texture_threshold,
            self.config.reflection_threshold,
        );
        self.last_liveness = Some(liveness);

        let report = match matched {
            Some(outcome) => self.handle_known(&detection, &outcome, crop.as_ref(), near, liveness, now),
            None => self.handle_unknown(&detection, crop.as_ref(), near, liveness, now),
        };

        tracing::debug!(
            seq = frame.sequence(),
            name = report.identity.name(),
            near,
            texture = liveness.texture,
            reflection = liveness.reflection,
            live = liveness.accepted(),
            outcome = ?report.outcome(),
            "face handled"
        );
        report
    }

    fn handle_known(
        &mut self,
        detection: &Detection,
        outcome: &MatchOutcome,
        crop: Option<&Frame>,
        near: bool,
        liveness: LivenessReport,
        now: NaiveDateTime,
    ) -> FaceReport {
        let entries = self.gallery.entries();
        let label = entries[outcome.best_index].label.clone();
        let name = self.names.display_name(&label).to_string();
        let runner_up = outcome.runner_up.map(|(idx, distance)| Candidate {
            name: self.names.display_name(&entries[idx].label).to_string(),
            distance,
        });
        let distance = outcome.best_distance;

        let mut ledger = None;
        let mut captured = None;

        if distance < self.config.match_distance_threshold && near && liveness.accepted() {
            let key = self.names.attendance_key(&label);
            ledger = Some(self.ledger.mark(&key, distance, now));
            if let Some(crop) = crop {
                captured = self.capture_recognized(&key, crop, now);
            }
        }

        FaceReport {
            bbox: detection.bbox,
            identity: Identity::Known {
                label,
                name,
                distance,
                runner_up,
            },
            near,
            liveness,
            captured,
            ledger,
        }
    }

    fn capture_recognized(&mut self, name: &str, crop: &Frame, now: NaiveDateTime) -> Option<PathBuf> {
        let count = self.recognized_captures.try_acquire(name, now)?;
        match self.sink.save_recognized(name, count, now, crop) {
            Ok(path) => {
                self.recognized_captures.record_saved(name);
                Some(path)
            }
            Err(e) => {
                tracing::warn!(name, count, error = %e, "failed to save recognized capture");
                None
            }
        }
    }

    fn handle_unknown(
        &mut self,
        detection: &Detection,
        crop: Option<&Frame>,
        near: bool,
        liveness: LivenessReport,
        now: NaiveDateTime,
    ) -> FaceReport {
        let matcher = self.matcher.as_ref();
        let idx = self
            .unknowns
            .check_or_update(&detection.descriptor, false, matcher);

        let mut captured = None;
        let eligible = liveness.accepted()
            && self.unknowns.capture_eligible(
                idx,
                now,
                self.config.max_unknown_captures,
                self.config.unknown_capture_interval(),
            );

        if let (true, Some(crop)) = (eligible, crop) {
            if let Some(record) = self.unknowns.get(idx) {
                let name = record.assigned_name.clone();
                let count = record.occurrence_count;
                self.unknowns.record_capture(&detection.descriptor, now, matcher);
                match self.sink.save_unknown(&name, count, now, crop) {
                    Ok(path) => captured = Some(path),
                    Err(e) => {
                        tracing::warn!(name = %name, count, error = %e, "failed to save unknown capture");
                    }
                }
            }
        }

        let (name, occurrence_count) = self
            .unknowns
            .get(idx)
            .map(|r| (r.assigned_name.clone(), r.occurrence_count))
            .unwrap_or_default();

        FaceReport {
            bbox: detection.bbox,
            identity: Identity::Unknown {
                name,
                occurrence_count,
            },
            near,
            liveness,
            captured,
            ledger: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureError;
    use crate::clock::ManualClock;
    use crate::gallery::{GalleryEntry, UNREGISTERED_NAME};
    use crate::provider::ProviderError;
    use crate::types::Descriptor;
    use chrono::{Duration, NaiveDate};
    use std::sync::{Arc, Mutex};

    struct FixedProvider(Vec<Detection>);

    impl EmbeddingProvider for FixedProvider {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, ProviderError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenProvider;

    impl EmbeddingProvider for BrokenProvider {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, ProviderError> {
            Err(ProviderError::InferenceFailed("model gone".into()))
        }
    }

    #[derive(Clone, Default)]
    struct MemorySink {
        saved: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl MemorySink {
        fn saved(&self) -> Vec<String> {
            self.saved.lock().unwrap().clone()
        }

        fn store(&mut self, entry: String) -> Result<PathBuf, CaptureError> {
            if self.fail {
                return Err(CaptureError::CreateDir {
                    path: "/readonly".into(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                });
            }
            self.saved.lock().unwrap().push(entry.clone());
            Ok(PathBuf::from(entry))
        }
    }

    impl CaptureSink for MemorySink {
        fn save_unknown(
            &mut self,
            name: &str,
            count: u32,
            _at: NaiveDateTime,
            _crop: &Frame,
        ) -> Result<PathBuf, CaptureError> {
            self.store(format!("unknown/{name}.{count}"))
        }

        fn save_recognized(
            &mut self,
            name: &str,
            count: u32,
            _at: NaiveDateTime,
            _crop: &Frame,
        ) -> Result<PathBuf, CaptureError> {
            self.store(format!("{name}/{name}.{count}"))
        }
    }

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    /// Flat mid-gray: no texture, moderate brightness → passes liveness.
    fn live_frame() -> Frame {
        Frame::new(vec![100; 640 * 480 * 3], 640, 480, 0).unwrap()
    }

    /// Flat near-white: trips the reflection check.
    fn glare_frame() -> Frame {
        Frame::new(vec![240; 640 * 480 * 3], 640, 480, 0).unwrap()
    }

    fn face(x: f32, height: f32) -> Detection {
        Detection {
            bbox: BoundingBox { x: 100.0, y: 50.0, width: 250.0, height },
            descriptor: Descriptor::new(vec![x, 0.0]),
        }
    }

    fn alice_gallery() -> (Gallery, IdentityMap) {
        let gallery = Gallery::new(vec![GalleryEntry {
            label: "a1b2".into(),
            descriptor: Descriptor::new(vec![0.0, 0.0]),
        }]);
        let names = IdentityMap::from_pairs([("a1b2".to_string(), "ALICE".to_string())]);
        (gallery, names)
    }

    fn engine(detections: Vec<Detection>, sink: MemorySink, clock: ManualClock) -> Engine {
        let (gallery, names) = alice_gallery();
        Engine::from_gallery(
            gallery,
            names,
            Box::new(FixedProvider(detections)),
            Box::new(sink),
            Box::new(clock),
            EngineConfig::default(),
        )
    }

    #[test]
    fn test_known_face_creates_attendance() {
        let sink = MemorySink::default();
        let mut engine = engine(vec![face(0.30, 300.0)], sink.clone(), ManualClock::new(t0()));

        let report = engine.process_frame(&live_frame());

        assert_eq!(report.faces.len(), 1);
        assert_eq!(report.faces[0].outcome(), FaceOutcome::CapturedAndLedgerUpdated);
        let records = engine.attendance();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ALICE");
        assert!((records[0].best_distance - 0.30).abs() < 1e-6);
        assert_eq!(records[0].first_seen, t0());
        assert_eq!(sink.saved(), vec!["ALICE/ALICE.1".to_string()]);
    }

    #[test]
    fn test_far_face_is_silent_noop() {
        let mut engine = engine(vec![face(0.30, 200.0)], MemorySink::default(), ManualClock::new(t0()));
        let report = engine.process_frame(&live_frame());

        assert_eq!(report.faces[0].outcome(), FaceOutcome::NoOp);
        assert!(!report.faces[0].near);
        assert_eq!(report.faces[0].identity.name(), "ALICE");
        assert!(engine.attendance().is_empty());
    }

    #[test]
    fn test_known_but_above_distance_threshold() {
        // 0.58: within the boolean tolerance, above the attendance threshold
        let mut engine = engine(vec![face(0.58, 300.0)], MemorySink::default(), ManualClock::new(t0()));
        let report = engine.process_frame(&live_frame());

        assert!(matches!(report.faces[0].identity, Identity::Known { .. }));
        assert!(engine.attendance().is_empty());
        assert!(engine.unknown_faces().is_empty());
    }

    #[test]
    fn test_spoofed_face_touches_nothing() {
        let sink = MemorySink::default();
        let mut engine = engine(vec![face(0.30, 300.0)], sink.clone(), ManualClock::new(t0()));
        let report = engine.process_frame(&glare_frame());

        assert!(!report.faces[0].liveness.accepted());
        assert_eq!(report.faces[0].outcome(), FaceOutcome::NoOp);
        assert!(engine.attendance().is_empty());
        assert!(sink.saved().is_empty());
        assert!(engine.last_liveness().unwrap().reflection_suspicious);

        // no lockout: the next live frame goes through
        engine.process_frame(&live_frame());
        assert_eq!(engine.attendance().len(), 1);
    }

    #[test]
    fn test_recognized_captures_are_capped() {
        let sink = MemorySink::default();
        let clock = ManualClock::new(t0());
        let mut engine = engine(vec![face(0.30, 300.0)], sink.clone(), clock.clone());

        for _ in 0..20 {
            engine.process_frame(&live_frame());
            clock.advance(Duration::seconds(2));
        }

        assert_eq!(
            sink.saved(),
            vec!["ALICE/ALICE.1", "ALICE/ALICE.2", "ALICE/ALICE.3"]
        );
        assert_eq!(engine.attendance().len(), 1);
    }

    #[test]
    fn test_recognized_cooldown() {
        let sink = MemorySink::default();
        let clock = ManualClock::new(t0());
        let mut engine = engine(vec![face(0.30, 300.0)], sink.clone(), clock.clone());

        engine.process_frame(&live_frame());
        clock.advance(Duration::milliseconds(300));
        let report = engine.process_frame(&live_frame());

        assert_eq!(sink.saved().len(), 1);
        assert!(report.faces[0].captured.is_none());
    }

    #[test]
    fn test_unknown_captures_throttled() {
        let sink = MemorySink::default();
        let clock = ManualClock::new(t0());
        let mut engine = engine(vec![face(10.0, 300.0)], sink.clone(), clock.clone());
        engine
            .apply_settings([
                ("max_unknown_captures", "2"),
                ("unknown_capture_interval_seconds", "2.0"),
            ])
            .unwrap();

        for _ in 0..3 {
            engine.process_frame(&live_frame());
            clock.advance(Duration::seconds(1));
        }

        assert_eq!(sink.saved(), vec!["unknown/Unknown-1.1", "unknown/Unknown-1.2"]);
        assert_eq!(engine.unknown_faces().len(), 1);
        assert!(engine.attendance().is_empty());

        // cap reached: more time does not help
        clock.advance(Duration::seconds(10));
        let report = engine.process_frame(&live_frame());
        assert_eq!(report.faces[0].outcome(), FaceOutcome::NoOp);
        assert_eq!(sink.saved().len(), 2);
    }

    #[test]
    fn test_unknown_spoof_not_captured() {
        let sink = MemorySink::default();
        let mut engine = engine(vec![face(10.0, 300.0)], sink.clone(), ManualClock::new(t0()));
        let report = engine.process_frame(&glare_frame());

        assert_eq!(report.faces[0].identity.name(), "Unknown-1");
        assert!(sink.saved().is_empty());
        assert_eq!(engine.unknown_faces()[0].occurrence_count, 1);
    }

    #[test]
    fn test_failed_write_keeps_ledger() {
        let sink = MemorySink {
            fail: true,
            ..MemorySink::default()
        };
        let mut engine = engine(vec![face(0.30, 300.0)], sink, ManualClock::new(t0()));
        let report = engine.process_frame(&live_frame());

        assert_eq!(report.faces[0].outcome(), FaceOutcome::LedgerUpdated);
        assert_eq!(engine.attendance().len(), 1);
    }

    #[test]
    fn test_provider_failure_skips_frame() {
        let (gallery, names) = alice_gallery();
        let mut engine = Engine::from_gallery(
            gallery,
            names,
            Box::new(BrokenProvider),
            Box::new(MemorySink::default()),
            Box::new(ManualClock::new(t0())),
            EngineConfig::default(),
        );
        let report = engine.process_frame(&live_frame());
        assert!(report.faces.is_empty());
        assert!(engine.attendance().is_empty());
    }

    #[test]
    fn test_empty_gallery_routes_to_unknown() {
        let mut engine = Engine::from_gallery(
            Gallery::default(),
            IdentityMap::default(),
            Box::new(FixedProvider(vec![face(0.0, 300.0)])),
            Box::new(MemorySink::default()),
            Box::new(ManualClock::new(t0())),
            EngineConfig::default(),
        );
        let report = engine.process_frame(&live_frame());
        assert!(matches!(report.faces[0].identity, Identity::Unknown { .. }));
        assert_eq!(report.faces[0].outcome(), FaceOutcome::UnknownCaptured);
    }

    #[test]
    fn test_malformed_settings_keep_previous_config() {
        let mut engine = engine(vec![], MemorySink::default(), ManualClock::new(t0()));
        let result = engine.apply_settings([
            ("texture_threshold", "300"),
            ("near_face_height_threshold", "tall"),
        ]);
        assert!(result.is_err());
        assert_eq!(engine.config(), &EngineConfig::default());
    }

    #[test]
    fn test_reload_without_store() {
        let mut engine = engine(vec![], MemorySink::default(), ManualClock::new(t0()));
        assert!(matches!(engine.reload(), Err(EngineError::NoIdentityStore)));
        assert_eq!(engine.gallery().len(), 1);
    }

    #[test]
    fn test_caption() {
        let mut engine = engine(vec![face(0.30, 300.0)], MemorySink::default(), ManualClock::new(t0()));
        let report = engine.process_frame(&live_frame());
        assert_eq!(report.faces[0].caption(), "ALICE - 0.30 | near");
    }

    #[test]
    fn test_extreme_interval_does_not_stop_pipeline() {
        for interval in ["-inf", "-1e30", "inf", "NaN"] {
            let sink = MemorySink::default();
            let mut engine = engine(vec![face(10.0, 300.0)], sink.clone(), ManualClock::new(t0()));
            engine
                .apply_settings([("unknown_capture_interval_seconds", interval)])
                .unwrap();

            let report = engine.process_frame(&live_frame());
            assert_eq!(report.faces[0].identity.name(), "Unknown-1", "interval {interval}");
            assert_eq!(report.faces[0].outcome(), FaceOutcome::UnknownCaptured);
        }
    }

    #[test]
    fn test_first_unknown_capture_is_immediate() {
        let sink = MemorySink::default();
        let clock = ManualClock::new(t0());
        let mut engine = engine(vec![face(10.0, 300.0)], sink.clone(), clock.clone());

        // no warm-up window: the very first unknown sighting is saved
        let report = engine.process_frame(&live_frame());
        assert_eq!(report.faces[0].outcome(), FaceOutcome::UnknownCaptured);
        assert_eq!(engine.unknown_faces()[0].last_capture_time, Some(t0()));

        // the shared window applies from then on
        clock.advance(Duration::seconds(1));
        engine.process_frame(&live_frame());
        assert_eq!(sink.saved(), vec!["unknown/Unknown-1.1"]);
    }

    #[test]
    fn test_unregistered_labels_tracked_apart() {
        let gallery = Gallery::new(vec![
            GalleryEntry {
                label: "x1".into(),
                descriptor: Descriptor::new(vec![0.0, 0.0]),
            },
            GalleryEntry {
                label: "y2".into(),
                descriptor: Descriptor::new(vec![5.0, 0.0]),
            },
        ]);
        let sink = MemorySink::default();
        let mut engine = Engine::from_gallery(
            gallery,
            IdentityMap::default(),
            Box::new(FixedProvider(vec![face(0.1, 300.0), face(5.1, 300.0)])),
            Box::new(sink.clone()),
            Box::new(ManualClock::new(t0())),
            EngineConfig::default(),
        );

        let report = engine.process_frame(&live_frame());
        assert_eq!(report.faces[0].identity.name(), UNREGISTERED_NAME);
        assert_eq!(report.faces[1].identity.name(), UNREGISTERED_NAME);

        let names: Vec<&str> = engine.attendance().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["UNREGISTERED (x1)", "UNREGISTERED (y2)"]);
        assert_eq!(sink.saved().len(), 2);
    }

    /// Fixed detections per frame; gallery images are described by their
    /// top-left pixel.
    struct PixelGalleryProvider(Vec<Detection>);

    impl EmbeddingProvider for PixelGalleryProvider {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, ProviderError> {
            Ok(self.0.clone())
        }

        fn describe(
            &mut self,
            _source: &std::path::Path,
            image: &Frame,
        ) -> Result<Option<Descriptor>, ProviderError> {
            Ok(image
                .pixel(0, 0)
                .map(|p| Descriptor::new(p.iter().map(|&v| v as f32).collect())))
        }
    }

    fn write_face(dir: &std::path::Path, name: &str, rgb: [u8; 3]) {
        image::RgbImage::from_pixel(4, 4, image::Rgb(rgb))
            .save(dir.join(name))
            .unwrap();
    }

    fn bob_face() -> Detection {
        Detection {
            bbox: BoundingBox { x: 100.0, y: 50.0, width: 250.0, height: 300.0 },
            // BGR of RGB (0, 0, 200)
            descriptor: Descriptor::new(vec![200.0, 0.0, 0.0]),
        }
    }

    fn store_engine(dir: &std::path::Path) -> Engine {
        let faces = dir.join("faces");
        std::fs::create_dir_all(&faces).unwrap();
        write_face(&faces, "a1.png", [10, 0, 0]);
        std::fs::write(dir.join("people.json"), r#"[{"id": "a1", "name": "ALICE"}]"#).unwrap();

        Engine::new(
            IdentityStore::new(faces, dir.join("people.json")),
            Box::new(PixelGalleryProvider(vec![bob_face()])),
            Box::new(MemorySink::default()),
            Box::new(ManualClock::new(t0())),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_reload_replaces_gallery_and_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = store_engine(dir.path());
        assert_eq!(engine.gallery().len(), 1);

        let before = engine.process_frame(&live_frame());
        assert!(matches!(before.faces[0].identity, Identity::Unknown { .. }));

        write_face(&dir.path().join("faces"), "b2.png", [0, 0, 200]);
        std::fs::write(
            dir.path().join("people.json"),
            r#"[{"id": "a1", "name": "ALICE"}, {"id": "b2", "name": "BOB"}]"#,
        )
        .unwrap();

        assert_eq!(engine.reload().unwrap(), 2);
        assert_eq!(engine.names().display_name("b2"), "BOB");

        let after = engine.process_frame(&live_frame());
        assert_eq!(after.faces[0].identity.name(), "BOB");
        assert_eq!(engine.attendance()[0].name, "BOB");
    }

    #[test]
    fn test_failed_reload_keeps_previous_gallery() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = store_engine(dir.path());

        std::fs::write(dir.path().join("people.json"), "{broken").unwrap();
        write_face(&dir.path().join("faces"), "b2.png", [0, 0, 200]);
        assert!(matches!(
            engine.reload(),
            Err(EngineError::Gallery(GalleryError::ParseMap { .. }))
        ));
        assert_eq!(engine.gallery().len(), 1);
        assert_eq!(engine.names().display_name("a1"), "ALICE");

        std::fs::write(dir.path().join("people.json"), r#"[{"id": "a1", "name": "ALICE"}]"#)
            .unwrap();
        std::fs::remove_dir_all(dir.path().join("faces")).unwrap();
        assert!(matches!(
            engine.reload(),
            Err(EngineError::Gallery(GalleryError::ReadDir { .. }))
        ));
        assert_eq!(engine.gallery().len(), 1);
        assert_eq!(engine.gallery().entries()[0].label, "a1");
    }

    #[test]
    fn test_caption_lines_with_runner_up() {
        let gallery = Gallery::new(vec![
            GalleryEntry {
                label: "a1b2".into(),
                descriptor: Descriptor::new(vec![0.0, 0.0]),
            },
            GalleryEntry {
                label: "c3d4".into(),
                descriptor: Descriptor::new(vec![1.0, 0.0]),
            },
        ]);
        let names = IdentityMap::from_pairs([
            ("a1b2".to_string(), "ALICE".to_string()),
            ("c3d4".to_string(), "BOB".to_string()),
        ]);
        let mut engine = Engine::from_gallery(
            gallery,
            names,
            Box::new(FixedProvider(vec![face(0.2, 200.0)])),
            Box::new(MemorySink::default()),
            Box::new(ManualClock::new(t0())),
            EngineConfig::default(),
        );
        let report = engine.process_frame(&glare_frame());
        assert_eq!(
            report.faces[0].caption_lines(),
            vec!["ALICE - 0.20", "BOB - 0.80", "far [spoof?]"]
        );
    }
}
