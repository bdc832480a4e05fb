//! Gallery matching.
//!
//! Two separate gates come out of a comparison: the numeric distance of the
//! closest entry (used later against the attendance threshold) and a boolean
//! "is a match" per entry from a fixed tolerance. A face can be the argmin
//! and still not count as known.

use crate::gallery::Gallery;
use crate::types::Descriptor;

/// Fixed tolerance for the boolean match test.
pub const MATCH_TOLERANCE: f32 = 0.6;

/// Result of comparing one candidate against every gallery entry.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub best_index: usize,
    pub best_distance: f32,
    pub distances: Vec<f32>,
    pub matches: Vec<bool>,
    /// Second-closest entry, when the gallery has at least two.
    pub runner_up: Option<(usize, f32)>,
}

impl MatchOutcome {
    /// Whether the closest entry also passes the boolean tolerance test.
    pub fn is_known(&self) -> bool {
        self.matches[self.best_index]
    }
}

/// Strategy for comparing a candidate descriptor against known descriptors.
pub trait Matcher: Send {
    /// `None` for an empty gallery.
    fn compare(&self, candidate: &Descriptor, gallery: &Gallery) -> Option<MatchOutcome>;

    /// Boolean match test for a single pair.
    fn accepts(&self, known: &Descriptor, candidate: &Descriptor) -> bool;
}

/// Euclidean-distance matcher with a fixed tolerance.
pub struct EuclideanMatcher {
    pub tolerance: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            tolerance: MATCH_TOLERANCE,
        }
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, candidate: &Descriptor, gallery: &Gallery) -> Option<MatchOutcome> {
        let distances: Vec<f32> = gallery
            .entries()
            .iter()
            .map(|entry| entry.descriptor.distance(candidate))
            .collect();

        let mut best: Option<(usize, f32)> = None;
        let mut second: Option<(usize, f32)> = None;
        for (i, &d) in distances.iter().enumerate() {
            match best {
                Some((_, bd)) if d >= bd => {
                    if second.map_or(true, |(_, sd)| d < sd) {
                        second = Some((i, d));
                    }
                }
                _ => {
                    second = best;
                    best = Some((i, d));
                }
            }
        }

        let (best_index, best_distance) = best?;
        let matches = distances.iter().map(|&d| d <= self.tolerance).collect();

        Some(MatchOutcome {
            best_index,
            best_distance,
            distances,
            matches,
            runner_up: second,
        })
    }

    fn accepts(&self, known: &Descriptor, candidate: &Descriptor) -> bool {
        known.distance(candidate) <= self.tolerance
    }
}
