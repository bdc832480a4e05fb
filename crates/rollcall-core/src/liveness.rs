//! Presentation-attack heuristics on the expanded face crop.
//!
//! Two independent checks, both empirically tuned:
//!
//! - **Texture**: variance of the Laplacian of the grayscale crop. Values
//!   *above* the threshold are treated as suspicious (screen moiré and print
//!   halftone produce strong high-frequency response).
//! - **Reflection**: mean of the HSV value channel. Values above the
//!   threshold indicate the specular glare of a phone or monitor.
//!
//! A face is accepted only when neither check fires. Nothing is remembered
//! between frames.

use crate::types::Frame;
use serde::Serialize;

/// Metrics and verdicts for one face crop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LivenessReport {
    /// Laplacian variance, rounded to 2 decimals.
    pub texture: f64,
    /// Mean HSV value, rounded to 2 decimals.
    pub reflection: f64,
    pub texture_suspicious: bool,
    pub reflection_suspicious: bool,
    /// The crop had no pixels; nothing could be measured.
    pub empty_crop: bool,
}

impl LivenessReport {
    pub fn accepted(&self) -> bool {
        !self.empty_crop && !self.texture_suspicious && !self.reflection_suspicious
    }
}

/// Run both heuristics on `crop`.
pub fn evaluate(
    crop: Option<&Frame>,
    texture_threshold: f64,
    reflection_threshold: f64,
) -> LivenessReport {
    let Some(crop) = crop.filter(|c| !c.is_empty()) else {
        return LivenessReport {
            texture: 0.0,
            reflection: 0.0,
            texture_suspicious: false,
            reflection_suspicious: false,
            empty_crop: true,
        };
    };

    let texture = round2(laplacian_variance(crop));
    let reflection = round2(mean_value(crop));

    LivenessReport {
        texture,
        reflection,
        texture_suspicious: texture > texture_threshold,
        reflection_suspicious: reflection > reflection_threshold,
        empty_crop: false,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// BGR → 8-bit luma with BT.601 weights.
fn to_grayscale(frame: &Frame) -> Vec<u8> {
    frame
        .data()
        .chunks_exact(3)
        .map(|bgr| {
            let y = 0.114 * bgr[0] as f64 + 0.587 * bgr[1] as f64 + 0.299 * bgr[2] as f64;
            y.round().clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Mirror an out-of-range index back into `0..len` without repeating the edge.
fn reflect101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = i;
    if i < 0 {
        i = -i;
    }
    if i > last {
        i = 2 * last - i;
    }
    i.clamp(0, last) as usize
}

/// Population variance of the 4-neighbour Laplacian response.
fn laplacian_variance(frame: &Frame) -> f64 {
    let w = frame.width() as usize;
    let h = frame.height() as usize;
    let gray = to_grayscale(frame);
    let at = |x: isize, y: isize| gray[reflect101(y, h) * w + reflect101(x, w)] as f64;

    let n = (w * h) as f64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..h as isize {
        for x in 0..w as isize {
            let response =
                at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += response;
            sum_sq += response * response;
        }
    }

    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Mean of V = max(B, G, R).
fn mean_value(frame: &Frame) -> f64 {
    let pixels = frame.data().len() / 3;
    let total: u64 = frame
        .data()
        .chunks_exact(3)
        .map(|bgr| bgr[0].max(bgr[1]).max(bgr[2]) as u64)
        .sum();
    total as f64 / pixels as f64
}
