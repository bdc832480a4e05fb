//! Preview overlays: a colored box around each face and a label band with
//! [`FaceReport::caption_lines`] rendered into it.
//!
//! Text needs a TrueType font. Without one the band is still drawn so the
//! layout stays the same, just empty.

use crate::engine::{FaceReport, FrameReport, Identity};
use crate::types::Frame;
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;
use thiserror::Error;

pub const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const REJECTED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Fonts tried by [`Annotator::from_system_fonts`], in order.
pub const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
];

const LINE_HEIGHT: u32 = 18;
const TEXT_SCALE: f32 = 16.0;
const PADDING: u32 = 2;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("cannot read font {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("not a usable font: {path}")]
    InvalidFont { path: String },
}

/// Box color for a face: red when liveness failed, otherwise green for a
/// known face and yellow for an unknown one.
pub fn color_for(face: &FaceReport) -> Rgb<u8> {
    if !face.liveness.accepted() {
        return REJECTED_COLOR;
    }
    match face.identity {
        Identity::Known { .. } => KNOWN_COLOR,
        Identity::Unknown { .. } => UNKNOWN_COLOR,
    }
}

pub struct Annotator {
    font: Option<FontArc>,
    scale: PxScale,
}

impl Annotator {
    pub fn new(font: FontArc) -> Self {
        Self {
            font: Some(font),
            scale: PxScale::from(TEXT_SCALE),
        }
    }

    /// Boxes and empty bands, no text.
    pub fn boxes_only() -> Self {
        Self {
            font: None,
            scale: PxScale::from(TEXT_SCALE),
        }
    }

    pub fn from_font_file(path: &Path) -> Result<Self, AnnotateError> {
        let bytes = std::fs::read(path).map_err(|source| AnnotateError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let font = FontArc::try_from_vec(bytes).map_err(|_| AnnotateError::InvalidFont {
            path: path.display().to_string(),
        })?;
        Ok(Self::new(font))
    }

    /// First loadable font from [`SYSTEM_FONT_PATHS`].
    pub fn from_system_fonts() -> Option<Self> {
        SYSTEM_FONT_PATHS.iter().find_map(|p| {
            let path = Path::new(p);
            if !path.exists() {
                return None;
            }
            match Self::from_font_file(path) {
                Ok(annotator) => {
                    tracing::debug!(font = p, "annotation font loaded");
                    Some(annotator)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping annotation font");
                    None
                }
            }
        })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// RGB copy of `frame` with every face in `report` outlined and labelled.
    pub fn annotate(&self, frame: &Frame, report: &FrameReport) -> RgbImage {
        let mut image = frame.to_rgb();
        for face in &report.faces {
            self.draw_face(&mut image, face);
        }
        image
    }

    fn draw_face(&self, image: &mut RgbImage, face: &FaceReport) {
        let (img_w, img_h) = image.dimensions();
        if img_w == 0 || img_h == 0 {
            return;
        }
        let color = color_for(face);
        let bbox = &face.bbox;

        let x0 = bbox.x.max(0.0) as i32;
        let y0 = bbox.y.max(0.0) as i32;
        let x1 = bbox.right().min(img_w as f32) as i32;
        let y1 = bbox.bottom().min(img_h as f32) as i32;
        if x1 <= x0 || y1 <= y0 {
            return;
        }
        let (w, h) = ((x1 - x0) as u32, (y1 - y0) as u32);

        draw_hollow_rect_mut(image, Rect::at(x0, y0).of_size(w, h), color);
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(image, Rect::at(x0 + 1, y0 + 1).of_size(w - 2, h - 2), color);
        }

        // label band under the box, pushed up when it would leave the frame
        let lines = face.caption_lines();
        let band_h = (lines.len() as u32 * LINE_HEIGHT + 2 * PADDING).min(img_h);
        let band_top = (y1 as u32).min(img_h - band_h) as i32;
        draw_filled_rect_mut(image, Rect::at(x0, band_top).of_size(w, band_h), color);

        if let Some(font) = &self.font {
            for (i, line) in lines.iter().enumerate() {
                let y = band_top + (PADDING + i as u32 * LINE_HEIGHT) as i32;
                draw_text_mut(image, TEXT_COLOR, x0 + PADDING as i32, y, self.scale, font, line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::LivenessReport;
    use crate::types::BoundingBox;

    fn report(identity: Identity, live: bool, bbox: BoundingBox) -> FrameReport {
        FrameReport {
            sequence: 1,
            faces: vec![FaceReport {
                bbox,
                identity,
                near: true,
                liveness: LivenessReport {
                    texture: 0.0,
                    reflection: if live { 100.0 } else { 250.0 },
                    texture_suspicious: false,
                    reflection_suspicious: !live,
                    empty_crop: false,
                },
                captured: None,
                ledger: None,
            }],
        }
    }

    fn known() -> Identity {
        Identity::Known {
            label: "a1".into(),
            name: "ALICE".into(),
            distance: 0.3,
            runner_up: None,
        }
    }

    fn bbox() -> BoundingBox {
        BoundingBox { x: 10.0, y: 10.0, width: 50.0, height: 60.0 }
    }

    fn black(size: u32) -> Frame {
        Frame::new(vec![0; (size * size * 3) as usize], size, size, 1).unwrap()
    }

    #[test]
    fn test_colors() {
        let unknown = Identity::Unknown {
            name: "Unknown-1".into(),
            occurrence_count: 1,
        };
        assert_eq!(color_for(&report(known(), true, bbox()).faces[0]), KNOWN_COLOR);
        assert_eq!(color_for(&report(unknown, true, bbox()).faces[0]), UNKNOWN_COLOR);
        assert_eq!(color_for(&report(known(), false, bbox()).faces[0]), REJECTED_COLOR);
    }

    #[test]
    fn test_outline_and_band() {
        let frame = black(200);
        let out = Annotator::boxes_only().annotate(&frame, &report(known(), true, bbox()));

        assert_eq!(*out.get_pixel(10, 10), KNOWN_COLOR);
        assert_eq!(*out.get_pixel(59, 40), KNOWN_COLOR);
        assert_eq!(*out.get_pixel(11, 40), KNOWN_COLOR);
        // interior stays untouched
        assert_eq!(*out.get_pixel(35, 30), Rgb([0, 0, 0]));
        // two caption lines: band spans 70..110 under the box
        assert_eq!(*out.get_pixel(35, 75), KNOWN_COLOR);
        assert_eq!(*out.get_pixel(35, 105), KNOWN_COLOR);
        assert_eq!(*out.get_pixel(35, 115), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(150, 150), Rgb([0, 0, 0]));
        // source frame is not modified
        assert_eq!(frame.pixel(10, 10), Some([0, 0, 0]));
    }

    #[test]
    fn test_box_past_edges_is_clamped() {
        let frame = black(40);
        let wide = BoundingBox { x: -5.0, y: -5.0, width: 100.0, height: 100.0 };
        let out = Annotator::boxes_only().annotate(&frame, &report(known(), true, wide));
        assert_eq!(*out.get_pixel(0, 0), KNOWN_COLOR);
        assert_eq!(*out.get_pixel(39, 39), KNOWN_COLOR);
    }

    #[test]
    fn test_box_outside_frame_is_skipped() {
        let frame = black(40);
        let away = BoundingBox { x: 100.0, y: 100.0, width: 10.0, height: 10.0 };
        let out = Annotator::boxes_only().annotate(&frame, &report(known(), true, away));
        assert!(out.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_caption_text_rendered_into_band() {
        let Some(annotator) = Annotator::from_system_fonts() else {
            // no TrueType font installed on this host
            return;
        };
        assert!(annotator.has_font());

        let frame = black(200);
        let out = annotator.annotate(&frame, &report(known(), true, bbox()));
        let band_text = (12..58)
            .flat_map(|x| (70..110).map(move |y| (x, y)))
            .filter(|&(x, y)| *out.get_pixel(x, y) != KNOWN_COLOR)
            .count();
        assert!(band_text > 0, "expected glyph pixels in the label band");
    }

    #[test]
    fn test_bad_font_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("font.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(matches!(
            Annotator::from_font_file(&path),
            Err(AnnotateError::InvalidFont { .. })
        ));
        assert!(matches!(
            Annotator::from_font_file(&dir.path().join("absent.ttf")),
            Err(AnnotateError::Read { .. })
        ));
    }
}
