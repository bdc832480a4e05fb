use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned face bounding box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Fixed-length face descriptor produced by the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance between two descriptors. Lower = more similar.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One face found in a frame: where it is and what it looks like.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub descriptor: Descriptor,
}

/// A BGR raster frame (3 bytes per pixel, row-major, no padding).
#[derive(Clone)]
///
/// The buffer length always matches the dimensions; construct through
/// [`Frame::new`] or [`Frame::from_rgb`].
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    sequence: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid BGR length for {width}x{height}: expected {expected}, got {actual}")]
    InvalidLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
        })
    }

    /// Build a BGR frame from a decoded RGB image.
    pub fn from_rgb(image: &RgbImage, sequence: u64) -> Self {
        let data = image
            .pixels()
            .flat_map(|p| [p[2], p[1], p[0]])
            .collect();
        Self {
            data,
            width: image.width(),
            height: image.height(),
            sequence,
        }
    }

    /// Convert back to an RGB image for encoding.
    pub fn to_rgb(&self) -> RgbImage {
        let data = self
            .data
            .chunks_exact(3)
            .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
            .collect();
        // Length is width * height * 3 by construction.
        RgbImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Position of the frame in its source stream.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// BGR triple at (x, y), `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    /// Cut out `region` grown by `expand_ratio` of its own size on every side,
    /// clamped to the frame. Returns `None` when nothing is left.
    pub fn crop(&self, region: &BoundingBox, expand_ratio: f64) -> Option<Frame> {
        let w = region.width as f64;
        let h = region.height as f64;

        // Truncation toward zero, then clamp to the frame.
        let y0 = ((region.y as f64 - h * expand_ratio) as i64).max(0);
        let y1 = ((region.bottom() as f64 + h * expand_ratio) as i64).min(self.height as i64);
        let x0 = ((region.x as f64 - w * expand_ratio) as i64).max(0);
        let x1 = ((region.right() as f64 + w * expand_ratio) as i64).min(self.width as i64);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        let (x0, x1, y0, y1) = (x0 as usize, x1 as usize, y0 as usize, y1 as usize);
        let stride = self.width as usize * 3;
        let mut data = Vec::with_capacity((x1 - x0) * (y1 - y0) * 3);
        for y in y0..y1 {
            let row = y * stride;
            data.extend_from_slice(&self.data[row + x0 * 3..row + x1 * 3]);
        }

        Some(Frame {
            data,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
            sequence: self.sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 7]);
            }
        }
        Frame::new(data, width, height, 0).unwrap()
    }

    #[test]
    fn test_descriptor_distance() {
        let a = Descriptor::new(vec![0.0, 0.0]);
        let b = Descriptor::new(vec![3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_frame_rejects_bad_length() {
        assert!(Frame::new(vec![0; 5], 2, 1, 0).is_err());
        assert!(Frame::new(vec![0; 6], 2, 1, 0).is_ok());
    }

    #[test]
    fn test_rgb_conversion_swaps_channels() {
        let frame = Frame::new(vec![1, 2, 3], 1, 1, 0).unwrap();
        let rgb = frame.to_rgb();
        assert_eq!(rgb.get_pixel(0, 0).0, [3, 2, 1]);
        let back = Frame::from_rgb(&rgb, 0);
        assert_eq!(back.data(), &[1, 2, 3]);
    }

    #[test]
    fn test_crop_without_expansion() {
        let frame = gradient_frame(10, 10);
        let bbox = BoundingBox { x: 2.0, y: 3.0, width: 4.0, height: 2.0 };
        let crop = frame.crop(&bbox, 0.0).unwrap();
        assert_eq!((crop.width(), crop.height()), (4, 2));
        assert_eq!(crop.pixel(0, 0), Some([2, 3, 7]));
        assert_eq!(crop.pixel(3, 1), Some([5, 4, 7]));
        assert_eq!(crop.pixel(4, 0), None);
    }

    #[test]
    fn test_crop_expands_and_clamps() {
        let frame = gradient_frame(10, 10);
        // 4x4 box at (1,1) grown by 0.5 → (-1,-1)..(7,7), clamped to (0,0)..(7,7)
        let bbox = BoundingBox { x: 1.0, y: 1.0, width: 4.0, height: 4.0 };
        let crop = frame.crop(&bbox, 0.5).unwrap();
        assert_eq!((crop.width(), crop.height()), (7, 7));
        assert_eq!(crop.pixel(0, 0), Some([0, 0, 7]));
    }

    #[test]
    fn test_crop_outside_frame_is_none() {
        let frame = gradient_frame(10, 10);
        let bbox = BoundingBox { x: 20.0, y: 20.0, width: 4.0, height: 4.0 };
        assert!(frame.crop(&bbox, 0.25).is_none());
    }
}
