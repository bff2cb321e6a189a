//! Core types, error definitions, and data structures for yolo_augment.

use image::{Rgb, Rgb32FImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub type AugmentResult<T> = Result<T, AugmentError>;

#[derive(Debug, Error)]
pub enum AugmentError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image encode error at {path}: {source}")]
    ImageEncode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("malformed label line ({reason}): {line:?}")]
    MalformedLabelLine { line: String, reason: String },
    #[error("sample pool has {available} entries, cannot draw {requested} partner sample(s)")]
    InsufficientPoolSize { requested: usize, available: usize },
    #[error("config parse error at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Axis-aligned box in pixel coordinates, top-left / bottom-right convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub class_id: u32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32, class_id: u32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            class_id,
        }
    }

    /// Same class, new coordinates.
    pub fn with_coords(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self::new(x1, y1, x2, y2, self.class_id)
    }

    pub fn width(&self) -> i64 {
        i64::from(self.x2) - i64::from(self.x1)
    }

    pub fn height(&self) -> i64 {
        i64::from(self.y2) - i64::from(self.y1)
    }

    /// Area in square pixels; zero for inverted or collapsed boxes.
    pub fn area(&self) -> i64 {
        self.width().max(0) * self.height().max(0)
    }

    /// Swaps corners where needed so that `x1 <= x2` and `y1 <= y2`.
    pub fn ordered(&self) -> Self {
        Self::new(
            self.x1.min(self.x2),
            self.y1.min(self.y2),
            self.x1.max(self.x2),
            self.y1.max(self.y2),
            self.class_id,
        )
    }

    /// Orders the corners and clamps them to `[0,width]×[0,height]`. The box is kept even
    /// when it collapses.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let w = i32::try_from(width).unwrap_or(i32::MAX);
        let h = i32::try_from(height).unwrap_or(i32::MAX);
        let b = self.ordered();
        b.with_coords(
            b.x1.clamp(0, w),
            b.y1.clamp(0, h),
            b.x2.clamp(0, w),
            b.y2.clamp(0, h),
        )
    }

    /// Like [`Self::clamped`], but `None` when nothing of the box is left.
    pub fn clipped(&self, width: u32, height: u32) -> Option<Self> {
        let clipped = self.clamped(width, height);
        (clipped.area() > 0).then_some(clipped)
    }

    pub fn to_array(&self) -> [i32; 5] {
        [self.x1, self.y1, self.x2, self.y2, self.class_id as i32]
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.x1, self.y1, self.x2, self.y2, self.class_id
        )
    }
}

/// Target output resolution, `(height, width)` order like the label tooling uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canvas {
    pub height: u32,
    pub width: u32,
}

impl Canvas {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    pub fn matches(&self, img: &RgbImage) -> bool {
        img.dimensions() == (self.width, self.height)
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(608, 608)
    }
}

impl fmt::Display for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// Parses `HxW`, e.g. `608x608`.
impl FromStr for Canvas {
    type Err = AugmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AugmentError::InvalidConfig(format!("expected HxW canvas, got {s:?}"));
        let (h, w) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let height = h.trim().parse::<u32>().map_err(|_| invalid())?;
        let width = w.trim().parse::<u32>().map_err(|_| invalid())?;
        Ok(Self::new(height, width))
    }
}

/// Mirror axis selector using the familiar integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlipCode {
    /// `-1`: mirror both axes (a 180° turn).
    Both,
    /// `0`: mirror rows (top ↔ bottom).
    Vertical,
    /// `1`: mirror columns (left ↔ right).
    Horizontal,
}

impl FlipCode {
    pub const ALL: [FlipCode; 3] = [FlipCode::Both, FlipCode::Vertical, FlipCode::Horizontal];

    pub fn code(self) -> i32 {
        match self {
            FlipCode::Both => -1,
            FlipCode::Vertical => 0,
            FlipCode::Horizontal => 1,
        }
    }

    pub fn mirrors_x(self) -> bool {
        matches!(self, FlipCode::Horizontal | FlipCode::Both)
    }

    pub fn mirrors_y(self) -> bool {
        matches!(self, FlipCode::Vertical | FlipCode::Both)
    }
}

impl TryFrom<i32> for FlipCode {
    type Error = AugmentError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            -1 => Ok(FlipCode::Both),
            0 => Ok(FlipCode::Vertical),
            1 => Ok(FlipCode::Horizontal),
            other => Err(AugmentError::InvalidConfig(format!(
                "flip code must be -1, 0 or 1 (got {other})"
            ))),
        }
    }
}

/// One labeled image moving through the pipeline.
#[derive(Debug, Clone)]
pub struct Sample {
    pub image: RgbImage,
    pub boxes: Vec<BoundingBox>,
}

impl Sample {
    pub fn new(image: RgbImage, boxes: Vec<BoundingBox>) -> Self {
        Self { image, boxes }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Final pipeline output: image scaled to `[0,1]` plus the surviving boxes.
#[derive(Debug, Clone)]
pub struct AugmentedSample {
    pub image: Rgb32FImage,
    pub boxes: Vec<BoundingBox>,
}

impl AugmentedSample {
    /// Normalizes an 8-bit image into `[0,1]`.
    pub fn from_sample(sample: Sample) -> Self {
        let Sample { image, boxes } = sample;
        let (width, height) = image.dimensions();
        let image = Rgb32FImage::from_fn(width, height, |x, y| {
            let p = image.get_pixel(x, y);
            Rgb([
                f32::from(p[0]) / 255.0,
                f32::from(p[1]) / 255.0,
                f32::from(p[2]) / 255.0,
            ])
        });
        Self { image, boxes }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Image in CHW layout, the order tensor libraries expect.
    pub fn to_chw(&self) -> Vec<f32> {
        let (width, height) = self.image.dimensions();
        let plane = (width * height) as usize;
        let mut chw = vec![0.0f32; plane * 3];
        for (x, y, pixel) in self.image.enumerate_pixels() {
            let base = (y * width + x) as usize;
            chw[base] = pixel[0];
            chw[plane + base] = pixel[1];
            chw[2 * plane + base] = pixel[2];
        }
        chw
    }

    pub fn box_arrays(&self) -> Vec<[i32; 5]> {
        self.boxes.iter().map(BoundingBox::to_array).collect()
    }

    /// Writes the quantized image; the format follows the extension of `path`.
    pub fn save(&self, path: &Path) -> AugmentResult<()> {
        self.to_rgb8()
            .save(path)
            .map_err(|source| AugmentError::ImageEncode {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Quantizes back to 8 bits, e.g. for writing previews.
    pub fn to_rgb8(&self) -> RgbImage {
        let (width, height) = self.image.dimensions();
        RgbImage::from_fn(width, height, |x, y| {
            let p = self.image.get_pixel(x, y);
            Rgb(p.0.map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clipped_drops_boxes_outside_the_frame() {
        let b = BoundingBox::new(-20, -20, -5, 10, 1);
        assert_eq!(b.clipped(100, 100), None);

        let b = BoundingBox::new(90, 40, 130, 60, 2);
        assert_eq!(b.clipped(100, 100), Some(BoundingBox::new(90, 40, 100, 60, 2)));
    }

    #[test]
    fn extreme_coordinates_do_not_overflow() {
        let b = BoundingBox::new(i32::MIN, 0, i32::MAX, 5, 0);
        assert_eq!(b.width(), i64::from(u32::MAX));
        assert_eq!(b.area(), i64::from(u32::MAX) * 5);
        assert_eq!(b.clipped(40, 40), Some(BoundingBox::new(0, 0, 40, 5, 0)));

        let collapsed = BoundingBox::new(50, 10, 90, 20, 1).clamped(40, 40);
        assert_eq!(collapsed, BoundingBox::new(40, 10, 40, 20, 1));
        assert_eq!(collapsed.area(), 0);
    }

    #[test]
    fn ordered_swaps_inverted_corners() {
        let b = BoundingBox::new(30, 40, 10, 20, 7).ordered();
        assert_eq!(b, BoundingBox::new(10, 20, 30, 40, 7));
    }

    #[test]
    fn canvas_parses_height_by_width() {
        let canvas: Canvas = "416x608".parse().unwrap();
        assert_eq!(canvas, Canvas::new(416, 608));
        assert!("416".parse::<Canvas>().is_err());
        assert!("axb".parse::<Canvas>().is_err());
    }

    #[test]
    fn flip_codes_round_trip_through_integers() {
        for flip in FlipCode::ALL {
            assert_eq!(FlipCode::try_from(flip.code()).unwrap(), flip);
        }
        assert!(FlipCode::try_from(2).is_err());
    }

    #[test]
    fn augmented_sample_normalizes_and_exports_chw() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 51]));
        img.put_pixel(1, 0, Rgb([0, 255, 102]));
        let boxes = vec![BoundingBox::new(0, 0, 2, 1, 4)];
        let out = AugmentedSample::from_sample(Sample::new(img.clone(), boxes));
        assert_eq!(out.box_arrays(), vec![[0, 0, 2, 1, 4]]);
        let chw = out.to_chw();
        assert_eq!(chw.len(), 6);
        assert!((chw[0] - 1.0).abs() < 1e-6);
        assert!((chw[3] - 1.0).abs() < 1e-6);
        assert!((chw[4] - 0.2).abs() < 1e-6);
        assert_eq!(out.to_rgb8(), img);
    }
}
