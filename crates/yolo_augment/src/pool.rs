//! Shared pool of label lines that supplies partner samples for mixup and mosaic.

use crate::label::{read_label_lines, LabelLine};
use crate::types::{AugmentError, AugmentResult, Sample};
use image::RgbImage;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Turns the path of a label line into pixels.
pub trait ImageSource: Send + Sync {
    fn load(&self, path: &Path) -> AugmentResult<RgbImage>;

    /// Cheap presence check used by label validation; defaults to a full decode.
    fn exists(&self, path: &Path) -> bool {
        self.load(path).is_ok()
    }
}

impl<T: ImageSource + ?Sized> ImageSource for Arc<T> {
    fn load(&self, path: &Path) -> AugmentResult<RgbImage> {
        (**self).load(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }
}

/// Decodes images from disk with the `image` codecs. Relative paths are taken from `root`
/// when one is set, otherwise from the working directory.
#[derive(Debug, Clone, Default)]
pub struct FsImageSource {
    root: Option<PathBuf>,
}

impl FsImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ImageSource for FsImageSource {
    fn load(&self, path: &Path) -> AugmentResult<RgbImage> {
        let path = self.resolve(path);
        let img = image::open(&path)
            .map_err(|source| AugmentError::ImageDecode {
                path: path.clone(),
                source,
            })?
            .to_rgb8();
        Ok(img)
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }
}

/// Immutable list of label lines plus the source used to decode them. Cheap to clone;
/// clones share the lines.
#[derive(Debug, Clone)]
pub struct SamplePool<S = FsImageSource> {
    lines: Arc<[LabelLine]>,
    source: S,
}

impl SamplePool<FsImageSource> {
    /// Reads every label line of `path`, decoding images relative to the working directory.
    pub fn from_label_file(path: &Path) -> AugmentResult<Self> {
        Ok(Self::new(read_label_lines(path)?, FsImageSource::new()))
    }
}

impl<S: ImageSource> SamplePool<S> {
    pub fn new(lines: impl Into<Arc<[LabelLine]>>, source: S) -> Self {
        Self {
            lines: lines.into(),
            source,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[LabelLine] {
        &self.lines
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Loads the image behind `line`; boxes are taken as written.
    pub fn decode(&self, line: &LabelLine) -> AugmentResult<Sample> {
        let image = self.source.load(&line.path)?;
        Ok(Sample::new(image, line.boxes.clone()))
    }

    /// Picks `count` lines uniformly, with replacement.
    pub fn draw_lines(
        &self,
        count: usize,
        rng: &mut dyn rand::RngCore,
    ) -> AugmentResult<Vec<&LabelLine>> {
        if count > 0 && self.lines.is_empty() {
            return Err(AugmentError::InsufficientPoolSize {
                requested: count,
                available: 0,
            });
        }
        Ok((0..count)
            .map(|_| &self.lines[rng.random_range(0..self.lines.len())])
            .collect())
    }

    /// Draws `count` lines and decodes each. The first unreadable image aborts the draw.
    pub fn draw_samples(
        &self,
        count: usize,
        rng: &mut dyn rand::RngCore,
    ) -> AugmentResult<Vec<Sample>> {
        self.draw_lines(count, rng)?
            .into_iter()
            .map(|line| {
                tracing::trace!(path = %line.path.display(), boxes = line.boxes.len(), "pool draw");
                self.decode(line)
            })
            .collect()
    }
}
