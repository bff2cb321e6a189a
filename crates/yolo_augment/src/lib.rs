//! Randomized, box-aware augmentation for object-detection training data.
//!
//! This crate provides:
//! - Pure box geometry for rotation, mirroring, letterboxing and mosaic tiling
//! - The matching pixel transforms plus pixelation, mixup and HSV jitter
//! - A shared pool of label lines that supplies partner samples
//! - The [`Augmenter`] that chains the stages under a TOML-configurable policy
//! - Label file parsing and validation

pub mod augment;
pub mod config;
pub mod geometry;
pub mod image_ops;
pub mod label;
pub mod pool;
pub mod types;
pub mod validation;

pub use augment::{Augmenter, AugmenterBuilder};
pub use config::{AugmentConfig, Chance, CONFIG_ENV};
pub use geometry::{
    flip_box, resize_letterbox_box, rotate_box, tile_box, LetterboxCase, LetterboxLayout,
};
pub use label::{read_label_lines, write_label_lines, ClassMapping, LabelLine};
pub use pool::{FsImageSource, ImageSource, SamplePool};
pub use types::*;
pub use validation::{
    summarize_label_file, summarize_with_thresholds, validate_summary, LabelSummary,
    ValidationOutcome, ValidationReport, ValidationThresholds,
};
