//! Augmentation policy and its TOML loader.

use crate::types::{AugmentError, AugmentResult, Canvas};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CONFIG_ENV: &str = "YOLO_AUGMENT_CONFIG";
const DEFAULT_CONFIG_NAME: &str = "yolo-augment.toml";

/// Rational firing probability `k/n`: a stage fires when a uniform draw from `1..=n` is
/// at most `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Chance {
    pub numerator: u32,
    pub denominator: u32,
}

impl Chance {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub const fn always() -> Self {
        Self::new(1, 1)
    }

    pub const fn never() -> Self {
        Self::new(0, 1)
    }

    pub fn fires(&self, rng: &mut dyn rand::RngCore) -> bool {
        if self.denominator == 0 || self.numerator == 0 {
            return false;
        }
        rng.random_range(1..=self.denominator) <= self.numerator
    }
}

impl fmt::Display for Chance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for Chance {
    type Err = AugmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AugmentError::InvalidConfig(format!("expected k/n chance, got {s:?}"));
        let (k, n) = s.trim().split_once('/').ok_or_else(invalid)?;
        let numerator = k.trim().parse().map_err(|_| invalid())?;
        let denominator = n.trim().parse().map_err(|_| invalid())?;
        Ok(Self::new(numerator, denominator))
    }
}

impl TryFrom<String> for Chance {
    type Error = AugmentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Chance> for String {
    fn from(value: Chance) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AugmentConfig {
    /// Output size every augmented sample is brought to.
    pub canvas: Canvas,
    /// Chance of a quarter-turn rotation.
    pub p_rotate: Chance,
    /// Chance of a mirror along a random axis.
    pub p_flip: Chance,
    /// Chance of pixelating random patches.
    pub p_pixelate: Chance,
    /// Chance of blending in a partner sample.
    pub p_mixup: Chance,
    /// Chance of tiling with three partner samples (needs a pool).
    pub p_mosaic: Chance,
    /// Chance of the random-scale letterbox onto the canvas.
    pub p_resize: Chance,
    /// Chance of HSV jitter.
    pub p_color: Chance,
    /// Patches per region are drawn from `1..pixelate_count_max`.
    pub pixelate_count_max: u32,
    /// Patch side as a fraction of the region side.
    pub pixelate_mask_ratio: f64,
    /// Cell side as a fraction of the patch's short side (at least 2px).
    pub pixelate_kernel_ratio: f64,
    /// Max additive hue shift (hue in `[0,1)`).
    pub color_hue_range: f64,
    /// Max multiplicative saturation gain (and its reciprocal).
    pub color_sat_range: f64,
    /// Max multiplicative value gain (and its reciprocal).
    pub color_val_range: f64,
    /// Per-axis scale range for the letterbox stage.
    pub resize_scale_range: (f64, f64),
    /// Base seed for per-sample deterministic RNGs.
    pub seed: Option<u64>,
    /// Label file supplying partner samples.
    pub pool_labels: Option<PathBuf>,
    /// Root for relative image paths in label lines.
    pub image_root: Option<PathBuf>,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            canvas: Canvas::default(),
            p_rotate: Chance::new(1, 3),
            p_flip: Chance::new(1, 3),
            p_pixelate: Chance::new(1, 2),
            p_mixup: Chance::new(1, 4),
            p_mosaic: Chance::new(1, 3),
            p_resize: Chance::always(),
            p_color: Chance::new(2, 3),
            pixelate_count_max: 10,
            pixelate_mask_ratio: 0.3,
            pixelate_kernel_ratio: 0.1,
            color_hue_range: 0.1,
            color_sat_range: 1.5,
            color_val_range: 1.5,
            resize_scale_range: (0.5, 1.5),
            seed: None,
            pool_labels: None,
            image_root: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AugmentConfigFile {
    canvas: Option<String>,
    seed: Option<u64>,
    pool_labels: Option<String>,
    image_root: Option<String>,
    chances: Option<ChanceSection>,
    pixelate: Option<PixelateSection>,
    color: Option<ColorSection>,
    resize: Option<ResizeSection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ChanceSection {
    rotate: Option<Chance>,
    flip: Option<Chance>,
    pixelate: Option<Chance>,
    mixup: Option<Chance>,
    mosaic: Option<Chance>,
    resize: Option<Chance>,
    color: Option<Chance>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PixelateSection {
    count_max: Option<u32>,
    mask_ratio: Option<f64>,
    kernel_ratio: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ColorSection {
    hue: Option<f64>,
    sat: Option<f64>,
    val: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ResizeSection {
    scale_min: Option<f64>,
    scale_max: Option<f64>,
}

impl AugmentConfig {
    /// Reads `$YOLO_AUGMENT_CONFIG`, else `yolo-augment.toml` in the working directory.
    /// Missing, unreadable or invalid files fall back to the defaults with a warning.
    pub fn load() -> Self {
        let (path, explicit) = match std::env::var(CONFIG_ENV) {
            Ok(raw) => (expand_path(&raw), true),
            Err(_) => (PathBuf::from(DEFAULT_CONFIG_NAME), false),
        };
        if !path.exists() {
            if explicit {
                tracing::warn!(path = %path.display(), "augment config not found; using defaults");
            }
            return Self::default();
        }
        let cfg = match Self::from_path(&path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load augment config; using defaults");
                return Self::default();
            }
        };
        if let Err(err) = cfg.validate() {
            tracing::warn!(error = %err, "augment config rejected; using defaults");
            return Self::default();
        }
        cfg
    }

    pub fn from_path(path: &Path) -> AugmentResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| AugmentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: AugmentConfigFile =
            toml::from_str(&raw).map_err(|source| AugmentError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_file(file)
    }

    fn from_file(file: AugmentConfigFile) -> AugmentResult<Self> {
        let defaults = Self::default();
        let canvas = match file.canvas {
            Some(raw) => raw.parse()?,
            None => defaults.canvas,
        };
        let chances = file.chances.unwrap_or_default();
        let pixelate = file.pixelate.unwrap_or_default();
        let color = file.color.unwrap_or_default();
        let resize = file.resize.unwrap_or_default();

        Ok(Self {
            canvas,
            p_rotate: chances.rotate.unwrap_or(defaults.p_rotate),
            p_flip: chances.flip.unwrap_or(defaults.p_flip),
            p_pixelate: chances.pixelate.unwrap_or(defaults.p_pixelate),
            p_mixup: chances.mixup.unwrap_or(defaults.p_mixup),
            p_mosaic: chances.mosaic.unwrap_or(defaults.p_mosaic),
            p_resize: chances.resize.unwrap_or(defaults.p_resize),
            p_color: chances.color.unwrap_or(defaults.p_color),
            pixelate_count_max: pixelate.count_max.unwrap_or(defaults.pixelate_count_max),
            pixelate_mask_ratio: pixelate.mask_ratio.unwrap_or(defaults.pixelate_mask_ratio),
            pixelate_kernel_ratio: pixelate
                .kernel_ratio
                .unwrap_or(defaults.pixelate_kernel_ratio),
            color_hue_range: color.hue.unwrap_or(defaults.color_hue_range),
            color_sat_range: color.sat.unwrap_or(defaults.color_sat_range),
            color_val_range: color.val.unwrap_or(defaults.color_val_range),
            resize_scale_range: (
                resize.scale_min.unwrap_or(defaults.resize_scale_range.0),
                resize.scale_max.unwrap_or(defaults.resize_scale_range.1),
            ),
            seed: file.seed,
            pool_labels: file.pool_labels.map(|v| expand_path(&v)),
            image_root: file.image_root.map(|v| expand_path(&v)),
        })
    }

    /// Checks the policy for values the stages cannot run with.
    pub fn validate(&self) -> AugmentResult<()> {
        let mut problems = Vec::new();
        for (name, chance) in self.chances() {
            if chance.denominator == 0 {
                problems.push(format!("{name} chance has a zero denominator"));
            } else if chance.numerator > chance.denominator {
                problems.push(format!("{name} chance {chance} exceeds 1"));
            }
        }
        if self.canvas.height < 2 || self.canvas.width < 2 {
            problems.push(format!("canvas {} must be at least 2x2", self.canvas));
        }
        if self.pixelate_count_max < 2 {
            problems.push(format!(
                "pixelate count_max {} must be at least 2",
                self.pixelate_count_max
            ));
        }
        for (name, ratio) in [
            ("pixelate mask_ratio", self.pixelate_mask_ratio),
            ("pixelate kernel_ratio", self.pixelate_kernel_ratio),
        ] {
            if !(ratio > 0.0 && ratio < 1.0) {
                problems.push(format!("{name} {ratio} must lie in (0, 1)"));
            }
        }
        if !(0.0..=0.5).contains(&self.color_hue_range) {
            problems.push(format!(
                "color hue {} must lie in [0, 0.5]",
                self.color_hue_range
            ));
        }
        for (name, range) in [("sat", self.color_sat_range), ("val", self.color_val_range)] {
            if !(range >= 1.0 && range.is_finite()) {
                problems.push(format!("color {name} {range} must be a finite gain >= 1"));
            }
        }
        let (lo, hi) = self.resize_scale_range;
        if !(lo > 0.0 && lo <= hi && hi.is_finite()) {
            problems.push(format!("resize scale range [{lo}, {hi}] is not a positive interval"));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AugmentError::InvalidConfig(problems.join("; ")))
        }
    }

    fn chances(&self) -> [(&'static str, Chance); 7] {
        [
            ("rotate", self.p_rotate),
            ("flip", self.p_flip),
            ("pixelate", self.p_pixelate),
            ("mixup", self.p_mixup),
            ("mosaic", self.p_mosaic),
            ("resize", self.p_resize),
            ("color", self.p_color),
        ]
    }

    pub fn describe(&self) -> String {
        format!(
            "canvas={} rotate={} flip={} pixelate={} (max={} mask={:.2} kernel={:.2}) mixup={} mosaic={} resize={} scale=[{:.2},{:.2}] color={} (h={:.2} s={:.2} v={:.2}) seed={}",
            self.canvas,
            self.p_rotate,
            self.p_flip,
            self.p_pixelate,
            self.pixelate_count_max,
            self.pixelate_mask_ratio,
            self.pixelate_kernel_ratio,
            self.p_mixup,
            self.p_mosaic,
            self.p_resize,
            self.resize_scale_range.0,
            self.resize_scale_range.1,
            self.p_color,
            self.color_hue_range,
            self.color_sat_range,
            self.color_val_range,
            self.seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    }
}

pub(crate) fn expand_path(raw: &str) -> PathBuf {
    let mut out = raw.to_string();
    if let Some(stripped) = out.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            out = format!("{home}{stripped}");
        }
    }
    PathBuf::from(expand_env(&out))
}

/// Substitutes `${VAR}`; unknown variables are left as written.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let key = &rest[start + 2..start + 2 + end];
        match std::env::var(key) {
            Ok(val) => out.push_str(&val),
            Err(_) => out.push_str(&rest[start..start + 3 + end]),
        }
        rest = &rest[start + 3 + end..];
    }
    out.push_str(rest);
    out
}
