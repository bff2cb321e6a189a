//! Shared helpers for the `augment` and `label_summary` binaries.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use yolo_augment::{AugmentedSample, Canvas};

/// `clap` value parser for `HxW` canvas arguments.
pub fn parse_canvas(s: &str) -> Result<Canvas, String> {
    let canvas: Canvas = s.parse().map_err(|e| format!("{e}"))?;
    if canvas.height == 0 || canvas.width == 0 {
        return Err(format!("canvas sides must be positive, got {s:?}"));
    }
    Ok(canvas)
}

/// Installs the fmt subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Output image path for the `index`-th augmented sample.
pub fn output_image_path(out_dir: &Path, index: usize) -> PathBuf {
    out_dir.join(format!("aug_{index:06}.png"))
}

pub fn save_sample(sample: &AugmentedSample, path: &Path) -> Result<()> {
    sample
        .save(path)
        .with_context(|| format!("write {}", path.display()))
}
