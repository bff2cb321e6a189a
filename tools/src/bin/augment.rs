use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rayon::prelude::*;
use yolo_augment::{read_label_lines, write_label_lines, AugmentConfig, Augmenter, Canvas, LabelLine};
use yolo_augment_tools::{init_tracing, output_image_path, parse_canvas, save_sample};

#[derive(Parser, Debug)]
#[command(
    name = "augment",
    about = "Write randomly augmented copies of a labeled image set"
)]
struct Args {
    /// Label file, one `<path> <x1,y1,x2,y2,class> ...` line per image.
    #[arg(long)]
    labels: PathBuf,
    /// Output directory for images and the new label file.
    #[arg(long, default_value = "augmented")]
    out: PathBuf,
    /// Number of samples to generate (defaults to one per label line).
    #[arg(long)]
    count: Option<usize>,
    /// TOML policy file; falls back to $YOLO_AUGMENT_CONFIG / yolo-augment.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output canvas as HxW, overriding the config.
    #[arg(long, value_parser = parse_canvas)]
    canvas: Option<Canvas>,
    /// Base seed; sample i uses `seed ^ i`.
    #[arg(long)]
    seed: Option<u64>,
    /// Label file for mixup/mosaic partners (defaults to --labels).
    #[arg(long)]
    pool: Option<PathBuf>,
    /// Root for relative image paths.
    #[arg(long)]
    image_root: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => AugmentConfig::from_path(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => AugmentConfig::load(),
    };
    if let Some(canvas) = args.canvas {
        cfg.canvas = canvas;
    }
    if args.image_root.is_some() {
        cfg.image_root = args.image_root.clone();
    }
    let seed = args.seed.or(cfg.seed).unwrap_or_else(rand::random);
    cfg.seed = Some(seed);
    cfg.pool_labels = Some(
        args.pool
            .clone()
            .or(cfg.pool_labels.take())
            .unwrap_or_else(|| args.labels.clone()),
    );

    let lines = read_label_lines(&args.labels)
        .with_context(|| format!("read labels {}", args.labels.display()))?;
    if lines.is_empty() {
        bail!("no label lines in {}", args.labels.display());
    }
    let augmenter = Augmenter::from_config(cfg).context("build augmenter")?;
    tracing::info!(seed, policy = %augmenter.describe(), "augmenting");

    fs::create_dir_all(&args.out).with_context(|| format!("create {}", args.out.display()))?;
    let count = args.count.unwrap_or(lines.len());

    let written: Vec<Option<LabelLine>> = (0..count)
        .into_par_iter()
        .map(|index| {
            let line = &lines[index % lines.len()];
            let result = augmenter
                .augment_line_indexed(line, index as u64)
                .map_err(anyhow::Error::from)
                .and_then(|sample| {
                    let path = output_image_path(&args.out, index);
                    save_sample(&sample, &path)?;
                    Ok(LabelLine::new(path, sample.boxes))
                });
            match result {
                Ok(out) => Some(out),
                Err(err) => {
                    tracing::warn!(index, source = %line.path.display(), error = %err, "augmentation failed; skipping");
                    None
                }
            }
        })
        .collect();

    let written: Vec<LabelLine> = written.into_iter().flatten().collect();
    let label_path = args.out.join("labels.txt");
    write_label_lines(&label_path, &written)
        .with_context(|| format!("write {}", label_path.display()))?;

    tracing::info!(
        written = written.len(),
        skipped = count - written.len(),
        labels = %label_path.display(),
        "done"
    );
    Ok(())
}
