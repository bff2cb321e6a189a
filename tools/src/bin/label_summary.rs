use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use yolo_augment::{
    summarize_with_thresholds, FsImageSource, ValidationOutcome, ValidationThresholds,
};
use yolo_augment_tools::init_tracing;

#[derive(Parser, Debug)]
#[command(
    name = "label_summary",
    about = "Count lines, boxes and problems in a label file"
)]
struct Args {
    /// Label file to check.
    labels: PathBuf,
    /// Root for relative image paths.
    #[arg(long)]
    image_root: Option<PathBuf>,
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let source = match &args.image_root {
        Some(root) => FsImageSource::with_root(root),
        None => FsImageSource::new(),
    };
    let thresholds = ValidationThresholds::from_env();
    let report = summarize_with_thresholds(&args.labels, &source, &thresholds)
        .with_context(|| format!("summarize {}", args.labels.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let s = &report.summary;
        println!(
            "{}: {} lines ({} with boxes, {} empty), {} boxes ({} degenerate), {} invalid, {} missing images",
            args.labels.display(),
            s.total,
            s.non_empty,
            s.empty,
            s.boxes,
            s.degenerate_boxes,
            s.invalid,
            s.missing_image
        );
        println!("outcome: {}", report.outcome.as_str());
        for reason in &report.reasons {
            println!("  - {reason}");
        }
    }

    if report.outcome == ValidationOutcome::Fail {
        bail!("label file failed validation");
    }
    Ok(())
}
