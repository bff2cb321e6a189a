//! Label file quality checks.

use crate::label::LabelLine;
use crate::pool::ImageSource;
use crate::types::{AugmentError, AugmentResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSummary {
    /// Non-blank lines seen.
    pub total: usize,
    pub non_empty: usize,
    pub empty: usize,
    pub missing_image: usize,
    /// Lines that failed to parse.
    pub invalid: usize,
    pub boxes: usize,
    /// Boxes with no area (`x1 >= x2` or `y1 >= y2`).
    pub degenerate_boxes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Pass,
    Warn,
    Fail,
}

impl ValidationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationOutcome::Pass => "pass",
            ValidationOutcome::Warn => "warn",
            ValidationOutcome::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationThresholds {
    pub max_invalid: Option<usize>,
    pub max_missing: Option<usize>,
    pub max_empty: Option<usize>,
    pub max_invalid_ratio: Option<f32>,
    pub max_missing_ratio: Option<f32>,
    pub max_empty_ratio: Option<f32>,
    pub max_degenerate: Option<usize>,
    /// Share of all boxes, not of lines.
    pub max_degenerate_ratio: Option<f32>,
}

impl ValidationThresholds {
    pub fn from_env() -> Self {
        fn parse_usize(key: &str) -> Option<usize> {
            std::env::var(key).ok()?.parse().ok()
        }
        fn parse_ratio(key: &str) -> Option<f32> {
            std::env::var(key).ok()?.parse().ok()
        }
        ValidationThresholds {
            max_invalid: parse_usize("YOLO_AUGMENT_MAX_INVALID"),
            max_missing: parse_usize("YOLO_AUGMENT_MAX_MISSING"),
            max_empty: parse_usize("YOLO_AUGMENT_MAX_EMPTY"),
            max_invalid_ratio: parse_ratio("YOLO_AUGMENT_MAX_INVALID_RATIO"),
            max_missing_ratio: parse_ratio("YOLO_AUGMENT_MAX_MISSING_RATIO"),
            max_empty_ratio: parse_ratio("YOLO_AUGMENT_MAX_EMPTY_RATIO"),
            max_degenerate: parse_usize("YOLO_AUGMENT_MAX_DEGENERATE"),
            max_degenerate_ratio: parse_ratio("YOLO_AUGMENT_MAX_DEGENERATE_RATIO"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub outcome: ValidationOutcome,
    pub reasons: Vec<String>,
    pub summary: LabelSummary,
}

/// Counts lines, boxes and problems in label text; image presence is checked via `source`.
pub fn summarize_label_text(text: &str, source: &dyn ImageSource) -> LabelSummary {
    let mut summary = LabelSummary::default();
    for (idx, raw) in text.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        summary.total += 1;
        let line = match raw.parse::<LabelLine>() {
            Ok(line) => line,
            Err(err) => {
                tracing::debug!(line = idx + 1, error = %err, "invalid label line");
                summary.invalid += 1;
                continue;
            }
        };
        if line.boxes.is_empty() {
            summary.empty += 1;
        } else {
            summary.non_empty += 1;
        }
        summary.boxes += line.boxes.len();
        summary.degenerate_boxes += line.boxes.iter().filter(|b| b.area() == 0).count();
        if !source.exists(&line.path) {
            tracing::debug!(path = %line.path.display(), "label line image missing");
            summary.missing_image += 1;
        }
    }
    summary
}

pub fn summarize_label_file(path: &Path, source: &dyn ImageSource) -> AugmentResult<LabelSummary> {
    let text = std::fs::read_to_string(path).map_err(|source| AugmentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(summarize_label_text(&text, source))
}

/// One counted problem and the limits it is held to. Ratios are taken against `of`: label
/// lines for line-level problems, boxes for box-level ones.
struct Check<'a> {
    label: &'a str,
    count: usize,
    of: usize,
    max_count: Option<usize>,
    max_ratio: Option<f32>,
}

impl Check<'_> {
    /// Any occurrence warns; exceeding a limit fails.
    fn apply(&self, outcome: &mut ValidationOutcome, reasons: &mut Vec<String>) {
        if self.count == 0 {
            return;
        }
        let ratio = self.count as f32 / self.of.max(1) as f32;
        let mut failed = false;
        if let Some(max) = self.max_count.filter(|max| self.count > *max) {
            failed = true;
            reasons.push(format!("{}: {} exceeds max {max}", self.label, self.count));
        }
        if let Some(max) = self.max_ratio.filter(|max| ratio > *max) {
            failed = true;
            reasons.push(format!("{}: ratio {ratio:.3} exceeds max {max:.3}", self.label));
        }
        if failed {
            *outcome = ValidationOutcome::Fail;
        } else {
            if *outcome == ValidationOutcome::Pass {
                *outcome = ValidationOutcome::Warn;
            }
            reasons.push(format!("{}: {} observed", self.label, self.count));
        }
    }
}

pub fn validate_summary(
    summary: LabelSummary,
    thresholds: &ValidationThresholds,
) -> ValidationReport {
    let checks = [
        Check {
            label: "missing images",
            count: summary.missing_image,
            of: summary.total,
            max_count: thresholds.max_missing,
            max_ratio: thresholds.max_missing_ratio,
        },
        Check {
            label: "invalid lines",
            count: summary.invalid,
            of: summary.total,
            max_count: thresholds.max_invalid,
            max_ratio: thresholds.max_invalid_ratio,
        },
        Check {
            label: "empty lines",
            count: summary.empty,
            of: summary.total,
            max_count: thresholds.max_empty,
            max_ratio: thresholds.max_empty_ratio,
        },
        Check {
            label: "degenerate boxes",
            count: summary.degenerate_boxes,
            of: summary.boxes,
            max_count: thresholds.max_degenerate,
            max_ratio: thresholds.max_degenerate_ratio,
        },
    ];

    let mut outcome = ValidationOutcome::Pass;
    let mut reasons = Vec::new();
    for check in &checks {
        check.apply(&mut outcome, &mut reasons);
    }
    ValidationReport {
        outcome,
        reasons,
        summary,
    }
}

pub fn summarize_with_thresholds(
    path: &Path,
    source: &dyn ImageSource,
    thresholds: &ValidationThresholds,
) -> AugmentResult<ValidationReport> {
    let summary = summarize_label_file(path, source)?;
    Ok(validate_summary(summary, thresholds))
}
