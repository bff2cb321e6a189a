//! Label line text format and class-name bookkeeping.
//!
//! A label line is `<path> <x1,y1,x2,y2[,class]> ...`; a 4-field tuple means class `0`.

use crate::types::{AugmentError, AugmentResult, BoundingBox};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelLine {
    pub path: PathBuf,
    pub boxes: Vec<BoundingBox>,
}

impl LabelLine {
    pub fn new(path: impl Into<PathBuf>, boxes: Vec<BoundingBox>) -> Self {
        Self {
            path: path.into(),
            boxes,
        }
    }

    /// Builds a line from boxes tagged with class names, assigning ids through `mapping`.
    pub fn from_named_boxes<'a, I>(path: impl Into<PathBuf>, boxes: I, mapping: &mut ClassMapping) -> Self
    where
        I: IntoIterator<Item = (&'a str, [i32; 4])>,
    {
        let boxes = boxes
            .into_iter()
            .map(|(name, [x1, y1, x2, y2])| {
                BoundingBox::new(x1, y1, x2, y2, mapping.get_or_insert(name))
            })
            .collect();
        Self::new(path, boxes)
    }
}

fn malformed(line: &str, reason: impl Into<String>) -> AugmentError {
    AugmentError::MalformedLabelLine {
        line: line.to_string(),
        reason: reason.into(),
    }
}

fn parse_coord(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    raw.parse::<i32>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i32))
}

fn parse_box(token: &str) -> Result<BoundingBox, String> {
    let fields: Vec<&str> = token.split(',').collect();
    if fields.len() != 4 && fields.len() != 5 {
        return Err(format!(
            "box {token:?} has {} fields, expected 4 or 5",
            fields.len()
        ));
    }
    let mut coords = [0i32; 4];
    for (slot, raw) in coords.iter_mut().zip(&fields) {
        *slot = parse_coord(raw).ok_or_else(|| format!("bad coordinate {raw:?} in box {token:?}"))?;
    }
    let class_id = match fields.get(4) {
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("bad class id {raw:?} in box {token:?}"))?,
        None => 0,
    };
    let [x1, y1, x2, y2] = coords;
    Ok(BoundingBox::new(x1, y1, x2, y2, class_id))
}

impl FromStr for LabelLine {
    type Err = AugmentError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let path = tokens
            .next()
            .ok_or_else(|| malformed(line, "empty line"))?;
        let boxes = tokens
            .map(parse_box)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| malformed(line, reason))?;
        Ok(Self::new(path, boxes))
    }
}

impl fmt::Display for LabelLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        for b in &self.boxes {
            write!(f, " {b}")?;
        }
        Ok(())
    }
}

/// Parses one label line per non-blank line of `path`.
pub fn read_label_lines(path: &Path) -> AugmentResult<Vec<LabelLine>> {
    let text = fs::read_to_string(path).map_err(|source| AugmentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_label_lines(&text)
}

pub fn parse_label_lines(text: &str) -> AugmentResult<Vec<LabelLine>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            line.parse::<LabelLine>().map_err(|err| match err {
                AugmentError::MalformedLabelLine { line, reason } => AugmentError::MalformedLabelLine {
                    line,
                    reason: format!("line {}: {reason}", idx + 1),
                },
                other => other,
            })
        })
        .collect()
}

pub fn write_label_lines(path: &Path, lines: &[LabelLine]) -> AugmentResult<()> {
    let mut text = String::new();
    for line in lines {
        text.push_str(&line.to_string());
        text.push('\n');
    }
    fs::write(path, text).map_err(|source| AugmentError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Name ↔ id table. Ids are handed out in first-seen order starting at `0`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassMapping {
    names: Vec<String>,
    ids: HashMap<String, u32>,
}

impl ClassMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert(&mut self, name: &str) -> u32 {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn id(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// One class name per line; line order gives the id. Blank lines are ignored.
    pub fn from_names_file(path: &Path) -> AugmentResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| AugmentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut mapping = Self::new();
        for name in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            mapping.get_or_insert(name);
        }
        Ok(mapping)
    }

    pub fn write_names_file(&self, path: &Path) -> AugmentResult<()> {
        let mut text = self.names.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        fs::write(path, text).map_err(|source| AugmentError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
