//! Dates embedded in file names.
//!
//! A date template such as `%Y-%m-%d` is compiled into a glob pattern
//! (`[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]`) to find dated rasters,
//! and into a regex to pull the date back out of each file name.

use chrono::NaiveDate;
use itertools::Itertools;
use log::{debug, warn};
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::errors::{CuberError, InputError, Result};

const DIGIT: &str = "[0-9]";

enum Segment {
    Literal(char),
    Digits(usize),
}

/// Fixed digit count of a `%` token, `None` for unknown tokens.
fn token_width(token: char) -> Option<usize> {
    match token {
        'Y' => Some(4),
        'm' | 'd' => Some(2),
        'j' => Some(3),
        _ => None,
    }
}

fn segments(template: &str) -> Vec<Segment> {
    let mut segments = Vec::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(current) = chars.next() {
        match (current, chars.peek().copied().and_then(token_width)) {
            ('%', Some(width)) => {
                chars.next();
                segments.push(Segment::Digits(width));
            }
            (literal, _) => segments.push(Segment::Literal(literal)),
        }
    }
    segments
}

/// Raster file with the date found in its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedFile {
    pub date: NaiveDate,
    pub path: PathBuf,
}

impl DatedFile {
    /// ISO 8601 date, used as cube time label.
    pub fn label(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    /// Paths and time labels in the same order.
    pub fn unzip(files: Vec<DatedFile>) -> (Vec<PathBuf>, Vec<String>) {
        files
            .into_iter()
            .map(|file| {
                let label = file.label();
                (file.path, label)
            })
            .unzip()
    }
}

/// Glob pattern built from a date template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateGlob {
    template: String,
    pattern: String,
}

impl DateGlob {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let pattern = Self::compile(&template);
        Self { template, pattern }
    }

    /// Replace `%Y`, `%m`, `%d` and `%j` with digit classes of their width,
    /// every other character is kept as is.
    pub fn compile(template: &str) -> String {
        segments(template)
            .into_iter()
            .map(|segment| match segment {
                Segment::Literal(literal) => literal.to_string(),
                Segment::Digits(width) => DIGIT.repeat(width),
            })
            .collect()
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Regex matching the same strings as [DateGlob::pattern].
    pub fn regex(&self) -> Result<Regex> {
        let expression: String = segments(&self.template)
            .into_iter()
            .map(|segment| match segment {
                Segment::Literal(literal) => regex::escape(&literal.to_string()),
                Segment::Digits(width) => format!("{DIGIT}{{{width}}}"),
            })
            .collect();
        Regex::new(&expression).map_err(|err| {
            CuberError::from(InputError::InvalidPattern {
                pattern: expression.clone(),
                message: err.to_string(),
            })
        })
    }

    /// Files under `dir` (recursively) with a date in their name and `extension`,
    /// sorted by date.
    pub fn discover(&self, dir: impl AsRef<Path>, extension: &str) -> Result<Vec<DatedFile>> {
        let dir = dir.as_ref();
        let glob_pattern = format!(
            "{}/**/*{}*.{}",
            glob::Pattern::escape(&dir.to_string_lossy()),
            self.pattern,
            extension.trim_start_matches('.')
        );
        debug!("searching {glob_pattern}");
        let paths = glob::glob(&glob_pattern).map_err(|err| InputError::InvalidPattern {
            pattern: glob_pattern.clone(),
            message: err.to_string(),
        })?;
        let regex = self.regex()?;

        let files: Vec<DatedFile> = paths
            .filter_map(|entry| {
                entry
                    .map_err(|err| warn!("skipping unreadable path: {err}"))
                    .ok()
            })
            .filter_map(|path| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                let value = regex.find(&name)?.as_str().to_string();
                Some((path, value))
            })
            .map(|(path, value)| {
                NaiveDate::parse_from_str(&value, &self.template)
                    .map(|date| DatedFile { date, path })
                    .map_err(|source| {
                        CuberError::from(InputError::UnparseableDate {
                            value,
                            template: self.template.clone(),
                            source,
                        })
                    })
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .sorted_by(|lhs, rhs| lhs.date.cmp(&rhs.date).then_with(|| lhs.path.cmp(&rhs.path)))
            .collect();

        if files.is_empty() {
            Err(InputError::NoDatedFiles {
                dir: dir.to_path_buf(),
                pattern: self.pattern.clone(),
            })?
        }
        debug!("found {} dated files in {dir:?}", files.len());
        Ok(files)
    }
}
