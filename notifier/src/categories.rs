//! Report declarations grouped by category.

use indexmap::IndexMap;
use std::str::FromStr;

/// Report types the service knows how to read.
pub const SUPPORTED_TYPES: &[&str] = &["cobertura", "resharper", "pmd", "checkstyle"];

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ReportFileError {
    #[error("report declaration {0:?} must look like type=path")]
    Malformed(String),
    #[error("report type is required")]
    EmptyType,
    #[error("path is required for report type {0}")]
    EmptyPath(String),
}

/// One declared report: a type tag and a path pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportFile {
    pub r#type: String,
    pub path: String,
}

impl ReportFile {
    pub fn new(r#type: &str, path: &str) -> Result<Self, ReportFileError> {
        let r#type = r#type.trim();
        let path = path.trim();
        if r#type.is_empty() {
            return Err(ReportFileError::EmptyType);
        }
        if path.is_empty() {
            return Err(ReportFileError::EmptyPath(r#type.to_string()));
        }
        Ok(ReportFile {
            r#type: r#type.to_string(),
            path: path.to_string(),
        })
    }

    pub fn is_supported_type(&self) -> bool {
        SUPPORTED_TYPES
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&self.r#type))
    }
}

impl FromStr for ReportFile {
    type Err = ReportFileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (r#type, path) = s
            .split_once('=')
            .ok_or_else(|| ReportFileError::Malformed(s.to_string()))?;
        ReportFile::new(r#type, path)
    }
}

/// Category tag to path patterns. Each tag appears once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportCategories(IndexMap<String, Vec<String>>);

impl ReportCategories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, report: ReportFile) {
        if !report.is_supported_type() {
            tracing::warn!(category = %report.r#type, "report type is not a known type");
        }
        self.0.entry(report.r#type).or_default().push(report.path);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl FromIterator<ReportFile> for ReportCategories {
    fn from_iter<I: IntoIterator<Item = ReportFile>>(iter: I) -> Self {
        let mut categories = ReportCategories::new();
        for report in iter {
            categories.add(report);
        }
        categories
    }
}

impl<S: Into<String>> FromIterator<(S, Vec<S>)> for ReportCategories {
    fn from_iter<I: IntoIterator<Item = (S, Vec<S>)>>(iter: I) -> Self {
        ReportCategories(
            iter.into_iter()
                .map(|(tag, patterns)| (tag.into(), patterns.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }
}
