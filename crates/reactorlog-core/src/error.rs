use std::fmt;

use serde::Serialize;
use thiserror::Error;

use reactorlog_parser::ParserError;

use crate::alignment::AlignError;
use crate::segmentation::SegmentationError;

/// Which alignment of a run an error or skipped output belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentScope {
    Overall,
    Stage(u32),
}

impl fmt::Display for AlignmentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignmentScope::Overall => write!(f, "overall"),
            AlignmentScope::Stage(stage) => write!(f, "stage {stage}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ReactorError {
    #[error("failed to parse {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: ParserError,
    },

    #[error("stage segmentation failed: {0}")]
    Segmentation(#[from] SegmentationError),

    #[error("{scope} alignment failed: {source}")]
    Alignment {
        scope: AlignmentScope,
        #[source]
        source: AlignError,
    },

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid configuration file: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("report not found: {0}")]
    ReportNotFound(String),

    #[error("file {path} not found in report {report}")]
    ReportFileNotFound { report: String, path: String },

    #[error("no stage data found in report {0} for the selected stages")]
    NoStageData(String),

    #[error("a report named {0} already exists")]
    ReportExists(String),

    #[error("invalid report path: {0}")]
    InvalidReportPath(String),

    #[error("no data sources provided for comparison")]
    NoComparisonSources,
}

impl ReactorError {
    /// Fields a parser reported as missing from a header, if this is a schema mismatch.
    pub fn missing_fields(&self) -> &[String] {
        match self {
            ReactorError::Parse { source, .. } => source.missing_fields(),
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, ReactorError>;
