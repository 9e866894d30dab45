use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Counts gathered while turning raw log lines into table rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub dropped_malformed: usize,
    pub dropped_invalid_timestamp: usize,
    pub dropped_missing_numeric: usize,
}

#[derive(Debug, Clone)]
pub struct ParsedLog<T> {
    pub table: T,
    pub report: ParseReport,
}

impl<T> ParsedLog<T> {
    pub fn is_empty(&self) -> bool {
        self.report.rows_kept == 0
    }
}

/// Controller log rows, sorted ascending by timestamp.
#[derive(Debug, Clone)]
pub struct LvTable {
    df: DataFrame,
    timestamp_column: String,
    relative_time_column: String,
}

impl LvTable {
    pub fn new(
        df: DataFrame,
        timestamp_column: impl Into<String>,
        relative_time_column: impl Into<String>,
    ) -> Self {
        Self {
            df,
            timestamp_column: timestamp_column.into(),
            relative_time_column: relative_time_column.into(),
        }
    }

    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn into_df(self) -> DataFrame {
        self.df
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }

    pub fn relative_time_column(&self) -> &str {
        &self.relative_time_column
    }
}

/// Gas chromatograph rows, sorted ascending by timestamp.
#[derive(Debug, Clone)]
pub struct GcTable {
    df: DataFrame,
    timestamp_column: String,
}

impl GcTable {
    pub fn new(df: DataFrame, timestamp_column: impl Into<String>) -> Self {
        Self {
            df,
            timestamp_column: timestamp_column.into(),
        }
    }

    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn into_df(self) -> DataFrame {
        self.df
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }
}
