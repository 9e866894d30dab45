use polars::prelude::*;
use thiserror::Error;

use reactorlog_parser::LvTable;

pub const STAGE_COLUMN: &str = "Stage";

#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("relative time column '{0}' not found")]
    MissingRelativeTime(String),
    #[error("relative time column '{column}' is not numeric: {source}")]
    NotNumeric {
        column: String,
        #[source]
        source: PolarsError,
    },
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

/// Assigns a stage to every value in order. The stage starts at 1 and increments whenever a
/// value is strictly below the one before it; a missing value on either side never splits.
///
/// Any single backwards step splits, so one out-of-order sample in the middle of a run
/// produces an extra stage.
pub fn stage_labels(relative_time: &[Option<f64>]) -> Vec<u32> {
    let mut labels = Vec::with_capacity(relative_time.len());
    let mut stage = 1u32;
    let mut previous: Option<f64> = None;

    for (idx, current) in relative_time.iter().copied().enumerate() {
        if idx > 0 {
            if let (Some(prev), Some(cur)) = (previous, current) {
                if cur < prev {
                    stage += 1;
                }
            }
        }
        labels.push(stage);
        previous = current;
    }

    labels
}

/// A controller log carrying a `Stage` column. Stages are contiguous runs of rows.
#[derive(Debug, Clone)]
pub struct SegmentedLog {
    df: DataFrame,
    timestamp_column: String,
    labels: Vec<u32>,
    stage_count: u32,
}

impl SegmentedLog {
    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }

    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    pub fn stage_count(&self) -> u32 {
        self.stage_count
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    /// Rows labelled `stage`, in their original order. Unknown stages yield an empty frame.
    pub fn stage_frame(&self, stage: u32) -> DataFrame {
        let start = self.labels.partition_point(|&label| label < stage);
        let end = self.labels.partition_point(|&label| label <= stage);
        let offset = i64::try_from(start).unwrap_or(i64::MAX);
        self.df.slice(offset, end.saturating_sub(start))
    }

    pub fn stages(&self) -> impl Iterator<Item = (u32, DataFrame)> + '_ {
        (1..=self.stage_count).map(|stage| (stage, self.stage_frame(stage)))
    }
}

/// Labels every row of a timestamp-sorted controller log with its stage.
///
/// An empty log yields an empty frame and a stage count of zero.
pub fn segment(lv: &LvTable) -> Result<SegmentedLog, SegmentationError> {
    let column_name = lv.relative_time_column();
    let column = lv
        .df()
        .column(column_name)
        .map_err(|_| SegmentationError::MissingRelativeTime(column_name.to_string()))?;
    let values: Vec<Option<f64>> = column
        .cast(&DataType::Float64)
        .map_err(|source| SegmentationError::NotNumeric {
            column: column_name.to_string(),
            source,
        })?
        .f64()?
        .into_iter()
        .collect();

    let labels = stage_labels(&values);
    let stage_count = labels.last().copied().unwrap_or(0);

    let mut df = lv.df().clone();
    df.with_column(Series::new(STAGE_COLUMN.into(), labels.clone()))?;

    Ok(SegmentedLog {
        df,
        timestamp_column: lv.timestamp_column().to_string(),
        labels,
        stage_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resets_start_new_stages() {
        let values = [Some(0.0), Some(1.0), Some(2.0), Some(0.0), Some(1.0)];
        assert_eq!(stage_labels(&values), vec![1, 1, 1, 2, 2]);
    }

    #[test]
    fn missing_values_never_split() {
        let values = [Some(5.0), None, Some(1.0), Some(2.0), None, None, Some(0.5)];
        assert_eq!(stage_labels(&values), vec![1, 1, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn equal_values_continue_the_stage() {
        let values = [Some(3.0), Some(3.0), Some(2.9), Some(2.9)];
        assert_eq!(stage_labels(&values), vec![1, 1, 2, 2]);
    }

    #[test]
    fn one_out_of_order_sample_splits_a_stage() {
        let values = [Some(10.0), Some(11.0), Some(10.9), Some(12.0)];
        assert_eq!(stage_labels(&values), vec![1, 1, 2, 2]);
    }

    #[test]
    fn single_and_empty_inputs() {
        assert_eq!(stage_labels(&[Some(42.0)]), vec![1]);
        assert_eq!(stage_labels(&[None]), vec![1]);
        assert!(stage_labels(&[]).is_empty());
    }

    #[test]
    fn labels_step_by_one_at_each_decrease() {
        let values: Vec<Option<f64>> = [0.0, 10.0, 3.0, 4.0, 1.0, 0.5, 7.0]
            .into_iter()
            .map(Some)
            .collect();
        let labels = stage_labels(&values);
        assert_eq!(labels, vec![1, 1, 2, 2, 3, 4, 4]);
        for pair in labels.windows(2) {
            assert!(pair[1] == pair[0] || pair[1] == pair[0] + 1);
        }
    }

    fn lv_table(minutes: &[i64], relative: Vec<Option<f64>>) -> LvTable {
        let micros: Vec<i64> = minutes.iter().map(|m| m * 60_000_000).collect();
        let date = Series::new("Date".into(), micros)
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
            .expect("datetime");
        let df = DataFrame::new(vec![
            date.into(),
            Series::new("RelativeTime".into(), relative).into(),
        ])
        .expect("df");
        LvTable::new(df, "Date", "RelativeTime")
    }

    #[test]
    fn segment_of_an_empty_log_has_no_stages() {
        let segmented = segment(&lv_table(&[], Vec::new())).expect("segment");
        assert_eq!(segmented.stage_count(), 0);
        assert_eq!(segmented.height(), 0);
        assert!(segmented.is_empty());
        assert_eq!(
            segmented.df().get_column_names_str(),
            vec!["Date", "RelativeTime", STAGE_COLUMN]
        );
        assert_eq!(segmented.stages().count(), 0);
    }

    #[test]
    fn segment_adds_a_stage_column_and_slices_stages() {
        let table = lv_table(
            &[0, 1, 2, 3, 4],
            vec![Some(0.0), Some(60.0), None, Some(0.0), Some(60.0)],
        );
        let segmented = segment(&table).expect("segment");

        assert_eq!(segmented.stage_count(), 2);
        let stages: Vec<Option<u32>> = segmented
            .df()
            .column(STAGE_COLUMN)
            .expect("stage column")
            .u32()
            .expect("u32")
            .into_iter()
            .collect();
        assert_eq!(stages, vec![Some(1), Some(1), Some(1), Some(2), Some(2)]);
        assert_eq!(segmented.stage_frame(1).height(), 3);
        assert_eq!(segmented.stage_frame(2).height(), 2);
        assert_eq!(segmented.stage_frame(3).height(), 0);
    }

    #[test]
    fn segment_without_relative_time_fails() {
        let date = Series::new("Date".into(), vec![0i64])
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
            .expect("datetime");
        let df = DataFrame::new(vec![date.into()]).expect("df");
        let err = segment(&LvTable::new(df, "Date", "RelativeTime")).expect_err("must fail");
        assert!(matches!(
            err,
            SegmentationError::MissingRelativeTime(ref column) if column == "RelativeTime"
        ));
    }
}
