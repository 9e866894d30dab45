use std::fmt;

use chrono::TimeDelta;
use polars::prelude::*;
use thiserror::Error;

use crate::merge_policy::MergePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AlignError {
    #[error("{side} table has no timestamp column '{column}'")]
    MissingTimestamp { side: Side, column: String },
    #[error("{side} table has {count} null values in timestamp column '{column}'")]
    NullTimestamps {
        side: Side,
        column: String,
        count: usize,
    },
    #[error("tolerance must not be negative, got {0}")]
    InvalidTolerance(TimeDelta),
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

/// Result of a nearest as-of join: one row per left row, in ascending timestamp order.
#[derive(Debug, Clone)]
pub struct AlignedTable {
    df: DataFrame,
    timestamp_column: String,
    matches: Vec<Option<usize>>,
}

impl AlignedTable {
    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn into_df(self) -> DataFrame {
        self.df
    }

    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }

    /// For each output row, the right-table row it was joined to, if any.
    pub fn matches(&self) -> &[Option<usize>] {
        &self.matches
    }

    pub fn matched_rows(&self) -> usize {
        self.matches.iter().filter(|m| m.is_some()).count()
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }
}

/// For each left timestamp, the index of the nearest right timestamp within `tolerance`.
///
/// `right` must be ascending. The backward candidate is the last right value `<= t`, the
/// forward candidate the first value `>= t`; both are bounded inclusively by `tolerance`, and
/// a distance tie goes to the backward candidate.
pub fn nearest_matches(left: &[i64], right: &[i64], tolerance: i64) -> Vec<Option<usize>> {
    left.iter()
        .map(|&ts| {
            let upper = right.partition_point(|&value| value <= ts);
            let backward = upper
                .checked_sub(1)
                .map(|idx| (idx, ts.saturating_sub(right[idx])))
                .filter(|&(_, distance)| distance <= tolerance);
            let forward = right
                .get(upper)
                .map(|&value| (upper, value.saturating_sub(ts)))
                .filter(|&(_, distance)| distance <= tolerance);

            match (backward, forward) {
                (Some((b, bd)), Some((f, fd))) => Some(if bd <= fd { b } else { f }),
                (Some((b, _)), None) => Some(b),
                (None, Some((f, _))) => Some(f),
                (None, None) => None,
            }
        })
        .collect()
}

/// Joins every `left` row to the `right` row closest in time, within `tolerance`.
///
/// The output holds the left columns (the timestamp included), followed by the right columns
/// except its timestamp. Colliding names are renamed through `policy`. Right columns are null
/// on rows without a match. Neither input needs to be sorted.
pub fn align(
    left: &DataFrame,
    left_timestamp: &str,
    right: &DataFrame,
    right_timestamp: &str,
    tolerance: TimeDelta,
    policy: &MergePolicy,
) -> Result<AlignedTable, AlignError> {
    if tolerance < TimeDelta::zero() {
        return Err(AlignError::InvalidTolerance(tolerance));
    }
    let tolerance_us = tolerance.num_microseconds().unwrap_or(i64::MAX);

    let left_ts = timestamp_micros(left, left_timestamp, Side::Left)?;
    let right_ts = timestamp_micros(right, right_timestamp, Side::Right)?;

    let left_order = sort_order(&left_ts);
    let right_order = sort_order(&right_ts);

    let left = match &left_order {
        Some(order) => left.take(&gather_indices(order.iter().map(|&idx| Some(idx))))?,
        None => left.clone(),
    };
    let left_sorted: Vec<i64> = match &left_order {
        Some(order) => order.iter().map(|&idx| left_ts[idx]).collect(),
        None => left_ts,
    };
    let right_sorted: Vec<i64> = match &right_order {
        Some(order) => order.iter().map(|&idx| right_ts[idx]).collect(),
        None => right_ts,
    };

    // Indices into the caller's right frame, not the sorted copy.
    let matches: Vec<Option<usize>> = nearest_matches(&left_sorted, &right_sorted, tolerance_us)
        .into_iter()
        .map(|found| {
            found.map(|idx| match &right_order {
                Some(order) => order[idx],
                None => idx,
            })
        })
        .collect();

    let renames = policy.rename_map(
        left.get_column_names_str(),
        right.get_column_names_str(),
        left_timestamp,
    );

    let mut columns: Vec<Column> = Vec::with_capacity(left.width() + right.width());
    for column in left.get_columns() {
        let name = renames.left_name(column.name().as_str());
        columns.push(
            column
                .as_materialized_series()
                .clone()
                .with_name(name.into())
                .into(),
        );
    }

    let right_rest: Vec<&Column> = right
        .get_columns()
        .iter()
        .filter(|column| column.name().as_str() != right_timestamp)
        .collect();
    let any_match = matches.iter().any(Option::is_some);
    let gathered = if any_match {
        let indices = gather_indices(matches.iter().copied());
        Some(right.select(right_rest.iter().map(|c| c.name().clone()))?.take(&indices)?)
    } else {
        None
    };

    for column in right_rest {
        let original = column.name().as_str();
        let name: PlSmallStr = renames.right_name(original).into();
        let series = match &gathered {
            Some(frame) => frame
                .column(original)?
                .as_materialized_series()
                .clone()
                .with_name(name),
            None => Series::full_null(name, left.height(), column.dtype()),
        };
        columns.push(series.into());
    }

    Ok(AlignedTable {
        df: DataFrame::new(columns)?,
        timestamp_column: left_timestamp.to_string(),
        matches,
    })
}

fn timestamp_micros(df: &DataFrame, column: &str, side: Side) -> Result<Vec<i64>, AlignError> {
    let values = df
        .column(column)
        .map_err(|_| AlignError::MissingTimestamp {
            side,
            column: column.to_string(),
        })?
        .cast(&DataType::Int64)?;
    let values = values.i64()?;

    let nulls = values.null_count();
    if nulls > 0 {
        return Err(AlignError::NullTimestamps {
            side,
            column: column.to_string(),
            count: nulls,
        });
    }
    Ok(values.into_no_null_iter().collect())
}

/// Stable ascending order, or `None` when the input is already sorted.
fn sort_order(values: &[i64]) -> Option<Vec<usize>> {
    if values.windows(2).all(|pair| pair[0] <= pair[1]) {
        return None;
    }
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by_key(|&idx| values[idx]);
    Some(order)
}

fn gather_indices(indices: impl Iterator<Item = Option<usize>>) -> IdxCa {
    let indices: Vec<Option<IdxSize>> = indices
        .map(|idx| idx.and_then(|idx| IdxSize::try_from(idx).ok()))
        .collect();
    IdxCa::new("idx".into(), indices)
}
