use std::collections::HashMap;

use chrono::NaiveDateTime;
use polars::prelude::*;

use crate::errors::ParserError;
use crate::model::ParseReport;

/// Everything the shared table reader needs to know about one log format.
pub(crate) struct TableSpec<'a> {
    pub parser: &'static str,
    pub delimiter: u8,
    pub metadata_lines: usize,
    pub units_lines: usize,
    pub timestamp_column: &'a str,
    pub timestamp_format: &'a str,
    pub timestamp_output: &'a str,
    pub numeric_fields: &'a [String],
    /// Fields that must be present in the header.
    pub header_required: &'a [String],
    /// Numeric fields whose missing value drops the row.
    pub row_required: &'a [String],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnRole {
    Timestamp,
    Numeric { required: bool },
    Text,
}

#[derive(Debug, Clone)]
struct ColumnPlan {
    name: String,
    source: usize,
    role: ColumnRole,
}

enum ColumnValues {
    Timestamp,
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

enum Cell {
    Timestamp,
    Number(Option<f64>),
    Text(Option<String>),
}

struct TableBuilder {
    parser: &'static str,
    plan: Vec<ColumnPlan>,
    timestamps: Vec<i64>,
    values: Vec<ColumnValues>,
}

impl TableBuilder {
    fn new(parser: &'static str, plan: Vec<ColumnPlan>) -> Self {
        let values = plan
            .iter()
            .map(|column| match column.role {
                ColumnRole::Timestamp => ColumnValues::Timestamp,
                ColumnRole::Numeric { .. } => ColumnValues::Numeric(Vec::new()),
                ColumnRole::Text => ColumnValues::Text(Vec::new()),
            })
            .collect();
        Self {
            parser,
            plan,
            timestamps: Vec::new(),
            values,
        }
    }

    fn push_row(&mut self, timestamp: i64, cells: Vec<Cell>) {
        self.timestamps.push(timestamp);
        for (values, cell) in self.values.iter_mut().zip(cells) {
            match (values, cell) {
                (ColumnValues::Numeric(column), Cell::Number(value)) => column.push(value),
                (ColumnValues::Text(column), Cell::Text(value)) => column.push(value),
                _ => {}
            }
        }
    }

    /// Materialises the buffered rows in ascending timestamp order. The sort is stable, so
    /// rows sharing a timestamp keep their file order.
    fn build(self) -> Result<DataFrame, ParserError> {
        let parser = self.parser;
        let mut order: Vec<usize> = (0..self.timestamps.len()).collect();
        order.sort_by_key(|&idx| self.timestamps[idx]);

        let mut columns: Vec<Column> = Vec::with_capacity(self.plan.len());
        for (plan, values) in self.plan.iter().zip(&self.values) {
            let name: PlSmallStr = plan.name.as_str().into();
            let series = match values {
                ColumnValues::Timestamp => {
                    let sorted: Vec<i64> = order.iter().map(|&idx| self.timestamps[idx]).collect();
                    Series::new(name, sorted)
                        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
                        .map_err(|err| ParserError::Validation {
                            parser,
                            message: format!("failed to cast timestamp column: {err}"),
                        })?
                }
                ColumnValues::Numeric(data) => {
                    let sorted: Vec<Option<f64>> = order.iter().map(|&idx| data[idx]).collect();
                    Series::new(name, sorted)
                }
                ColumnValues::Text(data) => {
                    let sorted: Vec<Option<&str>> =
                        order.iter().map(|&idx| data[idx].as_deref()).collect();
                    Series::new(name, sorted)
                }
            };
            columns.push(series.into());
        }

        DataFrame::new(columns).map_err(|err| ParserError::Validation {
            parser,
            message: format!("failed to build dataframe: {err}"),
        })
    }
}

/// Reads one delimited instrument log into a timestamp-sorted frame.
///
/// Rows with an unparseable timestamp, or with a missing value in any `row_required`
/// field, are dropped and counted in the returned report. A header lacking the timestamp
/// column or any `header_required` field is a `SchemaMismatch`.
pub(crate) fn read_table(
    spec: &TableSpec<'_>,
    content: &str,
) -> Result<(DataFrame, ParseReport), ParserError> {
    let parser = spec.parser;
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let body = skip_lines(content, spec.metadata_lines);

    let mut reader = reader_builder(spec.delimiter).from_reader(body.as_bytes());
    let mut records = reader.records();

    let header = records
        .next()
        .ok_or(ParserError::MissingHeader {
            parser,
            line_index: spec.metadata_lines,
        })?
        .map_err(|err| ParserError::Csv {
            parser,
            source: err,
        })?;
    let header = normalize_header(&header);

    for _ in 0..spec.units_lines {
        if let Some(units) = records.next() {
            units.map_err(|err| ParserError::Csv {
                parser,
                source: err,
            })?;
        }
    }

    let (timestamp_index, plan) = plan_columns(spec, &header)?;
    let mut builder = TableBuilder::new(parser, plan.clone());
    let mut report = ParseReport::default();

    'rows: for record in records {
        report.rows_read += 1;
        let Ok(record) = record else {
            report.dropped_malformed += 1;
            continue;
        };

        let Some(timestamp) = record
            .get(timestamp_index)
            .and_then(|value| parse_timestamp(value, spec.timestamp_format))
        else {
            report.dropped_invalid_timestamp += 1;
            continue;
        };

        let mut cells = Vec::with_capacity(plan.len());
        for column in &plan {
            let raw = record.get(column.source);
            let cell = match column.role {
                ColumnRole::Timestamp => Cell::Timestamp,
                ColumnRole::Numeric { required } => {
                    let value = raw.and_then(coerce_f64);
                    if required && value.is_none() {
                        report.dropped_missing_numeric += 1;
                        continue 'rows;
                    }
                    Cell::Number(value)
                }
                ColumnRole::Text => Cell::Text(
                    raw.filter(|value| !value.trim().is_empty())
                        .map(str::to_string),
                ),
            };
            cells.push(cell);
        }

        builder.push_row(timestamp, cells);
        report.rows_kept += 1;
    }

    let df = builder.build()?;
    Ok((df, report))
}

fn plan_columns(
    spec: &TableSpec<'_>,
    header: &[String],
) -> Result<(usize, Vec<ColumnPlan>), ParserError> {
    let timestamp_index = header.iter().position(|name| name == spec.timestamp_column);

    let mut missing: Vec<String> = Vec::new();
    if timestamp_index.is_none() {
        missing.push(spec.timestamp_column.to_string());
    }
    for field in spec.header_required {
        if !header.contains(field) && !missing.contains(field) {
            missing.push(field.clone());
        }
    }

    let timestamp_index = match timestamp_index {
        Some(idx) if missing.is_empty() => idx,
        _ => {
            return Err(ParserError::SchemaMismatch {
                parser: spec.parser,
                missing,
            })
        }
    };

    let renames_timestamp = spec.timestamp_column != spec.timestamp_output;
    let mut plan = Vec::with_capacity(header.len() + 1);
    for (idx, name) in header.iter().enumerate() {
        if idx == timestamp_index {
            if !renames_timestamp {
                plan.push(ColumnPlan {
                    name: name.clone(),
                    source: idx,
                    role: ColumnRole::Timestamp,
                });
            }
            continue;
        }
        // The parsed timestamp takes over any raw column that already carries its name.
        if name == spec.timestamp_output {
            continue;
        }
        let role = if spec.numeric_fields.contains(name) {
            ColumnRole::Numeric {
                required: spec.row_required.contains(name),
            }
        } else {
            ColumnRole::Text
        };
        plan.push(ColumnPlan {
            name: name.clone(),
            source: idx,
            role,
        });
    }

    if renames_timestamp {
        plan.push(ColumnPlan {
            name: spec.timestamp_output.to_string(),
            source: timestamp_index,
            role: ColumnRole::Timestamp,
        });
    }

    Ok((timestamp_index, plan))
}

fn reader_builder(delimiter: u8) -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter);
    builder
}

/// Drops the first `count` physical lines, blank ones included.
pub(crate) fn skip_lines(content: &str, count: usize) -> &str {
    let mut rest = content;
    for _ in 0..count {
        rest = match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => "",
        };
    }
    rest
}

/// Trims header names, names blank cells `Unnamed: <index>`, and suffixes repeats with
/// `.1`, `.2`, ... so every column name is unique.
pub(crate) fn normalize_header(record: &csv::StringRecord) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    record
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let trimmed = raw.trim();
            let base = if trimmed.is_empty() {
                format!("Unnamed: {idx}")
            } else {
                trimmed.to_string()
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{base}.{count}")
            };
            *count += 1;
            name
        })
        .collect()
}

pub(crate) fn parse_timestamp(value: &str, format: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(value.trim(), format)
        .ok()
        .map(|dt| dt.and_utc().timestamp_micros())
}

/// Lenient float coercion: blanks, text and NaN all become missing.
pub(crate) fn coerce_f64(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|parsed| !parsed.is_nan())
}
