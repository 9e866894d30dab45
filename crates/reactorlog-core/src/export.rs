use std::io::Write;

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use serde_json::{Map, Number, Value};

use crate::error::Result;

pub const CSV_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const JSON_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub type Record = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Missing,
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Cell {
    fn to_csv(&self) -> String {
        match self {
            Cell::Missing => String::new(),
            Cell::Float(value) => format!("{value:?}"),
            Cell::Int(value) => value.to_string(),
            Cell::Bool(value) => if *value { "True" } else { "False" }.to_string(),
            Cell::Text(value) => value.clone(),
            Cell::Timestamp(value) => value.format(CSV_TIMESTAMP_FORMAT).to_string(),
        }
    }

    fn into_json(self) -> Value {
        match self {
            Cell::Missing => Value::Null,
            Cell::Float(value) => Number::from_f64(value).map_or(Value::Null, Value::Number),
            Cell::Int(value) => Value::from(value),
            Cell::Bool(value) => Value::Bool(value),
            Cell::Text(value) => Value::String(value),
            Cell::Timestamp(value) => Value::String(value.format(JSON_TIMESTAMP_FORMAT).to_string()),
        }
    }
}

fn column_cells(column: &Column) -> Result<Vec<Cell>> {
    let cells = match column.dtype() {
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            column
                .cast(&DataType::Int64)?
                .i64()?
                .into_iter()
                .map(|value| {
                    value
                        .and_then(|raw| datetime_from_raw(raw, unit))
                        .map_or(Cell::Missing, Cell::Timestamp)
                })
                .collect()
        }
        DataType::Float32 | DataType::Float64 => column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|value| value.filter(|v| !v.is_nan()).map_or(Cell::Missing, Cell::Float))
            .collect(),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => column
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|value| value.map_or(Cell::Missing, Cell::Int))
            .collect(),
        DataType::Boolean => column
            .bool()?
            .into_iter()
            .map(|value| value.map_or(Cell::Missing, Cell::Bool))
            .collect(),
        _ => column
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|value| value.map_or(Cell::Missing, |v| Cell::Text(v.to_string())))
            .collect(),
    };
    Ok(cells)
}

fn datetime_from_raw(raw: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let dt = match unit {
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(raw)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(raw),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(raw),
    };
    dt.map(|dt| dt.naive_utc())
}

fn frame_cells(df: &DataFrame) -> Result<Vec<Vec<Cell>>> {
    df.get_columns().iter().map(column_cells).collect()
}

/// Writes `df` as CSV: a header of column names, then one line per row.
pub fn write_csv<W: Write>(df: &DataFrame, writer: W) -> Result<()> {
    let columns = frame_cells(df)?;
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(df.get_column_names_str())?;
    for row in 0..df.height() {
        csv_writer.write_record(columns.iter().map(|cells| cells[row].to_csv()))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn to_csv_string(df: &DataFrame) -> Result<String> {
    let mut buffer = Vec::new();
    write_csv(df, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Row-oriented JSON objects keyed by column name.
pub fn to_json_records(df: &DataFrame) -> Result<Vec<Record>> {
    let names: Vec<String> = df
        .get_column_names_str()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut columns: Vec<std::vec::IntoIter<Cell>> =
        frame_cells(df)?.into_iter().map(Vec::into_iter).collect();

    let mut records = Vec::with_capacity(df.height());
    for _ in 0..df.height() {
        let mut record = Record::new();
        for (name, cells) in names.iter().zip(columns.iter_mut()) {
            let value = cells.next().map_or(Value::Null, Cell::into_json);
            record.insert(name.clone(), value);
        }
        records.push(record);
    }
    Ok(records)
}

pub fn write_json_records<W: Write>(df: &DataFrame, writer: W) -> Result<()> {
    let records = to_json_records(df)?;
    serde_json::to_writer_pretty(writer, &records)?;
    Ok(())
}

pub fn read_json_records(content: &str) -> Result<Vec<Record>> {
    Ok(serde_json::from_str(content)?)
}

/// Numeric view of a record field. Numeric strings are accepted; anything else is missing.
pub fn record_f64(record: &Record, key: &str) -> Option<f64> {
    match record.get(key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|v| !v.is_nan()),
        _ => None,
    }
}

/// Writes records as CSV with the union of their keys as header, in first-seen order.
pub fn write_records_csv<W: Write>(records: &[Record], writer: W) -> Result<()> {
    let mut header: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !header.contains(&key.as_str()) {
                header.push(key);
            }
        }
    }

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(&header)?;
    for record in records {
        csv_writer.write_record(header.iter().map(|key| match record.get(*key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        }))?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        let date = Series::new(
            "Date".into(),
            vec![1_746_180_000_000_000i64, 1_746_180_300_000_000],
        )
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
        .expect("datetime");
        let temp = Series::new("T Heater 1".into(), vec![Some(350.1), None]);
        let stage = Series::new("Stage".into(), vec![1u32, 1]);
        let label = Series::new("Sample".into(), vec![Some("a,b"), None]);
        DataFrame::new(vec![date.into(), temp.into(), stage.into(), label.into()]).expect("df")
    }

    #[test]
    fn csv_renders_timestamps_and_blanks() {
        let csv = to_csv_string(&sample()).expect("csv");
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Date,T Heater 1,Stage,Sample");
        assert_eq!(lines[1], "2025-05-02 10:00:00,350.1,1,\"a,b\"");
        assert_eq!(lines[2], "2025-05-02 10:05:00,,1,");
    }

    #[test]
    fn json_records_use_iso_timestamps_and_null() {
        let records = to_json_records(&sample()).expect("records");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Date"], "2025-05-02T10:00:00");
        assert_eq!(records[0]["T Heater 1"], 350.1);
        assert_eq!(records[0]["Stage"], 1);
        assert_eq!(records[1]["T Heater 1"], Value::Null);
        assert_eq!(records[1]["Sample"], Value::Null);
    }

    #[test]
    fn record_values_coerce_to_f64() {
        let records: Vec<Record> =
            read_json_records(r#"[{"a": 1.5, "b": "2", "c": "x", "d": null}]"#).expect("json");
        assert_eq!(record_f64(&records[0], "a"), Some(1.5));
        assert_eq!(record_f64(&records[0], "b"), Some(2.0));
        assert_eq!(record_f64(&records[0], "c"), None);
        assert_eq!(record_f64(&records[0], "d"), None);
        assert_eq!(record_f64(&records[0], "missing"), None);
    }

    #[test]
    fn records_csv_uses_the_union_of_keys() {
        let records =
            read_json_records(r#"[{"Date": "2025-05-02T10:00:00", "a": 1.0}, {"b": "x", "a": null}]"#)
                .expect("json");
        let mut buffer = Vec::new();
        write_records_csv(&records, &mut buffer).expect("csv");
        let csv = String::from_utf8(buffer).expect("utf8");
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec!["Date,a,b", "2025-05-02T10:00:00,1.0,", ",,x"]);
    }
}
