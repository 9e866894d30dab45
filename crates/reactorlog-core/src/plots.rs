use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::{AlignmentConfig, ChannelConfig};
use crate::error::Result;
use crate::export::{record_f64, Record, JSON_TIMESTAMP_FORMAT};

/// Plotly figure: `data` holds traces, `layout` the axes. Styling is left to the viewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub layout: Value,
}

impl Figure {
    pub fn with_layout(layout: Value) -> Self {
        Self {
            data: Vec::new(),
            layout,
        }
    }

    pub fn push(&mut self, trace: Trace) -> Result<()> {
        self.data.push(serde_json::to_value(trace)?);
        Ok(())
    }

    pub fn trace_names(&self) -> Vec<&str> {
        self.data
            .iter()
            .filter_map(|trace| trace.get("name").and_then(Value::as_str))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub x: Vec<Value>,
    pub y: Vec<Option<f64>>,
    pub name: String,
    pub mode: &'static str,
    pub yaxis: &'static str,
}

impl Trace {
    fn scatter(name: String, x: Vec<Value>, y: Vec<Option<f64>>, yaxis: &'static str) -> Self {
        Self {
            kind: "scatter",
            x,
            y,
            name,
            mode: "lines+markers",
            yaxis,
        }
    }
}

/// Picks `<field><suffix>` when the aligned table renamed the field, otherwise `field`.
pub fn resolve_column(names: &[&str], field: &str, suffix: &str) -> Option<String> {
    let suffixed = format!("{field}{suffix}");
    if names.contains(&suffixed.as_str()) {
        Some(suffixed)
    } else if names.contains(&field) {
        Some(field.to_string())
    } else {
        None
    }
}

struct FramePlot<'a> {
    df: &'a DataFrame,
    names: Vec<&'a str>,
    x: Vec<Value>,
}

impl<'a> FramePlot<'a> {
    fn new(df: &'a DataFrame, timestamp_column: &str) -> Result<Self> {
        let x = timestamp_axis(df, timestamp_column)?;
        Ok(Self {
            df,
            names: df.get_column_names_str(),
            x,
        })
    }

    /// A trace for `field` when its resolved column exists and is numeric.
    fn trace(
        &self,
        field: &str,
        suffix: &str,
        label: &str,
        yaxis: &'static str,
    ) -> Result<Option<Trace>> {
        let Some(column_name) = resolve_column(&self.names, field, suffix) else {
            return Ok(None);
        };
        let column = self.df.column(&column_name)?;
        if !column.dtype().is_primitive_numeric() {
            return Ok(None);
        }
        let y: Vec<Option<f64>> = column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .collect();
        Ok(Some(Trace::scatter(
            format!("{label} ({column_name})"),
            self.x.clone(),
            y,
            yaxis,
        )))
    }
}

fn timestamp_axis(df: &DataFrame, column: &str) -> Result<Vec<Value>> {
    let Ok(dates) = df.column(column) else {
        return Ok(Vec::new());
    };
    let micros = dates.cast(&DataType::Int64)?;
    let values = micros
        .i64()?
        .into_iter()
        .map(|value| {
            value
                .and_then(chrono::DateTime::from_timestamp_micros)
                .map(|dt| Value::String(dt.naive_utc().format(JSON_TIMESTAMP_FORMAT).to_string()))
                .unwrap_or(Value::Null)
        })
        .collect();
    Ok(values)
}

fn push_all(figure: &mut Figure, traces: Vec<Option<Trace>>) -> Result<()> {
    for trace in traces.into_iter().flatten() {
        figure.push(trace)?;
    }
    Ok(())
}

fn axis(title: &str) -> Value {
    json!({ "title": { "text": title }, "side": "left" })
}

fn overlay_axis(title: &str, side: &str, position: Option<f64>) -> Value {
    let mut axis = json!({
        "title": { "text": title },
        "overlaying": "y",
        "side": side,
    });
    if let (Some(position), Some(map)) = (position, axis.as_object_mut()) {
        map.insert("anchor".to_string(), json!("free"));
        map.insert("position".to_string(), json!(position));
    }
    axis
}

/// Whole-run figure against time: temperature, NH3, flows and pressure on four axes.
pub fn overall_plot(
    df: &DataFrame,
    timestamp_column: &str,
    channels: &ChannelConfig,
    suffixes: &AlignmentConfig,
) -> Result<Figure> {
    let lv = suffixes.left_suffix.as_str();
    let gc = suffixes.right_suffix.as_str();
    let plot = FramePlot::new(df, timestamp_column)?;

    let mut figure = Figure::with_layout(json!({
        "title": { "text": "Overall Merged Data Analysis" },
        "hovermode": "x unified",
        "xaxis": { "title": { "text": timestamp_column }, "domain": [0.1, 0.9] },
        "yaxis": axis(&format!("Temp ({}) (C)", channels.temperature)),
        "yaxis2": overlay_axis(&format!("NH3 ({}) (%)", channels.nh3), "right", None),
        "yaxis3": overlay_axis("Flow / SP (ml/min)", "right", Some(0.95)),
        "yaxis4": overlay_axis("Pressure (bar)", "left", Some(0.05)),
    }));
    push_all(
        &mut figure,
        vec![
            plot.trace(&channels.temperature, lv, "LV Temp", "y")?,
            plot.trace(&channels.nh3, gc, "GC NH3", "y2")?,
            plot.trace(&channels.h2_flow, lv, "LV H2 Flow", "y3")?,
            plot.trace(&channels.n2_flow, lv, "LV N2 Flow", "y3")?,
            plot.trace(&channels.n2_poisoning_setpoint, lv, "LV N2 Poison SP", "y3")?,
            plot.trace(&channels.pressure, lv, "LV Pressure", "y4")?,
        ],
    )?;
    Ok(figure)
}

/// One stage against time: temperature, pressure, flows and NH3 on four axes.
pub fn stage_plot(
    df: &DataFrame,
    timestamp_column: &str,
    stage: u32,
    channels: &ChannelConfig,
    suffixes: &AlignmentConfig,
) -> Result<Figure> {
    let lv = suffixes.left_suffix.as_str();
    let gc = suffixes.right_suffix.as_str();
    let plot = FramePlot::new(df, timestamp_column)?;

    let mut figure = Figure::with_layout(json!({
        "title": { "text": format!("Step {stage} Analysis") },
        "hovermode": "x unified",
        "xaxis": { "title": { "text": timestamp_column }, "domain": [0.1, 0.9] },
        "yaxis": axis(&format!("Temp ({}) (C)", channels.temperature)),
        "yaxis2": overlay_axis(&format!("Pressure ({}) (bar)", channels.pressure), "right", None),
        "yaxis3": overlay_axis("Flow / SP (ml/min)", "left", Some(0.05)),
        "yaxis4": overlay_axis(&format!("NH3 ({}) (%)", channels.nh3), "right", Some(0.95)),
    }));
    push_all(
        &mut figure,
        vec![
            plot.trace(&channels.temperature, lv, "LV Temp", "y")?,
            plot.trace(&channels.pressure, lv, "LV Pressure", "y2")?,
            plot.trace(&channels.h2_flow, lv, "LV H2 Flow", "y3")?,
            plot.trace(&channels.n2_flow, lv, "LV N2 Flow", "y3")?,
            plot.trace(&channels.n2_poisoning_setpoint, lv, "LV N2 Poison SP", "y3")?,
            plot.trace(&channels.nh3, gc, "GC NH3", "y4")?,
        ],
    )?;
    Ok(figure)
}

/// Stage data read back from its JSON records.
#[derive(Debug, Clone)]
pub struct StageRecords {
    pub stage: u32,
    pub records: Vec<Record>,
}

fn record_keys(records: &[Record]) -> Vec<&str> {
    let mut keys: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }
    }
    keys
}

/// Temperature and NH3 traces of one stage against relative time, or nothing when the
/// records carry no relative-time field.
fn relative_time_traces(
    stage: &StageRecords,
    relative_time: &str,
    channels: &ChannelConfig,
    suffixes: &AlignmentConfig,
    label: &dyn Fn(&str, &str) -> String,
) -> Vec<Trace> {
    let keys = record_keys(&stage.records);
    let Some(x_key) = resolve_column(&keys, relative_time, &suffixes.left_suffix) else {
        return Vec::new();
    };
    let x: Vec<Value> = stage
        .records
        .iter()
        .map(|record| record_f64(record, &x_key).map_or(Value::Null, Value::from))
        .collect();

    let mut traces = Vec::new();
    let series = [
        (&channels.temperature, &suffixes.left_suffix, "Temp", "y"),
        (&channels.nh3, &suffixes.right_suffix, "NH3", "y2"),
    ];
    for (field, suffix, short, yaxis) in series {
        if let Some(column) = resolve_column(&keys, field, suffix) {
            let y = stage
                .records
                .iter()
                .map(|record| record_f64(record, &column))
                .collect();
            traces.push(Trace::scatter(label(short, field), x.clone(), y, yaxis));
        }
    }
    traces
}

/// Compares selected stages against relative time: one temperature and one NH3 trace each.
pub fn stage_comparison_plot(
    stages: &[StageRecords],
    relative_time: &str,
    channels: &ChannelConfig,
    suffixes: &AlignmentConfig,
) -> Result<Figure> {
    let mut figure = Figure::with_layout(json!({
        "title": { "text": "Stage Comparison vs. Relative Time" },
        "hovermode": "x unified",
        "xaxis": { "title": { "text": relative_time } },
        "yaxis": axis(&format!("Temperature ({}) (C)", channels.temperature)),
        "yaxis2": overlay_axis(&format!("NH3 ({}) (%)", channels.nh3), "right", None),
    }));
    for stage in stages {
        let number = stage.stage;
        let label = |short: &str, field: &str| format!("Stage {number} - {short} ({field})");
        for trace in relative_time_traces(stage, relative_time, channels, suffixes, &label) {
            figure.push(trace)?;
        }
    }
    Ok(figure)
}

/// An existing comparison figure and the report it came from.
#[derive(Debug, Clone)]
pub struct SourcePlot {
    pub report: String,
    pub figure: Figure,
}

/// Stages of one report plotted next to existing comparison figures.
#[derive(Debug, Clone)]
pub struct CurrentStages {
    pub report: String,
    pub stages: Vec<StageRecords>,
}

/// Merges traces of existing comparison figures, renamed `<report> - <name>`, with
/// temperature and NH3 traces of the current report's selected stages.
pub fn cross_comparison_plot(
    sources: &[SourcePlot],
    current: Option<&CurrentStages>,
    relative_time: &str,
    channels: &ChannelConfig,
    suffixes: &AlignmentConfig,
) -> Result<Figure> {
    let mut figure = Figure::with_layout(json!({
        "title": { "text": "Cross-Report Stage Comparison vs. Relative Time" },
        "hovermode": "x unified",
        "xaxis": { "title": { "text": relative_time } },
        "yaxis": axis(&format!("Temperature ({}) (C)", channels.temperature)),
        "yaxis2": overlay_axis(&format!("NH3 ({}) (%)", channels.nh3), "right", None),
    }));

    for source in sources {
        for trace in &source.figure.data {
            let Value::Object(fields) = trace else {
                continue;
            };
            figure.data.push(Value::Object(relabel_trace(fields, &source.report)));
        }
    }

    if let Some(current) = current {
        let report = current.report.as_str();
        for stage in &current.stages {
            let number = stage.stage;
            let label =
                |short: &str, _field: &str| format!("Current ({report}) - Stage {number} - {short}");
            for trace in relative_time_traces(stage, relative_time, channels, suffixes, &label) {
                figure.push(trace)?;
            }
        }
    }

    Ok(figure)
}

fn relabel_trace(fields: &Map<String, Value>, report: &str) -> Map<String, Value> {
    let mut fields = fields.clone();
    let name = fields
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("Unnamed Trace")
        .to_string();
    fields.insert("name".to_string(), json!(format!("{report} - {name}")));

    let axis = match fields.get("yaxis").and_then(Value::as_str) {
        None | Some("y") => "y".to_string(),
        Some(other) => other.to_string(),
    };
    fields.insert("yaxis".to_string(), json!(axis));
    fields
}
