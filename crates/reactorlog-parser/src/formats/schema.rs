use serde::{Deserialize, Serialize};

use crate::errors::ParserError;

pub const DEFAULT_TIMESTAMP_COLUMN: &str = "Date";

pub const LV_TEMPERATURE: &str = "T Heater 1";
pub const LV_PRESSURE_SETPOINT: &str = "Pressure setpoint";
pub const LV_H2_FLOW: &str = "H2 Actual Flow";
pub const LV_N2_FLOW: &str = "N2 Actual Flow";
pub const LV_N2_POISONING_SETPOINT: &str = "N2 poisoning set-point";
pub const LV_RELATIVE_TIME: &str = "RelativeTime";
pub const GC_NH3: &str = "NH3";

/// Layout and field declarations of the reactor controller ("LV") log.
///
/// Every declared numeric field is also required for a row to survive parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LvSchema {
    pub delimiter: char,
    pub metadata_lines: usize,
    pub units_lines: usize,
    pub timestamp_column: String,
    pub timestamp_format: String,
    pub timestamp_output: String,
    pub relative_time_field: String,
    pub numeric_fields: Vec<String>,
}

impl Default for LvSchema {
    fn default() -> Self {
        Self {
            delimiter: '\t',
            metadata_lines: 2,
            units_lines: 1,
            timestamp_column: "DateTime".to_string(),
            timestamp_format: "%d/%m/%y %H:%M:%S".to_string(),
            timestamp_output: DEFAULT_TIMESTAMP_COLUMN.to_string(),
            relative_time_field: LV_RELATIVE_TIME.to_string(),
            numeric_fields: [
                LV_RELATIVE_TIME,
                LV_H2_FLOW,
                LV_N2_FLOW,
                LV_TEMPERATURE,
                LV_PRESSURE_SETPOINT,
                LV_N2_POISONING_SETPOINT,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl LvSchema {
    pub fn required_fields(&self) -> &[String] {
        &self.numeric_fields
    }

    pub(crate) fn validate(&self, parser: &'static str) -> Result<u8, ParserError> {
        if !self.numeric_fields.contains(&self.relative_time_field) {
            return Err(ParserError::InvalidSchema {
                parser,
                message: format!(
                    "relative time field '{}' is not declared numeric",
                    self.relative_time_field
                ),
            });
        }
        validate_common(
            parser,
            self.delimiter,
            &self.timestamp_output,
            &self.numeric_fields,
        )
    }
}

/// Layout and field declarations of the gas chromatograph ("GC") log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcSchema {
    pub delimiter: char,
    pub timestamp_column: String,
    pub timestamp_format: String,
    pub timestamp_output: String,
    pub numeric_fields: Vec<String>,
    /// Fields that must appear in the header. Rows are never dropped for missing values.
    pub required_fields: Vec<String>,
}

impl Default for GcSchema {
    fn default() -> Self {
        Self {
            delimiter: '\t',
            timestamp_column: DEFAULT_TIMESTAMP_COLUMN.to_string(),
            timestamp_format: "%d.%m.%Y %H:%M:%S".to_string(),
            timestamp_output: DEFAULT_TIMESTAMP_COLUMN.to_string(),
            numeric_fields: [
                "Area",
                "H2",
                "Area           _2",
                "N2",
                "Area           _4",
                GC_NH3,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            required_fields: vec![GC_NH3.to_string()],
        }
    }
}

impl GcSchema {
    pub(crate) fn validate(&self, parser: &'static str) -> Result<u8, ParserError> {
        if let Some(field) = self
            .required_fields
            .iter()
            .find(|field| !self.numeric_fields.contains(field))
        {
            return Err(ParserError::InvalidSchema {
                parser,
                message: format!("required field '{field}' is not declared numeric"),
            });
        }
        validate_common(
            parser,
            self.delimiter,
            &self.timestamp_output,
            &self.numeric_fields,
        )
    }
}

fn validate_common(
    parser: &'static str,
    delimiter: char,
    timestamp_output: &str,
    numeric_fields: &[String],
) -> Result<u8, ParserError> {
    if numeric_fields.iter().any(|field| field == timestamp_output) {
        return Err(ParserError::InvalidSchema {
            parser,
            message: format!("timestamp output '{timestamp_output}' clashes with a numeric field"),
        });
    }
    if !delimiter.is_ascii() {
        return Err(ParserError::InvalidSchema {
            parser,
            message: format!("delimiter {delimiter:?} is not a single ASCII byte"),
        });
    }
    Ok(delimiter as u8)
}
