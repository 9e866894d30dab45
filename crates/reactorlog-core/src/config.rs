use std::fs;
use std::path::Path;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use reactorlog_parser::formats::schema::{
    GC_NH3, LV_H2_FLOW, LV_N2_FLOW, LV_N2_POISONING_SETPOINT, LV_PRESSURE_SETPOINT, LV_TEMPERATURE,
};
use reactorlog_parser::{GcSchema, LvSchema};

use crate::error::{ReactorError, Result};

/// Everything one processing run needs: both log schemas, the alignment window and the
/// channel names the plots read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub lv: LvSchema,
    pub gc: GcSchema,
    pub alignment: AlignmentConfig,
    pub channels: ChannelConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    pub tolerance_seconds: u64,
    pub left_suffix: String,
    pub right_suffix: String,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            tolerance_seconds: 300,
            left_suffix: "_LV".to_string(),
            right_suffix: "_GC".to_string(),
        }
    }
}

impl AlignmentConfig {
    pub fn tolerance(&self) -> TimeDelta {
        i64::try_from(self.tolerance_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

/// Named fields the plot builders look up in aligned tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub temperature: String,
    pub pressure: String,
    pub h2_flow: String,
    pub n2_flow: String,
    pub n2_poisoning_setpoint: String,
    pub nh3: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            temperature: LV_TEMPERATURE.to_string(),
            pressure: LV_PRESSURE_SETPOINT.to_string(),
            h2_flow: LV_H2_FLOW.to_string(),
            n2_flow: LV_N2_FLOW.to_string(),
            n2_poisoning_setpoint: LV_N2_POISONING_SETPOINT.to_string(),
            nh3: GC_NH3.to_string(),
        }
    }
}

impl ProcessingConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ProcessingConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reads `path` when given, otherwise falls back to the built-in instrument defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let alignment = &self.alignment;
        if alignment.left_suffix.is_empty() || alignment.right_suffix.is_empty() {
            return Err(ReactorError::InvalidConfig(
                "alignment suffixes must not be empty".to_string(),
            ));
        }
        if alignment.left_suffix == alignment.right_suffix {
            return Err(ReactorError::InvalidConfig(format!(
                "left and right suffix are both '{}'",
                alignment.left_suffix
            )));
        }
        if self.lv.timestamp_output != self.gc.timestamp_output {
            return Err(ReactorError::InvalidConfig(format!(
                "LV timestamp column '{}' and GC timestamp column '{}' differ",
                self.lv.timestamp_output, self.gc.timestamp_output
            )));
        }
        Ok(())
    }
}
