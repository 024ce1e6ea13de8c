use crate::classify::DEFAULT_MODULE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Module tag of the lines to analyse
    #[serde(default = "default_module")]
    pub module: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            module: default_module(),
        }
    }
}

fn default_module() -> String {
    DEFAULT_MODULE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub format: ReportFormat,
    /// Printed in place of an event that was never logged
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    /// Print the ingestion counters to stderr after each report
    #[serde(default)]
    pub diagnostics: bool,
    #[serde(default)]
    pub window: WindowConfig,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: ReportFormat::default(),
            placeholder: default_placeholder(),
            diagnostics: false,
            window: WindowConfig::default(),
        }
    }
}

fn default_placeholder() -> String {
    "--".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Table,
    Json,
}

/// Offsets from the start of the log, e.g. `1s 500ms`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default, with = "humantime_serde")]
    pub from: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub to: Option<Duration>,
}
