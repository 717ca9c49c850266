use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Runtime configuration for an anonymisation run.
///
/// All knobs are explicit; there are no ambient globals. Missing keys in a
/// JSON config file fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrubConfig {
    /// Location of the pattern catalogue (`.csv` or `.xlsx`).
    pub patterns_path: PathBuf,
    /// Mark every replacement with a yellow highlight. Default: true.
    pub highlight_replacements: bool,
    /// NLP detector endpoint URL; `None` disables NLP detection.
    pub nlp_endpoint: Option<String>,
    /// Per-block NLP call timeout in milliseconds. Default: 30 000.
    pub nlp_timeout_ms: u64,
    /// Upper bound on concurrent NLP calls. Default: 4.
    pub nlp_concurrency: usize,
    /// Write `report.xlsx`. Default: true.
    pub generate_excel_report: bool,
    /// Write `ledger.json`. Default: true.
    pub generate_json_ledger: bool,
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            patterns_path: PathBuf::from("patterns.csv"),
            highlight_replacements: true,
            nlp_endpoint: None,
            nlp_timeout_ms: 30_000,
            nlp_concurrency: 4,
            generate_excel_report: true,
            generate_json_ledger: true,
        }
    }
}

impl ScrubConfig {
    /// Load a configuration from a JSON file; absent keys keep defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
