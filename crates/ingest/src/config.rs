//! Report configuration

use retake_common::DiffOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration of one report-building session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Root directory of the report
    pub report_path: PathBuf,

    /// Write extracted error-details payloads next to the images
    pub save_error_details: bool,

    /// Defaults handed to the diff worker when an assertion carries none
    pub diff: DiffOptions,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from("retake-report"),
            save_error_details: false,
            diff: DiffOptions::default(),
        }
    }
}

impl ReportConfig {
    /// Load configuration from file
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory holding image artifacts
    pub fn images_path(&self) -> PathBuf {
        self.report_path.join(retake_common::paths::IMAGES_PATH)
    }

    /// Path of the results database inside the report
    pub fn db_path(&self) -> PathBuf {
        self.report_path.join("results.db")
    }
}
