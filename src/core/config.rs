use crate::core::catalog::{Instrument, InstrumentCatalog};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SheetConfig {
    pub base_url: String,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    #[serde(default = "default_query_cell")]
    pub query_cell: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_sheet_name() -> String {
    "quotes".to_string()
}

fn default_query_cell() -> String {
    "A1".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_timeout_secs() -> u64 {
    5
}

impl Default for SheetConfig {
    fn default() -> Self {
        SheetConfig {
            base_url: "http://localhost:8099".to_string(),
            sheet_name: default_sheet_name(),
            query_cell: default_query_cell(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_notional() -> i64 {
    33333
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Tracked instruments; the built-in index set applies when omitted.
    pub instruments: Option<Vec<Instrument>>,
    #[serde(default)]
    pub sheet: SheetConfig,
    /// Currency amount split across the portfolio each allocation run.
    #[serde(default = "default_notional")]
    pub notional: i64,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            instruments: None,
            sheet: SheetConfig::default(),
            notional: default_notional(),
            data_path: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "rebal", "rebal")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "rebal", "rebal")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn catalog(&self) -> InstrumentCatalog {
        match &self.instruments {
            Some(list) => InstrumentCatalog::new(list.clone()),
            None => InstrumentCatalog::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_deserializes_with_defaults() {
        let yaml_str = r#"
sheet:
  base_url: "http://example.com/sheets"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.sheet.base_url, "http://example.com/sheets");
        assert_eq!(config.sheet.sheet_name, "quotes");
        assert_eq!(config.sheet.query_cell, "A1");
        assert_eq!(config.sheet.poll_interval_ms, 100);
        assert_eq!(config.sheet.timeout_secs, 5);
        assert_eq!(config.notional, 33333);
        assert_eq!(config.catalog().len(), 6);
    }

    #[test]
    fn config_accepts_custom_instruments() {
        let yaml_str = r#"
instruments:
  - key: "sp500"
    remote_search_term: "SPY"
    display_keyword: "S&P 500"
  - key: "gold"
    remote_search_term: "GLD"
    display_keyword: "Gold"
sheet:
  base_url: "http://example.com"
notional: 50000
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        let catalog = config.catalog();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("gold").unwrap().display_keyword, "Gold");
        assert_eq!(config.notional, 50000);
    }
}
