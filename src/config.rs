//! Runtime configuration
//!
//! Loaded from an optional TOML file; every key has a default so running
//! without a file works out of the box. CLI flags override file values.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

const CONFIG_ENV_VAR: &str = "FUNDAMENTALS_CONFIG";
const CONFIG_FILENAME: &str = "config.toml";

pub const DEFAULT_REGISTRY_URL: &str =
    "https://dados.cvm.gov.br/dados/CIA_ABERTA/CAD/DADOS/cad_cia_aberta.csv";
pub const DEFAULT_DFP_BASE_URL: &str = "https://dados.cvm.gov.br/dados/CIA_ABERTA/DOC/DFP/DADOS";
pub const DEFAULT_COTAHIST_BASE_URL: &str = "https://bvmf.bmfbovespa.com.br/InstDados/SerHist";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub quotes_dir: PathBuf,
    pub start_year: i32,
    pub end_year: i32,
    pub excluded_sectors: Vec<String>,
    pub sources: Sources,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Sources {
    pub registry_url: String,
    pub dfp_base_url: String,
    pub cotahist_base_url: String,
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            quotes_dir: PathBuf::from("data/quotes"),
            start_year: 2016,
            end_year: 2025,
            excluded_sectors: vec![
                "Bancos".to_string(),
                "Intermediação Financeira".to_string(),
                "Seguradoras e Corretoras".to_string(),
            ],
            sources: Sources::default(),
        }
    }
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            dfp_base_url: DEFAULT_DFP_BASE_URL.to_string(),
            cotahist_base_url: DEFAULT_COTAHIST_BASE_URL.to_string(),
            http_timeout_secs: 300,
        }
    }
}

impl Config {
    /// Resolve and load the configuration.
    ///
    /// Lookup order: explicit path, `$FUNDAMENTALS_CONFIG`, then
    /// `<config_home>/fundamentals/config.toml`. An explicit path that does
    /// not exist is an error; a missing default file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from) {
            return Self::from_file(&path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| anyhow!("{}", e))?;
        config.validate_years()?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the loaded values
    pub fn with_overrides(
        mut self,
        start_year: Option<i32>,
        end_year: Option<i32>,
        raw_dir: Option<PathBuf>,
        processed_dir: Option<PathBuf>,
    ) -> Result<Self> {
        if let Some(start) = start_year {
            self.start_year = start;
        }
        if let Some(end) = end_year {
            self.end_year = end;
        }
        if let Some(dir) = raw_dir {
            self.raw_dir = dir;
        }
        if let Some(dir) = processed_dir {
            self.processed_dir = dir;
        }
        self.validate_years()?;
        Ok(self)
    }

    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.start_year..=self.end_year
    }

    fn validate_years(&self) -> Result<(), PipelineError> {
        if self.start_year > self.end_year {
            return Err(PipelineError::InvalidYearRange {
                start: self.start_year,
                end: self.end_year,
            });
        }
        Ok(())
    }
}

fn default_config_path() -> Option<PathBuf> {
    dir_spec::config_home().map(|dir| dir.join("fundamentals").join(CONFIG_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.excluded_sectors.len(), 3);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            raw_dir = "/tmp/raw"
            start_year = 2019

            [sources]
            http_timeout_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.raw_dir, PathBuf::from("/tmp/raw"));
        assert_eq!(config.start_year, 2019);
        assert_eq!(config.end_year, 2025);
        assert_eq!(config.sources.http_timeout_secs, 30);
        assert_eq!(config.sources.registry_url, DEFAULT_REGISTRY_URL);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("raw_directory = \"x\"").is_err());
    }

    #[test]
    fn inverted_year_range_is_rejected() {
        let err = Config::default()
            .with_overrides(Some(2024), Some(2020), None, None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidYearRange { .. })
        ));
    }
}
