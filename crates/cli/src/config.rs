//! Configuration management for the CLI

use crate::output::OutputFormat;
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Agent URL
    pub agent_url: Option<String>,
    /// Default output format
    pub default_format: Option<String>,
}

impl Config {
    /// Load configuration from `~/.config/aqmon/config.json`, if present
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Configured output format, ignoring unknown names
    pub fn default_format(&self) -> Option<OutputFormat> {
        self.default_format
            .as_deref()
            .and_then(|name| OutputFormat::from_str(name, true).ok())
    }

    /// Pick the output format: the flag wins, then the config file
    ///
    /// The config is only read when no flag was given, and an unreadable
    /// file falls back to the default format.
    pub fn output_format(
        flag: Option<OutputFormat>,
        load: impl FnOnce() -> Result<Self>,
    ) -> OutputFormat {
        flag.or_else(|| load().ok().and_then(|config| config.default_format()))
            .unwrap_or_default()
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("aqmon").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_from(Path::new("/nonexistent/aqmon.json")).unwrap();
        assert!(config.agent_url.is_none());
        assert!(config.default_format().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"agent_url": "http://monitor:9100", "default_format": "json"}}"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.agent_url.as_deref(), Some("http://monitor:9100"));
        assert!(matches!(config.default_format(), Some(OutputFormat::Json)));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_output_format_ignores_broken_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{broken").unwrap();

        let format = Config::output_format(None, || Config::load_from(file.path()));
        assert!(matches!(format, OutputFormat::Table));

        let format = Config::output_format(Some(OutputFormat::Json), || {
            panic!("config read despite explicit flag")
        });
        assert!(matches!(format, OutputFormat::Json));

        let format = Config::output_format(None, || {
            Ok(Config {
                agent_url: None,
                default_format: Some("json".to_string()),
            })
        });
        assert!(matches!(format, OutputFormat::Json));
    }
}
