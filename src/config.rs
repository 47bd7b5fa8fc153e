//! Configuration handling for the intake pipeline

use crate::store::GatewaySettings;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_QUERY_TIMEOUT_MS: &str = "FORM_INTAKE_QUERY_TIMEOUT_MS";
const ENV_CASCADE_DELETE: &str = "FORM_INTAKE_CASCADE_DELETE";
const ENV_EMBEDDING_DIMENSIONS: &str = "FORM_INTAKE_EMBEDDING_DIMENSIONS";

/// User configuration for the intake pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IntakeConfig {
    /// Upper bound for each store call, in milliseconds
    pub query_timeout_ms: Option<u64>,
    /// Delete answers and vectors together with their response
    pub cascade_delete: Option<bool>,
    /// Required embedding length
    pub embedding_dimensions: Option<usize>,
}

impl IntakeConfig {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("io", "form-intake", "form-intake")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load configuration from file, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Write the configuration where [`IntakeConfig::load`] looks for it
    pub fn save(&self) -> Result<()> {
        match Self::config_path() {
            Some(path) => self.save_to(&path),
            None => anyhow::bail!("no config directory for this platform"),
        }
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    fn apply_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = var(ENV_QUERY_TIMEOUT_MS) {
            let ms = value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{ENV_QUERY_TIMEOUT_MS}={value}"))?;
            self.query_timeout_ms = Some(ms);
        }
        if let Some(value) = var(ENV_CASCADE_DELETE) {
            let cascade = value
                .trim()
                .parse::<bool>()
                .with_context(|| format!("{ENV_CASCADE_DELETE}={value}"))?;
            self.cascade_delete = Some(cascade);
        }
        if let Some(value) = var(ENV_EMBEDDING_DIMENSIONS) {
            let dims = value
                .trim()
                .parse::<usize>()
                .with_context(|| format!("{ENV_EMBEDDING_DIMENSIONS}={value}"))?;
            self.embedding_dimensions = Some(dims);
        }
        Ok(())
    }

    /// Effective store settings, defaults filled in
    pub fn gateway_settings(&self) -> GatewaySettings {
        let defaults = GatewaySettings::default();
        GatewaySettings {
            query_timeout: self
                .query_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.query_timeout),
            cascade_delete: self.cascade_delete.unwrap_or(defaults.cascade_delete),
            embedding_dimensions: self.embedding_dimensions.or(defaults.embedding_dimensions),
        }
    }
}
