//! Container configuration
//!
//! Sources, lowest priority first:
//! 1. `ContainerConfig::default()`
//! 2. a TOML or JSON file (format chosen by extension)
//! 3. environment variables `<PREFIX>_LOG_LEVEL`, `<PREFIX>_EAGER_INSTANCES`
//!    and `<PREFIX>_PROPERTY_<NAME>`

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, env, fs, path::Path};

use crate::logger::Level;

pub const DEFAULT_ENV_PREFIX: &str = "CONTAINER";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// `none` keeps the no-op logger
    pub log_level: Level,
    /// Build every root single while loading
    pub create_eager_instances: bool,
    pub properties: HashMap<String, String>,
}

pub struct ConfigLoader {
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Set environment variable prefix (default: "CONTAINER")
    pub fn env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Defaults plus environment overrides
    pub fn load(&self) -> Result<ContainerConfig> {
        let mut config = ContainerConfig::default();
        self.apply_environment(&mut config, env::vars())?;
        Ok(config)
    }

    /// File contents plus environment overrides
    pub fn load_with_file<P: AsRef<Path>>(&self, path: P) -> Result<ContainerConfig> {
        let mut config = self.load_from_file(path)?;
        self.apply_environment(&mut config, env::vars())?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<ContainerConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => self.load_from_toml(&content),
            Some("json") => self.load_from_json(&content),
            _ => Err(anyhow!(
                "Unsupported configuration file format: {:?}",
                path.extension()
            )),
        }
    }

    pub fn load_from_toml(&self, content: &str) -> Result<ContainerConfig> {
        toml::from_str(content).context("Invalid TOML container config")
    }

    pub fn load_from_json(&self, content: &str) -> Result<ContainerConfig> {
        serde_json::from_str(content).context("Invalid JSON container config")
    }

    /// Apply `<PREFIX>_*` variables from `vars` on top of `config`
    pub fn apply_environment(
        &self,
        config: &mut ContainerConfig,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<()> {
        let log_level = format!("{}_LOG_LEVEL", self.env_prefix);
        let eager = format!("{}_EAGER_INSTANCES", self.env_prefix);
        let property = format!("{}_PROPERTY_", self.env_prefix);

        for (name, value) in vars {
            if name == log_level {
                config.log_level = value
                    .parse::<Level>()
                    .with_context(|| format!("Invalid {}", log_level))?;
            } else if name == eager {
                config.create_eager_instances = parse_bool(&value)
                    .ok_or_else(|| anyhow!("Invalid {}: '{}'", eager, value))?;
            } else if let Some(key) = name.strip_prefix(&property) {
                if !key.is_empty() {
                    config.properties.insert(key.to_lowercase(), value);
                }
            }
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
