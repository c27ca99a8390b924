//! Typed configuration.
//!
//! Four hrefs pick the engine's collaborators; the rest configures
//! telemetry. Every field has a default, so an empty environment yields the
//! in-memory engine. Values can come from a TOML file, the environment, or
//! both (environment wins).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::service::builtin;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Href of the work loader.
    pub work_loader: String,
    /// Href of the state store.
    pub state_manager: String,
    /// Href of the router.
    pub router: String,
    /// Href of the work logger.
    pub logger: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_loader: builtin::REGISTRY_WORK_LOADER.to_string(),
            state_manager: builtin::MEMORY_STATE_MANAGER.to_string(),
            router: builtin::MEMORY_ROUTER.to_string(),
            logger: builtin::CONSOLE_LOGGER.to_string(),
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Defaults overridden by environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("bad config: {e}")))
    }

    /// Read a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        override_var(&mut self.work_loader, "WORKHORSE_WORK_LOADER")?;
        override_var(&mut self.state_manager, "WORKHORSE_STATE_MANAGER")?;
        override_var(&mut self.router, "WORKHORSE_ROUTER")?;
        override_var(&mut self.logger, "WORKHORSE_LOGGER")?;
        override_var(&mut self.log_level, "LOG_LEVEL")?;
        if let Some(endpoint) = optional_var("OTEL_ENDPOINT")? {
            self.otel_endpoint = Some(endpoint);
        }
        Ok(())
    }
}

fn override_var(slot: &mut String, name: &str) -> Result<()> {
    if let Some(value) = optional_var(name)? {
        *slot = value;
    }
    Ok(())
}

/// Unset is fine; set-but-empty is a mistake worth failing on.
fn optional_var(name: &str) -> Result<Option<String>> {
    match std::env::var(name) {
        Ok(value) if value.trim().is_empty() => Err(Error::Config(format!(
            "environment variable {name} is set but empty"
        ))),
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(Error::Config(format!("environment variable {name}: {e}"))),
    }
}
