//! Loading service configuration (adaptation thresholds + session limits) from TOML.
//!
//! See `ServiceConfig` for the expected schema. Every field is optional.

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use crate::adapter::Thresholds;

#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
pub struct ServiceConfig {
  #[serde(default)]
  pub thresholds: Thresholds,
  #[serde(default)]
  pub sessions: SessionLimits,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionLimits {
  /// Upper bound on exercise ids accepted when a session is created.
  pub max_exercises: usize,
}

impl Default for SessionLimits {
  fn default() -> Self {
    Self { max_exercises: 20 }
  }
}

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("failed to parse TOML: {0}")]
  Parse(#[from] toml::de::Error),

  #[error("invalid config: {0}")]
  Invalid(String),
}

impl ServiceConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    self.thresholds.validate()?;
    if self.sessions.max_exercises == 0 {
      return Err(ConfigError::Invalid("sessions.max_exercises must be at least 1".into()));
    }
    Ok(())
  }
}

/// Parse and validate. A config that parses but fails validation is an error too.
pub fn parse_config(s: &str) -> Result<ServiceConfig, ConfigError> {
  let cfg = toml::from_str::<ServiceConfig>(s)?;
  cfg.validate()?;
  Ok(cfg)
}

/// Attempt to load `ServiceConfig` from ADAPTER_CONFIG_PATH. On any IO/parse/validation
/// error, logs it and returns None so the caller falls back to defaults.
pub fn load_config_from_env() -> Option<ServiceConfig> {
  let path = std::env::var("ADAPTER_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_config(&s) {
      Ok(cfg) => {
        info!(target: "nivel_backend", %path, "Loaded service config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "nivel_backend", %path, error = %e, "Rejected TOML config, using defaults");
        None
      }
    },
    Err(e) => {
      error!(target: "nivel_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
