//! Policy constants and service settings.
//!
//! Resolution order, highest first: command-line flags, the TOML file named
//! by `--config` / `SAFEROUTE_CONFIG`, compiled defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::model::{MAX_SCORE, MIN_SCORE};

/// Tunable scoring policy. Defaults are the reference policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Landmarks and reports strictly closer than this influence a point.
    pub proximity_radius_km: f64,
    /// Subtracted once per (route point, nearby report) pair.
    pub report_penalty: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            proximity_radius_km: 0.25,
            report_penalty: 3.0,
        }
    }
}

/// Score thresholds used to bucket routes for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationPolicy {
    pub safe_threshold: f64,
    pub caution_threshold: f64,
}

impl Default for PresentationPolicy {
    fn default() -> Self {
        Self {
            safe_threshold: 3.5,
            caution_threshold: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Report feed polling interval.
    pub refresh_interval_secs: u64,
    /// Load the bundled reference landmarks into the in-memory store.
    pub seed_landmarks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3001".to_string(),
            refresh_interval_secs: 30,
            seed_landmarks: true,
        }
    }
}

impl ServerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub presentation: PresentationPolicy,
    pub server: ServerConfig,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Builds the effective configuration for the server binary.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => {
                info!("Loading config from {}", path.display());
                Self::from_file(path)?
            }
            None => Self::default(),
        };

        if let Some(bind) = &cli.bind {
            config.server.bind = bind.clone();
        }
        if let Some(secs) = cli.refresh_secs {
            config.server.refresh_interval_secs = secs;
        }
        if cli.no_seed {
            config.server.seed_landmarks = false;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let engine = &self.engine;
        if !engine.proximity_radius_km.is_finite() || engine.proximity_radius_km <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "engine.proximity_radius_km must be positive, got {}",
                engine.proximity_radius_km
            )));
        }
        if !engine.report_penalty.is_finite() || engine.report_penalty < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "engine.report_penalty must be non-negative, got {}",
                engine.report_penalty
            )));
        }

        let p = &self.presentation;
        let ordered = MIN_SCORE <= p.caution_threshold
            && p.caution_threshold <= p.safe_threshold
            && p.safe_threshold <= MAX_SCORE;
        if !ordered {
            return Err(ConfigError::Invalid(format!(
                "presentation thresholds out of order: caution {}, safe {} (range {}..={})",
                p.caution_threshold, p.safe_threshold, MIN_SCORE, MAX_SCORE
            )));
        }

        if self.server.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.refresh_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Route safety scoring service.
#[derive(Debug, Parser)]
#[command(name = "saferoute", version)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "SAFEROUTE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:3001.
    #[arg(long, env = "SAFEROUTE_BIND")]
    pub bind: Option<String>,

    /// Report feed refresh interval in seconds.
    #[arg(long)]
    pub refresh_secs: Option<u64>,

    /// Start with an empty landmark set.
    #[arg(long)]
    pub no_seed: bool,
}
