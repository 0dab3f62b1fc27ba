//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the configuration file, or fall back to defaults
//! - Layer command line / environment overrides on top
//! - Validate the merged result before anything binds
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Overrides are validated together with the file, so a bad
//!   `--bind` is reported like a bad `bind_address`

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::validation::{validate_config, ValidationError};
use crate::config::{load_config, ConfigError, DeploymentProfile, ProxyConfig};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid configuration: {}", join(.0))]
    Invalid(Vec<ValidationError>),

    #[error("classifier rules: {0}")]
    Rules(#[from] regex::Error),

    #[error("upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("config watcher: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Settings given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind_address: Option<String>,
    pub executable: Option<PathBuf>,
    pub profile: Option<DeploymentProfile>,
}

impl Overrides {
    pub fn apply(self, config: &mut ProxyConfig) {
        if let Some(bind) = self.bind_address {
            config.listener.bind_address = bind;
        }
        if let Some(executable) = self.executable {
            config.render.executable = Some(executable);
        }
        if let Some(profile) = self.profile {
            config.render.profile = profile;
        }
    }
}

/// Produce the validated configuration the server starts with.
pub fn resolve_config(path: Option<&Path>, overrides: Overrides) -> Result<ProxyConfig, StartupError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    overrides.apply(&mut config);
    validate_config(&config).map_err(StartupError::Invalid)?;
    Ok(config)
}
