// src/config_mod.rs
// Store options - strictness, devtools, diagnostics and logger settings

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::plugins::logger::LoggerOptions;

/// Environment prefix for overrides, e.g. `NODUS_STORE_STRICT=true`.
pub const ENV_PREFIX: &str = "NODUS_STORE";

/// Default number of diagnostics retained by the journal.
pub const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 256;

/// Store construction options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Flag state writes made outside a commit.
    pub strict: bool,
    /// Attach the devtool hook given to the builder.
    pub devtools: bool,
    /// Development-mode diagnostics. Defaults to on in debug builds.
    pub dev_diagnostics: bool,
    pub diagnostics_capacity: usize,
    /// Enables the logger plugin when present.
    pub logger: Option<LoggerOptions>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            strict: false,
            devtools: false,
            dev_diagnostics: cfg!(debug_assertions),
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
            logger: None,
        }
    }
}

/// Option loading errors
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("Failed to load store options: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Failed to parse store options: {0}")]
    Parse(#[from] toml::de::Error),
}

impl StoreOptions {
    /// Development preset: strict mode and diagnostics on.
    pub fn development() -> Self {
        Self {
            strict: true,
            dev_diagnostics: true,
            ..Self::default()
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self, OptionsError> {
        Ok(toml::from_str(source)?)
    }

    /// Load options from a file, layered with `NODUS_STORE_*` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let path = path.as_ref();
        let options = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize::<StoreOptions>()?;
        tracing::debug!(path = %path.display(), ?options, "loaded store options");
        Ok(options)
    }
}
