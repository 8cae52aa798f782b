//! Compiler configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via SMC_CONFIG or --config)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use smc_codegen::GeneratorOptions;
use smc_core::CheckOptions;
use std::path::{Path, PathBuf};

/// Compiler configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Checker configuration.
    pub check: CheckConfig,
    /// Code generator configuration.
    pub codegen: GeneratorOptions,
}

impl Config {
    /// Loads configuration from `path` if given, then applies environment
    /// variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        tracing::debug!(?config, "loaded configuration");
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies overrides from a variable lookup (the process environment in
    /// production).
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.check.apply_overrides(&var);

        if let Some(width) = var("SMC_INDENT_WIDTH") {
            if let Ok(parsed) = width.parse() {
                self.codegen.indent_width = parsed;
            }
        }
        if let Some(suffix) = var("SMC_STATE_SUFFIX") {
            self.codegen.state_suffix = suffix;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=16).contains(&self.codegen.indent_width) {
            return Err(ConfigError::ValidationError(format!(
                "codegen.indent_width must be between 1 and 16, got {}",
                self.codegen.indent_width
            )));
        }
        if !self
            .codegen
            .state_suffix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::ValidationError(format!(
                "codegen.state_suffix '{}' is not a valid identifier suffix",
                self.codegen.state_suffix
            )));
        }
        Ok(())
    }
}

/// Checker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Treat warnings as errors when computing the exit status.
    pub warnings_as_errors: bool,
    /// Report states unreachable from the initial state.
    pub unreachable_states: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            warnings_as_errors: false,
            unreachable_states: true,
        }
    }
}

impl CheckConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(value) = var("SMC_WARNINGS_AS_ERRORS") {
            self.warnings_as_errors = is_truthy(&value);
        }
        if let Some(value) = var("SMC_CHECK_UNREACHABLE") {
            self.unreachable_states = is_truthy(&value);
        }
    }

    pub fn options(&self) -> CheckOptions {
        CheckOptions {
            unreachable_states: self.unreachable_states,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
