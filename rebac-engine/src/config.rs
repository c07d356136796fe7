//! Engine configuration.
//!
//! Values are layered: built-in defaults, then an optional file (format picked
//! from its extension), then `REBAC__`-prefixed environment variables using
//! `__` as the nesting separator, e.g. `REBAC__MAX_DEPTH=40` or
//! `REBAC__HIDDEN_SUBJECTS=user:admin,user:grafana-sa`.

use crate::error::AuthzError;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum recursion depth for a single check or expansion
    pub max_depth: u32,
    /// Deadline for a single check in milliseconds, 0 disables it
    pub check_timeout_ms: u64,
    /// Subjects (`type:id`) removed from ACL listings
    pub hidden_subjects: Vec<String>,
    /// Upper bound on the number of subjects an expansion may return
    pub expand_max_subjects: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 25,
            check_timeout_ms: 5_000,
            hidden_subjects: Vec::new(),
            expand_max_subjects: 10_000,
        }
    }
}

impl EngineConfig {
    /// Load from the environment only
    pub fn from_env() -> Result<Self, AuthzError> {
        Self::build(None)
    }

    /// Load from a file, with environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AuthzError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AuthzError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Self::build(Some(path))
    }

    fn build(path: Option<&Path>) -> Result<Self, AuthzError> {
        let defaults = Config::try_from(&EngineConfig::default()).map_err(config_error)?;
        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let engine_config: EngineConfig = builder
            .add_source(
                Environment::with_prefix("REBAC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("hidden_subjects"),
            )
            .build()
            .and_then(Config::try_deserialize)
            .map_err(config_error)?;

        engine_config.validate()?;
        Ok(engine_config)
    }

    pub fn validate(&self) -> Result<(), AuthzError> {
        if self.max_depth == 0 {
            return Err(AuthzError::Config(
                "max_depth must be greater than 0".to_string(),
            ));
        }
        if self.expand_max_subjects == 0 {
            return Err(AuthzError::Config(
                "expand_max_subjects must be greater than 0".to_string(),
            ));
        }
        for subject in &self.hidden_subjects {
            if subject.parse::<crate::models::SubjectRef>().is_err() {
                return Err(AuthzError::Config(format!(
                    "hidden subject '{}' must be in 'type:id' format",
                    subject
                )));
            }
        }
        Ok(())
    }

    pub fn check_timeout(&self) -> Option<Duration> {
        (self.check_timeout_ms > 0).then(|| Duration::from_millis(self.check_timeout_ms))
    }

    pub fn is_hidden(&self, subject: &crate::models::SubjectRef) -> bool {
        let rendered = subject.to_string();
        self.hidden_subjects.iter().any(|hidden| *hidden == rendered)
    }
}

fn config_error(err: config::ConfigError) -> AuthzError {
    AuthzError::Config(err.to_string())
}
