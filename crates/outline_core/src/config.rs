//! Engine configuration.
//!
//! # Responsibility
//! - Hold the tunables the orchestration layer applies around the graph.
//! - Load them from JSON with per-field defaults.
//!
//! # Invariants
//! - A loaded config has `expand_max > 0` and a supported log level.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Delay between a submit and its persistence dispatch.
pub const DEFAULT_SYNC_DELAY_MS: u64 = 100;
/// Grandchild count below which a child is rendered expanded.
pub const DEFAULT_EXPAND_MAX: usize = 20;

/// What view planning does when the focus resolves to one empty derived context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectPolicy {
    /// Navigate to the bare signifier path instead.
    #[default]
    Redirect,
    /// Render the empty branch as-is.
    RenderEmpty,
    /// Fail with `GraphError::EmptyDerivedContext`.
    Reject,
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Document is not valid JSON for this shape.
    Parse(serde_json::Error),
    /// Field value is outside its accepted range.
    InvalidValue { field: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid engine config: {err}"),
            Self::InvalidValue { field, message } => {
                write!(f, "invalid engine config field `{field}`: {message}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Tunables for the outline engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub sync_delay_ms: u64,
    pub redirect_policy: RedirectPolicy,
    pub expand_max: usize,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_delay_ms: DEFAULT_SYNC_DELAY_MS,
            redirect_policy: RedirectPolicy::default(),
            expand_max: DEFAULT_EXPAND_MAX,
            log_level: crate::logging::default_log_level().to_string(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON config document.
    ///
    /// # Errors
    /// - `ConfigError::Parse` for malformed JSON or unknown fields.
    /// - `ConfigError::InvalidValue` when validation fails.
    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks field ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expand_max == 0 {
            return Err(ConfigError::InvalidValue {
                field: "expand_max",
                message: "must be greater than zero".to_string(),
            });
        }
        crate::logging::parse_level(&self.log_level).map_err(|err| ConfigError::InvalidValue {
            field: "log_level",
            message: err.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig, RedirectPolicy, DEFAULT_EXPAND_MAX};

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_json_str("{}").expect("empty config should load");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.sync_delay_ms, 100);
        assert_eq!(config.expand_max, DEFAULT_EXPAND_MAX);
        assert_eq!(config.redirect_policy, RedirectPolicy::Redirect);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = EngineConfig::from_json_str(
            r#"{"sync_delay_ms": 0, "redirect_policy": "render_empty", "log_level": "WARN"}"#,
        )
        .unwrap();
        assert_eq!(config.sync_delay_ms, 0);
        assert_eq!(config.redirect_policy, RedirectPolicy::RenderEmpty);
        assert_eq!(config.expand_max, DEFAULT_EXPAND_MAX);
    }

    #[test]
    fn rejects_invalid_values_and_unknown_fields() {
        let err = EngineConfig::from_json_str(r#"{"expand_max": 0}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "expand_max",
                ..
            }
        ));

        let err = EngineConfig::from_json_str(r#"{"log_level": "loud"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "log_level", .. }));

        let err = EngineConfig::from_json_str(r#"{"render_delay": 5}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
