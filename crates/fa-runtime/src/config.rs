use fa_ledger::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ENV_FORCE_PATH: &str = "FA_FORCE_PATH";
pub const ENV_LEDGER: &str = "FA_LEDGER";
pub const ENV_LEDGER_CAPACITY: &str = "FA_LEDGER_CAPACITY";

/// How the Force protocol resolves unresolved operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcePath {
    /// Block until every operand is available.
    #[default]
    Inline,
    /// Chain continuations and hand back a pending result.
    Scheduled,
}

impl ForcePath {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Scheduled => "scheduled",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "inline" | "sync" => Some(Self::Inline),
            "scheduled" | "async" => Some(Self::Scheduled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub force_path: ForcePath,
    pub ledger_enabled: bool,
    pub ledger_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            force_path: ForcePath::Inline,
            ledger_enabled: true,
            ledger_capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Json(String),
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(detail) => write!(f, "invalid engine config: {detail}"),
            Self::InvalidValue {
                key,
                value,
                expected,
            } => write!(f, "{key}={value:?} is invalid, expected {expected}"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_owned(),
            expected: "a boolean flag",
        }),
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|err| ConfigError::Json(err.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string(self).map_err(|err| ConfigError::Json(err.to_string()))
    }

    /// Defaults overridden by the `FA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup, e.g. the process environment.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_FORCE_PATH) {
            self.force_path = ForcePath::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: ENV_FORCE_PATH,
                value: raw.clone(),
                expected: "inline or scheduled",
            })?;
        }
        if let Some(raw) = lookup(ENV_LEDGER) {
            self.ledger_enabled = parse_flag(ENV_LEDGER, &raw)?;
        }
        if let Some(raw) = lookup(ENV_LEDGER_CAPACITY) {
            self.ledger_capacity =
                raw.trim()
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_LEDGER_CAPACITY,
                        value: raw.clone(),
                        expected: "a non-negative integer",
                    })?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, ENV_FORCE_PATH, ENV_LEDGER, ENV_LEDGER_CAPACITY, EngineConfig, ForcePath};
    use std::collections::BTreeMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_inline_with_ledger() {
        let config = EngineConfig::default();
        assert_eq!(config.force_path, ForcePath::Inline);
        assert!(config.ledger_enabled);
        assert!(config.ledger_capacity > 0);
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = EngineConfig::from_json(r#"{"force_path":"scheduled"}"#).expect("valid");
        assert_eq!(config.force_path, ForcePath::Scheduled);
        assert!(config.ledger_enabled);
        let encoded = config.to_json().expect("serialize");
        assert_eq!(EngineConfig::from_json(&encoded), Ok(config));
    }

    #[test]
    fn json_rejects_unknown_fields() {
        let err = EngineConfig::from_json(r#"{"threads":4}"#).expect_err("unknown field");
        assert!(matches!(err, ConfigError::Json(detail) if detail.contains("threads")));
    }

    #[test]
    fn overrides_apply_in_order() {
        let config = EngineConfig::default()
            .with_overrides(lookup(&[
                (ENV_FORCE_PATH, "Scheduled"),
                (ENV_LEDGER, "off"),
                (ENV_LEDGER_CAPACITY, "16"),
            ]))
            .expect("valid overrides");
        assert_eq!(config.force_path, ForcePath::Scheduled);
        assert!(!config.ledger_enabled);
        assert_eq!(config.ledger_capacity, 16);
    }

    #[test]
    fn invalid_override_names_the_key() {
        let err = EngineConfig::default()
            .with_overrides(lookup(&[(ENV_LEDGER_CAPACITY, "lots")]))
            .expect_err("not a number");
        assert!(err.to_string().contains(ENV_LEDGER_CAPACITY));
        let err = EngineConfig::default()
            .with_overrides(lookup(&[(ENV_FORCE_PATH, "eventually")]))
            .expect_err("unknown path");
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == ENV_FORCE_PATH));
    }
}
