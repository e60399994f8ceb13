//! Configuration module for the sentence-transformers service.
//!
//! Settings are read once from the environment at startup. Unset or empty
//! variables fall back to defaults; anything set but unparseable aborts
//! startup.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_MAX_LENGTH: usize = 8192;
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 512;
pub const DEFAULT_MODEL_NAME: &str = "BAAI/bge-m3";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;

/// Maximum number of sentences accepted by a single request.
pub const MAX_SENTENCES: usize = 10;

/// A single invalid environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidVar {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for InvalidVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:?}: {}", self.key, self.value, self.reason)
    }
}

/// Startup configuration failure. Carries every invalid variable found.
#[derive(Debug, Error)]
#[error("invalid configuration: {}", format_invalid(.0))]
pub struct ConfigError(pub Vec<InvalidVar>);

fn format_invalid(vars: &[InvalidVar]) -> String {
    vars.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Requested compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Use CUDA when it initializes, otherwise CPU.
    #[default]
    Auto,
    Cuda,
    Cpu,
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "cpu" => Ok(Self::Cpu),
            other => Err(format!("unknown device '{}', expected auto, cuda or cpu", other)),
        }
    }
}

/// Main service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Inference batch size.
    pub batch_size: usize,
    /// Max passage length in characters, also the passage token budget.
    pub max_length: usize,
    /// Max query length in characters, also the query token budget.
    pub max_query_length: usize,
    /// Hub repository id or local model directory.
    pub model_name: String,
    pub device: DevicePreference,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            batch_size: DEFAULT_BATCH_SIZE,
            max_length: DEFAULT_MAX_LENGTH,
            max_query_length: DEFAULT_MAX_QUERY_LENGTH,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            device: DevicePreference::Auto,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset. All invalid values are collected
    /// before returning, so a single run reports every problem.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut loader = Loader {
            lookup,
            errors: Vec::new(),
        };

        let config = Self {
            host: loader
                .string("HOST")
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: loader.parsed("PORT", DEFAULT_PORT, |v: &u16| *v > 0),
            batch_size: loader.parsed("ST_BATCH_SIZE", DEFAULT_BATCH_SIZE, |v| *v > 0),
            max_length: loader.parsed("ST_MAX_LENGTH", DEFAULT_MAX_LENGTH, |v| *v > 0),
            max_query_length: loader.parsed(
                "ST_MAX_QUERY_LENGTH",
                DEFAULT_MAX_QUERY_LENGTH,
                |v| *v > 0,
            ),
            model_name: loader
                .string("ST_MODEL_NAME")
                .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
            device: loader.parsed("ST_DEVICE", DevicePreference::Auto, |_| true),
        };

        if loader.errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError(loader.errors))
        }
    }

    /// Socket address string to bind the HTTP listener to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct Loader<F> {
    lookup: F,
    errors: Vec<InvalidVar>,
}

impl<F> Loader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T>(&mut self, key: &'static str, default: T, valid: impl Fn(&T) -> bool) -> T
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let Some(raw) = self.string(key) else {
            return default;
        };

        match raw.parse::<T>() {
            Ok(value) if valid(&value) => value,
            Ok(_) => {
                self.errors.push(InvalidVar {
                    key,
                    value: raw,
                    reason: "must be a positive integer".to_string(),
                });
                default
            }
            Err(e) => {
                self.errors.push(InvalidVar {
                    key,
                    value: raw,
                    reason: e.to_string(),
                });
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.max_length, 8192);
        assert_eq!(config.max_query_length, 512);
        assert_eq!(config.model_name, "BAAI/bge-m3");
        assert_eq!(config.device, DevicePreference::Auto);
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let config = load(&[("ST_BATCH_SIZE", ""), ("ST_MODEL_NAME", "")]).unwrap();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.model_name, DEFAULT_MODEL_NAME);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("ST_BATCH_SIZE", "8"),
            ("ST_MAX_LENGTH", "1024"),
            ("ST_MAX_QUERY_LENGTH", "64"),
            ("ST_MODEL_NAME", "/models/bge-small"),
            ("ST_DEVICE", "CPU"),
            ("PORT", "8080"),
        ])
        .unwrap();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.max_length, 1024);
        assert_eq!(config.max_query_length, 64);
        assert_eq!(config.model_name, "/models/bge-small");
        assert_eq!(config.device, DevicePreference::Cpu);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_non_numeric_batch_size_fails() {
        let err = load(&[("ST_BATCH_SIZE", "lots")]).unwrap_err();
        assert_eq!(err.0.len(), 1);
        assert_eq!(err.0[0].key, "ST_BATCH_SIZE");
    }

    #[test]
    fn test_errors_are_collected() {
        let err = load(&[
            ("ST_BATCH_SIZE", "0"),
            ("ST_MAX_LENGTH", "-5"),
            ("ST_DEVICE", "tpu"),
        ])
        .unwrap_err();
        let keys: Vec<_> = err.0.iter().map(|v| v.key).collect();
        assert_eq!(keys, vec!["ST_BATCH_SIZE", "ST_MAX_LENGTH", "ST_DEVICE"]);
        assert!(err.to_string().contains("ST_DEVICE"));
    }
}
