//! Application configuration.
//!
//! Values come from the environment (a `.env` file is honoured through
//! `dotenvy`) and can be overridden by command-line flags.

use std::env;
use std::path::PathBuf;

use crate::api::logs::log_warning;

/// Default dataset file, relative to the working directory.
pub const DEFAULT_DATA_PATH: &str = "data/covid.csv";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Confirmed cases per million at which an entity's development time starts.
pub const DEFAULT_DEVTIME_THRESHOLD: f64 = 5.0;

/// Population (in millions) below which an entity counts as small.
///
/// Only used when the dataset has no `pop_flag` column.
pub const DEFAULT_SMALL_POPULATION: f64 = 0.3;

/// Settings that shape how a dataset is enriched at load time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatasetConfig {
    pub devtime_threshold: f64,
    pub small_population_threshold: f64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            devtime_threshold: DEFAULT_DEVTIME_THRESHOLD,
            small_population_threshold: DEFAULT_SMALL_POPULATION,
        }
    }
}

/// Process configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_path: PathBuf,
    pub port: u16,
    pub dataset: DatasetConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            port: DEFAULT_PORT,
            dataset: DatasetConfig::default(),
        }
    }
}

impl Config {
    /// Build the configuration from environment variables.
    ///
    /// - `CURVES_DATA` - dataset path
    /// - `CURVES_PORT` - HTTP port
    /// - `CURVES_DEVTIME_THRESHOLD` - development-time threshold (per million)
    /// - `CURVES_SMALL_POPULATION` - small population cutoff (millions)
    pub fn from_env() -> Self {
        // Try loading .env file
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            data_path: lookup("CURVES_DATA")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            port: parse_or("CURVES_PORT", lookup("CURVES_PORT"), defaults.port),
            dataset: DatasetConfig {
                devtime_threshold: parse_or(
                    "CURVES_DEVTIME_THRESHOLD",
                    lookup("CURVES_DEVTIME_THRESHOLD"),
                    defaults.dataset.devtime_threshold,
                ),
                small_population_threshold: parse_or(
                    "CURVES_SMALL_POPULATION",
                    lookup("CURVES_SMALL_POPULATION"),
                    defaults.dataset.small_population_threshold,
                ),
            },
        }
    }

    pub fn with_data_path(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.data_path = path;
        }
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        self
    }
}

fn parse_or<T: std::str::FromStr + Copy>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                log_warning(format!("Ignoring invalid {}='{}', using default", key, raw));
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config, Config::default());
        assert_eq!(config.dataset.devtime_threshold, 5.0);
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_env_values() {
        let config = Config::from_lookup(lookup_from(&[
            ("CURVES_DATA", "/tmp/data.csv"),
            ("CURVES_PORT", "8080"),
            ("CURVES_DEVTIME_THRESHOLD", "10"),
        ]));
        assert_eq!(config.data_path, PathBuf::from("/tmp/data.csv"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.dataset.devtime_threshold, 10.0);
        assert_eq!(config.dataset.small_population_threshold, 0.3);
    }

    #[test]
    fn test_invalid_value_falls_back() {
        let config = Config::from_lookup(lookup_from(&[("CURVES_PORT", "not-a-port")]));
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default()
            .with_data_path(Some(PathBuf::from("other.csv")))
            .with_port(None);
        assert_eq!(config.data_path, PathBuf::from("other.csv"));
        assert_eq!(config.port, DEFAULT_PORT);
    }
}
