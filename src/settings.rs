// ⚙️ Settings - environment-driven configuration for the benchmark run

use std::env;

use crate::error::{Result, SalesError};
use crate::repository::row::IN_MEMORY;

pub const ENV_SQLITE_PATH: &str = "SALES_BENCH_SQLITE_PATH";
pub const ENV_TOTAL: &str = "SALES_BENCH_TOTAL";
pub const ENV_SEED: &str = "SALES_BENCH_SEED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// SQLite database file for the row store, or `:memory:`
    pub sqlite_path: String,

    /// Number of sales to generate
    pub total_count: usize,

    /// Fixed seed for reproducible runs; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            sqlite_path: IN_MEMORY.to_string(),
            total_count: 100_000,
            seed: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(path) = lookup(ENV_SQLITE_PATH) {
            if !path.trim().is_empty() {
                settings.sqlite_path = path;
            }
        }

        if let Some(raw) = lookup(ENV_TOTAL) {
            settings.total_count = raw.trim().parse().map_err(|_| {
                SalesError::invalid(format!("{} must be a positive integer, got '{}'", ENV_TOTAL, raw))
            })?;
            if settings.total_count == 0 {
                return Err(SalesError::invalid(format!("{} must be >= 1", ENV_TOTAL)));
            }
        }

        if let Some(raw) = lookup(ENV_SEED) {
            let seed = raw.trim().parse().map_err(|_| {
                SalesError::invalid(format!("{} must be an unsigned integer, got '{}'", ENV_SEED, raw))
            })?;
            settings.seed = Some(seed);
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.sqlite_path, ":memory:");
    }

    #[test]
    fn test_reads_all_keys() {
        let settings = Settings::from_lookup(lookup(&[
            (ENV_SQLITE_PATH, "/tmp/sales.db"),
            (ENV_TOTAL, "2500"),
            (ENV_SEED, "17"),
        ]))
        .unwrap();

        assert_eq!(settings.sqlite_path, "/tmp/sales.db");
        assert_eq!(settings.total_count, 2500);
        assert_eq!(settings.seed, Some(17));
    }

    #[test]
    fn test_rejects_malformed_numbers() {
        assert!(Settings::from_lookup(lookup(&[(ENV_TOTAL, "lots")])).is_err());
        assert!(Settings::from_lookup(lookup(&[(ENV_TOTAL, "0")])).is_err());
        assert!(Settings::from_lookup(lookup(&[(ENV_SEED, "-3")])).is_err());
    }
}
