use crate::fetcher::FetchOptions;
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://classroom.googleapis.com/v1";

#[derive(Debug, Clone)]
pub struct Config {
    pub access_token: String,
    pub api_base: String,
    pub db_path: PathBuf,
    pub log_file: PathBuf,
    pub log_level: String,
    pub fetch: FetchOptions,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let access_token = lookup("CLASSROOM_ACCESS_TOKEN").context(
            "CLASSROOM_ACCESS_TOKEN not found. Please set it in .env file or environment",
        )?;

        if access_token.trim().is_empty() {
            anyhow::bail!("CLASSROOM_ACCESS_TOKEN is empty");
        }

        let or_default = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let concurrency: usize = or_default("FETCH_CONCURRENCY", "4")
            .parse()
            .context("FETCH_CONCURRENCY must be a positive integer")?;
        let timeout_secs: u64 = or_default("FETCH_TIMEOUT_SECS", "60")
            .parse()
            .context("FETCH_TIMEOUT_SECS must be a positive integer")?;

        Ok(Config {
            access_token: access_token.trim().to_string(),
            api_base: or_default("CLASSROOM_API_BASE", DEFAULT_API_BASE),
            db_path: PathBuf::from(or_default("CELLS_DB_PATH", "classroom_cells.sqlite3")),
            log_file: PathBuf::from(or_default("CELLS_LOG_FILE", "classroom-cells.log")),
            log_level: or_default("CELLS_LOG_LEVEL", "info"),
            fetch: FetchOptions {
                concurrency: concurrency.max(1),
                timeout: Duration::from_secs(timeout_secs.max(1)),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("CLASSROOM_ACCESS_TOKEN", "ya29.token")]).unwrap();
        assert_eq!(config.access_token, "ya29.token");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.db_path, PathBuf::from("classroom_cells.sqlite3"));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.fetch.concurrency, 4);
        assert_eq!(config.fetch.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_overrides_and_minimums() {
        let config = load(&[
            ("CLASSROOM_ACCESS_TOKEN", "t"),
            ("CLASSROOM_API_BASE", "http://localhost:8080/v1"),
            ("FETCH_CONCURRENCY", "0"),
            ("FETCH_TIMEOUT_SECS", "15"),
            ("CELLS_LOG_LEVEL", "classroom_cells=debug"),
        ])
        .unwrap();
        assert_eq!(config.api_base, "http://localhost:8080/v1");
        assert_eq!(config.fetch.concurrency, 1);
        assert_eq!(config.fetch.timeout, Duration::from_secs(15));
        assert_eq!(config.log_level, "classroom_cells=debug");
    }

    #[test]
    fn test_missing_or_empty_token() {
        assert!(load(&[]).is_err());
        assert!(load(&[("CLASSROOM_ACCESS_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(load(&[("CLASSROOM_ACCESS_TOKEN", "t"), ("FETCH_CONCURRENCY", "many")]).is_err());
    }
}
