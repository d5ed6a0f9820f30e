use std::env;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

fn get_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn get_env_bool(key: &str, default: bool) -> bool {
    match get_env(key) {
        None => default,
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"),
    }
}

fn get_env_usize(key: &str, default: usize) -> Result<usize> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<usize>()
            .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
    }
}

fn get_env_string(key: &str, default: &str) -> String {
    get_env(key).unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Data sources (paths relative to data_root, owned by the pipeline)
    pub data_root: String,
    pub regime_file: String,
    pub segments_file: String,
    pub active_pool_file: String,
    pub full_pool_file: String,
    pub watchlist_file: String,

    // Task runner backend
    pub task_api_base: String,
    pub task_timeout_secs: u64,

    // Report windows
    pub history_window: usize,
    pub distribution_window: usize,

    // Dashboard server
    pub dashboard_host: String,
    pub dashboard_port: u16,
    pub dashboard_open_browser: bool,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let task_api_base = get_env_string("TASK_API_BASE", "http://127.0.0.1:8000")
            .trim_end_matches('/')
            .to_string();

        let s = Self {
            data_root: get_env_string("QUANT_DATA_ROOT", "./data"),
            regime_file: get_env_string("REGIME_FILE", "backtests/market_regime.csv"),
            segments_file: get_env_string(
                "REGIME_SEGMENTS_FILE",
                "backtests/market_regime_segments.csv",
            ),
            active_pool_file: get_env_string("ACTIVE_POOL_FILE", "universe/active_universe.csv"),
            full_pool_file: get_env_string("FULL_POOL_FILE", "master/etf_master.csv"),
            watchlist_file: get_env_string("WATCHLIST_FILE", "watchlists/watchlist_today.csv"),
            task_api_base,
            task_timeout_secs: get_env_usize("TASK_TIMEOUT_SECS", 10)? as u64,
            history_window: get_env_usize("HISTORY_WINDOW", 60)?,
            distribution_window: get_env_usize("DISTRIBUTION_WINDOW", 30)?,
            dashboard_host: get_env_string("DASHBOARD_HOST", "127.0.0.1"),
            dashboard_port: get_env_usize("DASHBOARD_PORT", 3000)? as u16,
            dashboard_open_browser: get_env_bool("DASHBOARD_OPEN_BROWSER", false),
        };

        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_root.is_empty() {
            return Err(anyhow!("QUANT_DATA_ROOT must not be empty"));
        }
        if self.task_api_base.is_empty() {
            return Err(anyhow!("TASK_API_BASE must not be empty"));
        }
        if self.task_timeout_secs < 1 {
            return Err(anyhow!(
                "TASK_TIMEOUT_SECS must be >= 1 (got {})",
                self.task_timeout_secs
            ));
        }
        if self.history_window < 1 {
            return Err(anyhow!(
                "HISTORY_WINDOW must be >= 1 (got {})",
                self.history_window
            ));
        }
        if self.distribution_window < 1 {
            return Err(anyhow!(
                "DISTRIBUTION_WINDOW must be >= 1 (got {})",
                self.distribution_window
            ));
        }
        if self.dashboard_port == 0 {
            return Err(anyhow!("DASHBOARD_PORT must be >= 1"));
        }
        for (key, rel) in [
            ("REGIME_FILE", &self.regime_file),
            ("REGIME_SEGMENTS_FILE", &self.segments_file),
            ("ACTIVE_POOL_FILE", &self.active_pool_file),
            ("FULL_POOL_FILE", &self.full_pool_file),
            ("WATCHLIST_FILE", &self.watchlist_file),
        ] {
            if rel.is_empty() {
                return Err(anyhow!("{key} must not be empty"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings() -> Settings {
        Settings {
            data_root: "./data".to_string(),
            regime_file: "backtests/market_regime.csv".to_string(),
            segments_file: "backtests/market_regime_segments.csv".to_string(),
            active_pool_file: "universe/active_universe.csv".to_string(),
            full_pool_file: "master/etf_master.csv".to_string(),
            watchlist_file: "watchlists/watchlist_today.csv".to_string(),
            task_api_base: "http://127.0.0.1:8000".to_string(),
            task_timeout_secs: 10,
            history_window: 60,
            distribution_window: 30,
            dashboard_host: "127.0.0.1".to_string(),
            dashboard_port: 3000,
            dashboard_open_browser: false,
        }
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(base_settings().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_windows() {
        let mut s = base_settings();
        s.distribution_window = 0;
        assert!(s.validate().is_err());

        let mut s = base_settings();
        s.history_window = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_source_path() {
        let mut s = base_settings();
        s.watchlist_file = String::new();
        assert!(s.validate().is_err());
    }
}
