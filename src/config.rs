// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::project_dirs;
use crate::error::{SyncError, SyncResult};

pub const DEFAULT_CATEGORY_COLOR: &str = "#6B7280";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub limits: Limits,
    pub polling: PollingConfig,
    /// Overrides the platform data dir location of the SQLite file.
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout_secs: 15,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Bounds enforced by the transformer before anything is sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_category_name_len: usize,
    pub max_description_len: usize,
    pub max_amount: Decimal,
    pub max_categories: usize,
    pub max_transactions: usize,
    pub max_payload_bytes: usize,
    pub default_color: String,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_category_name_len: 50,
            max_description_len: 500,
            max_amount: Decimal::new(99_999_999_999, 2),
            max_categories: 1_000,
            max_transactions: 10_000,
            max_payload_bytes: 5 * 1024 * 1024,
            default_color: DEFAULT_CATEGORY_COLOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub min_interval_ms: u64,
    /// Wall-clock ceiling for one job, measured from `start_polling`.
    pub timeout_ms: u64,
    pub max_errors: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            min_interval_ms: 500,
            timeout_ms: 6 * 60 * 1_000,
            max_errors: 10,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(self.min_interval_ms))
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

pub fn config_path() -> SyncResult<PathBuf> {
    let proj = project_dirs()?;
    Ok(proj.config_dir().join("config.toml"))
}

impl AppConfig {
    /// Loads `config.toml` from the platform config dir, then applies
    /// `SPENDSYNC_API_URL` / `SPENDSYNC_DB` overrides.
    pub fn load() -> SyncResult<Self> {
        let path = config_path()?;
        let mut cfg = Self::from_file(&path)?;
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> SyncResult<Self> {
        if !path.exists() {
            debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> SyncResult<Self> {
        let cfg: AppConfig = toml::from_str(raw).map_err(|e| SyncError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SPENDSYNC_API_URL").filter(|s| !s.trim().is_empty()) {
            self.api.base_url = url.trim().to_string();
        }
        if let Some(db) = lookup("SPENDSYNC_DB").filter(|s| !s.trim().is_empty()) {
            self.database_path = Some(PathBuf::from(db.trim()));
        }
    }

    fn validate(&self) -> SyncResult<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(SyncError::Config("api.base_url must not be empty".into()));
        }
        if self.polling.min_interval_ms == 0 {
            return Err(SyncError::Config(
                "polling.min_interval_ms must be positive".into(),
            ));
        }
        if self.limits.max_amount.is_sign_negative() {
            return Err(SyncError::Config("limits.max_amount must be >= 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            [api]
            base_url = "https://sync.example.com"

            [polling]
            interval_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(cfg.api.base_url, "https://sync.example.com");
        assert_eq!(cfg.api.request_timeout_secs, 15);
        // interval is clamped to the default minimum
        assert_eq!(cfg.polling.interval(), Duration::from_millis(500));
        assert_eq!(cfg.polling.timeout(), Duration::from_secs(360));
        assert_eq!(cfg.limits.max_categories, 1_000);
    }

    #[test]
    fn env_overrides_file() {
        let mut cfg = AppConfig::default();
        cfg.apply_env(|k| match k {
            "SPENDSYNC_API_URL" => Some(" https://other.example.com ".into()),
            _ => None,
        });
        assert_eq!(cfg.api.base_url, "https://other.example.com");
        assert!(cfg.database_path.is_none());
    }

    #[test]
    fn rejects_zero_min_interval() {
        let err = AppConfig::from_toml("[polling]\nmin_interval_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("min_interval_ms"));
    }
}
