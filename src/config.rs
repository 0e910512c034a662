use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Caps and thresholds used by the engine and the dashboard feeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Limits {
    pub activity_per_source: usize,
    pub activity_max: usize,
    pub upcoming_max: usize,
    pub recent_attendance: usize,
    pub default_total_marks: f64,
    pub pass_percentage: f64,
    pub recent_notice_days: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            activity_per_source: 2,
            activity_max: 8,
            upcoming_max: 6,
            recent_attendance: 5,
            default_total_marks: 100.0,
            pass_percentage: 40.0,
            recent_notice_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub api_url: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    pub request_timeout_secs: u64,
    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            workspace: None,
            log_filter: "rosterd=info".to_string(),
            request_timeout_secs: 15,
            limits: Limits::default(),
        }
    }
}

impl Config {
    /// Defaults, then the JSON file named by `ROSTERD_CONFIG`, then individual
    /// `ROSTERD_*` variables. A `.env` file in the working directory is honoured.
    pub fn load() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        let mut config = match std::env::var("ROSTERD_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(&PathBuf::from(path))?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.to_string_lossy()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.to_string_lossy()))
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty("ROSTERD_API_URL") {
            self.api_url = v;
        }
        if let Some(v) = non_empty("ROSTERD_TOKEN") {
            self.token = Some(v);
        }
        if let Some(v) = non_empty("ROSTERD_WORKSPACE") {
            self.workspace = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty("ROSTERD_LOG") {
            self.log_filter = v;
        }
        if let Some(secs) = non_empty("ROSTERD_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.request_timeout_secs = secs;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
