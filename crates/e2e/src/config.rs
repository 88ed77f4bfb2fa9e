//! Runner configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::http::HttpConfig;
use crate::playwright::PlaywrightConfig;

/// What to do when a content assertion (text, counts) does not hold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    /// Fail the scenario
    #[default]
    Fail,
    /// Record a warning and continue
    Warn,
}

impl std::str::FromStr for MismatchPolicy {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(MismatchPolicy::Fail),
            "warn" => Ok(MismatchPolicy::Warn),
            other => Err(E2eError::InvalidConfig(format!(
                "unknown content policy '{}', expected 'fail' or 'warn'",
                other
            ))),
        }
    }
}

/// Configuration for a scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Base URL that rooted targets resolve against
    pub base_url: String,

    /// Scenarios executed concurrently
    pub workers: usize,

    /// Budget for a single step
    pub step_timeout_ms: u64,

    /// Window in which a page assertion may become true
    pub assert_timeout_ms: u64,

    /// Budget for the whole run
    pub run_timeout_secs: u64,

    /// Policy for content assertion mismatches
    pub content_policy: MismatchPolicy,

    /// Check the base URL answers before running; if not, the suite is skipped
    pub preflight: bool,

    /// Scenario directory
    pub suites_dir: PathBuf,

    /// Output directory for results
    pub output_dir: PathBuf,

    pub playwright: PlaywrightConfig,

    pub http: HttpConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://biomejs.dev".to_string(),
            workers: 4,
            step_timeout_ms: 30_000,
            assert_timeout_ms: 5_000,
            run_timeout_secs: 600,
            content_policy: MismatchPolicy::Fail,
            preflight: false,
            suites_dir: PathBuf::from("suites"),
            output_dir: PathBuf::from("test-results"),
            playwright: PlaywrightConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| E2eError::InvalidConfig(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> E2eResult<()> {
        self.base_url()?;
        if self.workers == 0 {
            return Err(E2eError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.step_timeout_ms == 0 || self.run_timeout_secs == 0 {
            return Err(E2eError::InvalidConfig("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    /// Parsed base URL
    pub fn base_url(&self) -> E2eResult<Url> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            E2eError::InvalidConfig(format!("base_url '{}': {}", self.base_url, e))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(E2eError::InvalidConfig(format!(
                "base_url must be http(s), got '{}'",
                other
            ))),
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn assert_timeout(&self) -> Duration {
        Duration::from_millis(self.assert_timeout_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}
