//! Error types for scenario execution

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error("Timeout after {ms} ms: {what}")]
    Timeout { what: String, ms: u64 },

    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunch(Box<E2eError>),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Invalid suite: {0}")]
    InvalidSuite(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

/// Failure classes reported per scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Assertion,
    Transport,
    Timeout,
    Setup,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Assertion => "assertion",
            FailureKind::Transport => "transport",
            FailureKind::Timeout => "timeout",
            FailureKind::Setup => "setup",
            FailureKind::Internal => "internal",
        }
    }
}

impl E2eError {
    /// Map an error onto the per-scenario failure taxonomy
    pub fn kind(&self) -> FailureKind {
        match self {
            E2eError::AssertionFailed(_) | E2eError::NotFound(_) => FailureKind::Assertion,
            E2eError::Transport(_) | E2eError::Playwright(_) => FailureKind::Transport,
            E2eError::Http(e) if e.is_timeout() => FailureKind::Timeout,
            E2eError::Http(_) => FailureKind::Transport,
            E2eError::Timeout { .. } => FailureKind::Timeout,
            E2eError::Setup(_) => FailureKind::Setup,
            _ => FailureKind::Internal,
        }
    }

    /// The harness itself could not run the scenario. These fail the
    /// scenario even when raised by a fixture.
    pub fn is_harness_fault(&self) -> bool {
        matches!(self, E2eError::BrowserLaunch(_) | E2eError::PlaywrightNotFound)
    }

    /// Text recorded in a scenario result. Assertion mismatches are kept bare.
    pub fn reason(&self) -> String {
        match self {
            E2eError::AssertionFailed(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// Shorthand for building an assertion failure
    pub fn assertion(message: impl Into<String>) -> Self {
        E2eError::AssertionFailed(message.into())
    }
}
