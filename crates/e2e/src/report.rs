//! Scenario and suite results

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{E2eError, E2eResult, FailureKind};

/// Lifecycle of one scenario. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl ScenarioState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScenarioState::Passed | ScenarioState::Failed | ScenarioState::Skipped
        )
    }

    /// Move to `next`, rejecting anything but Pending -> Running -> terminal.
    /// Pending may also go straight to Failed when the run deadline passes first.
    pub fn advance(self, next: ScenarioState) -> E2eResult<ScenarioState> {
        let allowed = match (self, next) {
            (ScenarioState::Pending, ScenarioState::Running) => true,
            (ScenarioState::Pending, ScenarioState::Failed) => true,
            (ScenarioState::Running, n) => n.is_terminal(),
            _ => false,
        };
        if allowed {
            Ok(next)
        } else {
            Err(E2eError::InvalidSuite(format!(
                "invalid scenario state transition: {:?} -> {:?}",
                self, next
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    /// Content mismatch recorded under the `warn` policy
    Warned,
    Failed,
}

/// Result of executing a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub index: usize,
    pub step_name: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    pub message: Option<String>,
}

/// Final outcome of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed {
        kind: FailureKind,
        /// Index into `steps`; `None` when the failure happened outside a step
        step: Option<usize>,
        reason: String,
    },
    Skipped {
        reason: String,
    },
}

impl Outcome {
    pub fn state(&self) -> ScenarioState {
        match self {
            Outcome::Passed => ScenarioState::Passed,
            Outcome::Failed { .. } => ScenarioState::Failed,
            Outcome::Skipped { .. } => ScenarioState::Skipped,
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Outcome::Passed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped { .. })
    }

    /// One-line description for reports
    pub fn summary(&self) -> String {
        match self {
            Outcome::Passed => "passed".to_string(),
            Outcome::Failed { kind, step: Some(step), reason } => {
                format!("{} failure at step {}: {}", kind.as_str(), step, reason)
            }
            Outcome::Failed { kind, step: None, reason } => {
                format!("{} failure: {}", kind.as_str(), reason)
            }
            Outcome::Skipped { reason } => format!("skipped: {}", reason),
        }
    }
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub outcome: Outcome,
    pub duration_ms: u64,
    /// Opening the target of a page scenario
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<StepOutcome>,
    pub setup: Vec<StepOutcome>,
    pub steps: Vec<StepOutcome>,
    pub warnings: Vec<String>,
}

impl ScenarioResult {
    /// Result for a scenario that never ran to completion
    pub fn unfinished(name: &str, kind: FailureKind, reason: String, duration_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            outcome: Outcome::Failed { kind, step: None, reason },
            duration_ms,
            open: None,
            setup: Vec::new(),
            steps: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn skipped(name: &str, reason: String) -> Self {
        Self {
            name: name.to_string(),
            outcome: Outcome::Skipped { reason },
            duration_ms: 0,
            open: None,
            setup: Vec::new(),
            steps: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Result of running a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub base_url: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn new(
        started_at: DateTime<Utc>,
        base_url: String,
        duration_ms: u64,
        results: Vec<ScenarioResult>,
    ) -> Self {
        let passed = results.iter().filter(|r| r.outcome.is_passed()).count();
        let failed = results.iter().filter(|r| r.outcome.is_failed()).count();
        let skipped = results.iter().filter(|r| r.outcome.is_skipped()).count();

        Self {
            run_id: Uuid::new_v4(),
            started_at,
            base_url,
            total: results.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// 0 iff no scenario failed
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    /// Write results as JSON into `output_dir`
    pub fn write_json(&self, output_dir: &Path) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(output_dir)?;

        let path = output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, outcome: Outcome) -> ScenarioResult {
        ScenarioResult {
            name: name.into(),
            outcome,
            duration_ms: 1,
            open: None,
            setup: vec![],
            steps: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn test_state_machine() {
        let state = ScenarioState::Pending;
        let state = state.advance(ScenarioState::Running).unwrap();
        let state = state.advance(ScenarioState::Passed).unwrap();
        assert!(state.is_terminal());
        assert!(state.advance(ScenarioState::Running).is_err());
        assert!(ScenarioState::Pending.advance(ScenarioState::Passed).is_err());
        assert!(ScenarioState::Pending.advance(ScenarioState::Failed).is_ok());
        assert!(ScenarioState::Skipped.advance(ScenarioState::Failed).is_err());
    }

    #[test]
    fn test_suite_counts_and_exit_code() {
        let suite = SuiteResult::new(
            Utc::now(),
            "https://biomejs.dev".into(),
            10,
            vec![
                result("a", Outcome::Passed),
                result("b", Outcome::Skipped { reason: "setup".into() }),
            ],
        );
        assert_eq!((suite.total, suite.passed, suite.failed, suite.skipped), (2, 1, 0, 1));
        assert_eq!(suite.exit_code(), 0);

        let suite = SuiteResult::new(
            Utc::now(),
            "https://biomejs.dev".into(),
            10,
            vec![result(
                "c",
                Outcome::Failed {
                    kind: FailureKind::Assertion,
                    step: Some(1),
                    reason: "expected status 404, got 200".into(),
                },
            )],
        );
        assert_eq!(suite.exit_code(), 1);
        assert_eq!(
            suite.results[0].outcome.summary(),
            "assertion failure at step 1: expected status 404, got 200"
        );
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let suite = SuiteResult::new(Utc::now(), "http://x".into(), 0, vec![]);
        let path = suite.write_json(&dir.path().join("out")).unwrap();
        let parsed: SuiteResult =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed.run_id, suite.run_id);
    }
}
