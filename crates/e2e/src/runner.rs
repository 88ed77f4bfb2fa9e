//! Scenario runner: sessions, concurrency, deadlines and result collection

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::Url;
use tracing::{debug, error, info, warn};

use crate::config::{MismatchPolicy, RunnerConfig};
use crate::error::{E2eError, E2eResult, FailureKind};
use crate::executor::{execute_step, StepContext};
use crate::http::{HttpConfig, ReqwestClient};
use crate::playwright::{PlaywrightBrowser, PlaywrightConfig};
use crate::preflight::wait_for_reachable;
use crate::report::{
    Outcome, ScenarioResult, ScenarioState, StepOutcome, StepStatus, SuiteResult,
};
use crate::session::{Browser, HttpClient, Session, SessionFactory};
use crate::spec::{validate_suite, Scenario, ScenarioMode, Step, Viewport};

/// Session factory backed by Playwright and reqwest
pub struct LiveSessionFactory {
    playwright: PlaywrightConfig,
    http: HttpConfig,
}

impl LiveSessionFactory {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            playwright: config.playwright.clone(),
            http: config.http.clone(),
        }
    }
}

#[async_trait]
impl SessionFactory for LiveSessionFactory {
    async fn launch_browser(&self, viewport: Viewport) -> E2eResult<Box<dyn Browser>> {
        let browser = PlaywrightBrowser::launch(&self.playwright, viewport).await?;
        Ok(Box::new(browser))
    }

    fn http_client(&self) -> E2eResult<Arc<dyn HttpClient>> {
        Ok(Arc::new(ReqwestClient::new(&self.http)?))
    }
}

/// Read-only inputs shared by every scenario task
struct RunContext {
    factory: Arc<dyn SessionFactory>,
    base_url: Url,
    viewport: Viewport,
    step_timeout: Duration,
    assert_timeout: Duration,
    content_policy: MismatchPolicy,
}

/// Runs scenarios against a site
pub struct TestRunner {
    config: RunnerConfig,
    factory: Arc<dyn SessionFactory>,
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRunner {
    /// Create a runner with default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a runner that drives a real browser and HTTP client
    pub fn with_config(config: RunnerConfig) -> Self {
        let factory = Arc::new(LiveSessionFactory::new(&config));
        Self::with_factory(config, factory)
    }

    /// Create a runner with custom collaborators
    pub fn with_factory(config: RunnerConfig, factory: Arc<dyn SessionFactory>) -> Self {
        Self { config, factory }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Load every scenario from the configured suites directory
    pub fn load_scenarios(&self) -> E2eResult<Vec<Scenario>> {
        Scenario::load_all(&self.config.suites_dir)
    }

    /// Run all scenarios in the suites directory
    pub async fn run_all(&self) -> E2eResult<SuiteResult> {
        let scenarios = self.load_scenarios()?;
        self.run(scenarios).await
    }

    /// Run scenarios carrying a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<SuiteResult> {
        let scenarios = Scenario::filter_by_tag(self.load_scenarios()?, tag);
        self.run(scenarios).await
    }

    /// Run a single scenario by name
    pub async fn run_named(&self, name: &str) -> E2eResult<SuiteResult> {
        let scenario = self
            .load_scenarios()?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Scenario not found: {}", name)))?;
        self.run(vec![scenario]).await
    }

    /// Run scenarios and return one result per scenario, in submission order.
    ///
    /// Only suite-level problems are returned as errors. Anything that goes
    /// wrong inside a scenario ends up in that scenario's result.
    pub async fn run(&self, scenarios: Vec<Scenario>) -> E2eResult<SuiteResult> {
        let base_url = self.config.base_url()?;
        validate_suite(&scenarios, &base_url)?;

        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = run_deadline(tokio::time::Instant::now(), self.config.run_timeout());

        info!(
            "Running {} scenario(s) against {} ({} worker(s))...",
            scenarios.len(),
            base_url,
            self.config.workers
        );

        if self.config.preflight {
            if let Err(e) = self.preflight(&base_url).await {
                warn!("Skipping suite: {}", e);
                let results = scenarios
                    .iter()
                    .map(|s| ScenarioResult::skipped(&s.name, e.reason()))
                    .collect();
                return Ok(self.finish(started_at, &base_url, start, results));
            }
        }

        let ctx = Arc::new(RunContext {
            factory: Arc::clone(&self.factory),
            base_url: base_url.clone(),
            viewport: self.config.playwright.viewport,
            step_timeout: self.config.step_timeout(),
            assert_timeout: self.config.assert_timeout(),
            content_policy: self.config.content_policy,
        });

        let results: Vec<ScenarioResult> = stream::iter(scenarios)
            .map(|scenario| supervise(Arc::clone(&ctx), scenario, deadline))
            .buffered(self.config.workers.max(1))
            .collect()
            .await;

        Ok(self.finish(started_at, &base_url, start, results))
    }

    /// Write results to `test-results.json` in the output directory
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        results.write_json(&self.config.output_dir)
    }

    async fn preflight(&self, base_url: &Url) -> E2eResult<()> {
        let http = self.factory.http_client()?;
        wait_for_reachable(http.as_ref(), base_url.as_str(), self.config.step_timeout()).await
    }

    fn finish(
        &self,
        started_at: chrono::DateTime<Utc>,
        base_url: &Url,
        start: Instant,
        results: Vec<ScenarioResult>,
    ) -> SuiteResult {
        let duration_ms = start.elapsed().as_millis() as u64;
        let suite = SuiteResult::new(started_at, base_url.to_string(), duration_ms, results);

        info!("");
        info!(
            "Scenario Results: {} passed, {} failed, {} skipped ({} ms)",
            suite.passed, suite.failed, suite.skipped, suite.duration_ms
        );
        suite
    }
}

/// `now + budget`, or roughly a century out when that overflows
fn run_deadline(now: tokio::time::Instant, budget: Duration) -> tokio::time::Instant {
    now.checked_add(budget)
        .unwrap_or_else(|| now + Duration::from_secs(100 * 365 * 24 * 3600))
}

fn transition(name: &str, state: ScenarioState, next: ScenarioState) -> ScenarioState {
    match state.advance(next) {
        Ok(next) => {
            debug!("{}: {:?} -> {:?}", name, state, next);
            next
        }
        Err(e) => {
            warn!("{}: {}", name, e);
            state
        }
    }
}

/// Run one scenario in its own task, bounded by the run deadline
async fn supervise(
    ctx: Arc<RunContext>,
    scenario: Scenario,
    deadline: tokio::time::Instant,
) -> ScenarioResult {
    let name = scenario.name.clone();
    let state = ScenarioState::Pending;

    if tokio::time::Instant::now() >= deadline {
        let result = ScenarioResult::unfinished(
            &name,
            FailureKind::Timeout,
            "run deadline exceeded before the scenario started".into(),
            0,
        );
        transition(&name, state, result.outcome.state());
        log_result(&result);
        return result;
    }

    let state = transition(&name, state, ScenarioState::Running);
    let start = Instant::now();
    let task = tokio::spawn(run_scenario(ctx, scenario));
    let abort = task.abort_handle();

    let result = match tokio::time::timeout_at(deadline, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            let reason = if join_error.is_panic() {
                let payload = join_error.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                format!("scenario panicked: {}", message)
            } else {
                "scenario task was cancelled".to_string()
            };
            ScenarioResult::unfinished(
                &name,
                FailureKind::Internal,
                reason,
                start.elapsed().as_millis() as u64,
            )
        }
        Err(_) => {
            // Dropping the aborted task drops its session, which kills the driver
            abort.abort();
            ScenarioResult::unfinished(
                &name,
                FailureKind::Timeout,
                "run deadline exceeded".into(),
                start.elapsed().as_millis() as u64,
            )
        }
    };

    transition(&name, state, result.outcome.state());
    log_result(&result);
    result
}

fn log_result(result: &ScenarioResult) {
    match &result.outcome {
        Outcome::Passed => info!("✓ {} ({} ms)", result.name, result.duration_ms),
        Outcome::Failed { .. } => error!("✗ {} - {}", result.name, result.outcome.summary()),
        Outcome::Skipped { reason } => warn!("○ {} - skipped: {}", result.name, reason),
    }
}

async fn run_step(
    session: &mut Session,
    step: &Step,
    ctx: &StepContext,
    budget: Duration,
) -> E2eResult<()> {
    match tokio::time::timeout(budget, execute_step(session, step, ctx)).await {
        Ok(result) => result,
        Err(_) => Err(E2eError::Timeout {
            what: step.name(),
            ms: budget.as_millis() as u64,
        }),
    }
}

fn step_outcome(
    index: usize,
    step: &Step,
    status: StepStatus,
    started: Instant,
    message: Option<String>,
) -> StepOutcome {
    StepOutcome {
        index,
        step_name: step.name(),
        status,
        duration_ms: started.elapsed().as_millis() as u64,
        message,
    }
}

/// Failure for a scenario the harness could not drive
fn harness_failure(e: &E2eError, context: &str) -> Outcome {
    let kind = match e.kind() {
        FailureKind::Setup | FailureKind::Assertion => FailureKind::Internal,
        kind => kind,
    };
    Outcome::Failed {
        kind,
        step: None,
        reason: format!("{}: {}", context, e.reason()),
    }
}

/// Acquire a session, open the target, run setup and steps, release the session
async fn run_scenario(ctx: Arc<RunContext>, scenario: Scenario) -> ScenarioResult {
    let start = Instant::now();
    debug!("Running scenario: {}", scenario.name);

    let target = match scenario.target_url(&ctx.base_url) {
        Ok(target) => target,
        Err(e) => return ScenarioResult::skipped(&scenario.name, e.reason()),
    };
    let step_ctx = StepContext {
        base_url: ctx.base_url.clone(),
        target,
        assert_timeout: ctx.assert_timeout,
        content_policy: scenario.content_policy.unwrap_or(ctx.content_policy),
    };
    let viewport = scenario.viewport.unwrap_or(ctx.viewport);

    let mut result = ScenarioResult {
        name: scenario.name.clone(),
        outcome: Outcome::Passed,
        duration_ms: 0,
        open: None,
        setup: Vec::new(),
        steps: Vec::new(),
        warnings: Vec::new(),
    };

    let mut session = match Session::acquire(Arc::clone(&ctx.factory), viewport) {
        Ok(session) => session,
        Err(e) => {
            result.outcome = harness_failure(&e, "session unavailable");
            result.duration_ms = start.elapsed().as_millis() as u64;
            return result;
        }
    };

    // Page scenarios open their target before any fixture runs. Failing to
    // get there fails the scenario.
    if scenario.mode() == ScenarioMode::Page {
        let open_target = Step::Navigate { url: step_ctx.target.to_string() };
        let started = Instant::now();
        match run_step(&mut session, &open_target, &step_ctx, ctx.step_timeout).await {
            Ok(()) => {
                result.open =
                    Some(step_outcome(0, &open_target, StepStatus::Passed, started, None))
            }
            Err(e) => {
                result.open = Some(step_outcome(
                    0,
                    &open_target,
                    StepStatus::Failed,
                    started,
                    Some(e.reason()),
                ));
                result.outcome = harness_failure(&e, "opening target failed");
            }
        }
    }

    if result.outcome.is_passed() {
        for (index, step) in scenario.setup.iter().enumerate() {
            let started = Instant::now();
            let outcome = run_step(&mut session, step, &step_ctx, ctx.step_timeout).await;
            result.warnings.extend(
                session
                    .take_warnings()
                    .into_iter()
                    .map(|w| format!("setup step {}: {}", index, w)),
            );
            match outcome {
                Ok(()) => {
                    result.setup.push(step_outcome(index, step, StepStatus::Passed, started, None))
                }
                Err(e) => {
                    let reason = e.reason();
                    result.setup.push(step_outcome(
                        index,
                        step,
                        StepStatus::Failed,
                        started,
                        Some(reason.clone()),
                    ));
                    result.outcome = if e.is_harness_fault() {
                        harness_failure(&e, &format!("setup step {} ({})", index, step.name()))
                    } else {
                        Outcome::Skipped {
                            reason: format!(
                                "setup step {} ({}) failed: {}",
                                index,
                                step.name(),
                                reason
                            ),
                        }
                    };
                    break;
                }
            }
        }
    }

    if result.outcome.is_passed() {
        for (index, step) in scenario.steps.iter().enumerate() {
            let started = Instant::now();
            let outcome = run_step(&mut session, step, &step_ctx, ctx.step_timeout).await;
            let warnings = session.take_warnings();

            match outcome {
                Ok(()) if warnings.is_empty() => {
                    result.steps.push(step_outcome(index, step, StepStatus::Passed, started, None))
                }
                Ok(()) => {
                    let message = warnings.join("; ");
                    result
                        .warnings
                        .extend(warnings.iter().map(|w| format!("step {}: {}", index, w)));
                    result.steps.push(step_outcome(
                        index,
                        step,
                        StepStatus::Warned,
                        started,
                        Some(message),
                    ));
                }
                Err(e) if step_ctx.softens(step, &e) => {
                    let reason = e.reason();
                    warn!("{}: step {} ({}): {}", scenario.name, index, step.name(), reason);
                    result.warnings.push(format!("step {}: {}", index, reason));
                    result.steps.push(step_outcome(
                        index,
                        step,
                        StepStatus::Warned,
                        started,
                        Some(reason),
                    ));
                }
                Err(e) => {
                    let reason = e.reason();
                    result.steps.push(step_outcome(
                        index,
                        step,
                        StepStatus::Failed,
                        started,
                        Some(reason.clone()),
                    ));
                    result.outcome = Outcome::Failed {
                        kind: e.kind(),
                        step: Some(index),
                        reason,
                    };
                    break;
                }
            }
        }
    }

    session.release().await;
    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_deadline_saturates() {
        let now = tokio::time::Instant::now();
        assert_eq!(run_deadline(now, Duration::from_secs(600)), now + Duration::from_secs(600));

        let far = run_deadline(now, Duration::from_secs(u64::MAX));
        assert!(far > now + Duration::from_secs(365 * 24 * 3600));
    }

    #[test]
    fn test_harness_failure_is_never_a_skip() {
        let launch = E2eError::BrowserLaunch(Box::new(E2eError::PlaywrightNotFound));
        match harness_failure(&launch, "opening target failed") {
            Outcome::Failed { kind, step, reason } => {
                assert_eq!(kind, FailureKind::Internal);
                assert_eq!(step, None);
                assert!(reason.starts_with("opening target failed: Browser launch failed"));
            }
            other => panic!("expected failure, got {:?}", other),
        }

        let http = E2eError::Setup("http client unavailable".into());
        assert!(matches!(
            harness_failure(&http, "session unavailable"),
            Outcome::Failed { kind: FailureKind::Internal, .. }
        ));
    }
}
