//! `sitecheck run`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use sitecheck_e2e::playwright::BrowserKind;
use sitecheck_e2e::{
    MismatchPolicy, Outcome, RunnerConfig, ScenarioResult, StepStatus, SuiteResult, TestRunner,
};
use tracing::info;

use super::{load_scenarios, select, SelectArgs};
use crate::output::{print_error, print_list, print_value, print_warning, OutputFormat, TableDisplay};

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Base URL that rooted targets resolve against
    #[arg(long, env = "SITECHECK_BASE_URL")]
    pub base_url: Option<String>,

    /// Scenarios executed concurrently
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// What a content mismatch does: fail or warn
    #[arg(long)]
    pub content_policy: Option<MismatchPolicy>,

    /// Browser engine (chromium, firefox, webkit)
    #[arg(long)]
    pub browser: Option<BrowserKind>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Budget for a single step in milliseconds
    #[arg(long)]
    pub step_timeout_ms: Option<u64>,

    /// Budget for the whole run in seconds
    #[arg(long)]
    pub run_timeout_secs: Option<u64>,

    /// Directory for test-results.json
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Skip the suite when the base URL does not answer
    #[arg(long)]
    pub preflight: bool,

    /// Do not write test-results.json
    #[arg(long)]
    pub no_write: bool,
}

impl RunArgs {
    /// Layer command line flags over the loaded configuration
    pub fn apply(&self, config: &mut RunnerConfig) {
        if let Some(suites) = &self.select.suites {
            config.suites_dir = suites.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(policy) = self.content_policy {
            config.content_policy = policy;
        }
        if let Some(browser) = self.browser {
            config.playwright.browser = browser;
        }
        if self.headed {
            config.playwright.headless = false;
        }
        if let Some(ms) = self.step_timeout_ms {
            config.step_timeout_ms = ms;
        }
        if let Some(secs) = self.run_timeout_secs {
            config.run_timeout_secs = secs;
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if self.preflight {
            config.preflight = true;
        }
    }
}

/// Result display wrapper
#[derive(Serialize)]
pub struct ResultDisplay {
    pub name: String,
    pub status: String,
    pub duration_ms: u64,
    pub steps: String,
    pub detail: String,
}

impl From<&ScenarioResult> for ResultDisplay {
    fn from(result: &ScenarioResult) -> Self {
        let status = match &result.outcome {
            Outcome::Passed if result.warnings.is_empty() => "passed".green().to_string(),
            Outcome::Passed => "passed (warnings)".yellow().to_string(),
            Outcome::Failed { .. } => "failed".red().to_string(),
            Outcome::Skipped { .. } => "skipped".yellow().to_string(),
        };
        let passed = result
            .steps
            .iter()
            .filter(|s| s.status != StepStatus::Failed)
            .count();
        let detail = match &result.outcome {
            Outcome::Passed => result.warnings.join("; "),
            other => other.summary(),
        };

        Self {
            name: result.name.clone(),
            status,
            duration_ms: result.duration_ms,
            steps: format!("{}/{}", passed, result.steps.len()),
            detail,
        }
    }
}

impl TableDisplay for ResultDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Status", "Duration", "Steps", "Detail"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.status.clone(),
            format!("{} ms", self.duration_ms),
            self.steps.clone(),
            self.detail.clone(),
        ]
    }
}

fn print_summary(suite: &SuiteResult) {
    let line = format!(
        "{} passed, {} failed, {} skipped ({} ms)",
        suite.passed, suite.failed, suite.skipped, suite.duration_ms
    );
    if suite.success() {
        println!("{}", line.green().bold());
    } else {
        println!("{}", line.red().bold());
    }
}

/// Run the selected scenarios and return the process exit code
pub async fn execute(args: RunArgs, mut config: RunnerConfig, format: OutputFormat) -> Result<i32> {
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let scenarios = load_scenarios(&config.suites_dir)
        .with_context(|| format!("loading scenarios from {}", config.suites_dir.display()))?;
    let scenarios = select(scenarios, &args.select);
    if scenarios.is_empty() {
        print_warning("No scenarios matched");
        return Ok(0);
    }

    let runner = TestRunner::with_config(config);
    let suite = runner.run(scenarios).await?;

    if !args.no_write {
        if let Err(e) = runner.write_results(&suite) {
            print_error(&format!("Failed to write results: {}", e));
        }
    }

    match format {
        OutputFormat::Json | OutputFormat::Yaml => print_value(&suite, format),
        OutputFormat::Table | OutputFormat::Plain => {
            let rows: Vec<ResultDisplay> = suite.results.iter().map(ResultDisplay::from).collect();
            print_list(&rows, format);
            print_summary(&suite);
        }
    }

    info!("Run {} finished with exit code {}", suite.run_id, suite.exit_code());
    Ok(suite.exit_code())
}
