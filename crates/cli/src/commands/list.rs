//! `sitecheck list`

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use sitecheck_e2e::{RunnerConfig, Scenario, ScenarioMode};

use super::{load_scenarios, select, SelectArgs};
use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[command(flatten)]
    pub select: SelectArgs,
}

/// Scenario display wrapper
#[derive(Serialize)]
pub struct ScenarioDisplay {
    pub name: String,
    pub mode: String,
    pub target: String,
    pub tags: Vec<String>,
    pub setup: usize,
    pub steps: usize,
}

impl From<&Scenario> for ScenarioDisplay {
    fn from(scenario: &Scenario) -> Self {
        let mode = match scenario.mode() {
            ScenarioMode::Page => "page",
            ScenarioMode::Api => "api",
        };
        Self {
            name: scenario.name.clone(),
            mode: mode.to_string(),
            target: scenario.target.clone(),
            tags: scenario.tags.clone(),
            setup: scenario.setup.len(),
            steps: scenario.steps.len(),
        }
    }
}

impl TableDisplay for ScenarioDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Mode", "Target", "Tags", "Setup", "Steps"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.mode.clone(),
            self.target.clone(),
            self.tags.join(", "),
            self.setup.to_string(),
            self.steps.to_string(),
        ]
    }
}

pub fn execute(args: ListArgs, config: &RunnerConfig, format: OutputFormat) -> Result<()> {
    let dir = args.select.suites.clone().unwrap_or_else(|| config.suites_dir.clone());
    let scenarios = load_scenarios(&dir)
        .with_context(|| format!("loading scenarios from {}", dir.display()))?;
    let displays: Vec<ScenarioDisplay> = select(scenarios, &args.select)
        .iter()
        .map(ScenarioDisplay::from)
        .collect();
    print_list(&displays, format);
    Ok(())
}
