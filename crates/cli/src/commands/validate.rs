//! `sitecheck validate`

use anyhow::{Context, Result};
use clap::Args;
use sitecheck_e2e::{validate_suite, RunnerConfig};

use super::{load_scenarios, select, SelectArgs};
use crate::output::print_success;

#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Base URL used to resolve rooted targets
    #[arg(long, env = "SITECHECK_BASE_URL")]
    pub base_url: Option<String>,
}

/// Parse and check scenarios without running them
pub fn execute(args: ValidateArgs, mut config: RunnerConfig) -> Result<()> {
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    let base_url = config.base_url()?;
    let dir = args.select.suites.clone().unwrap_or_else(|| config.suites_dir.clone());

    let scenarios = load_scenarios(&dir)
        .with_context(|| format!("loading scenarios from {}", dir.display()))?;
    let scenarios = select(scenarios, &args.select);
    validate_suite(&scenarios, &base_url)?;

    print_success(&format!(
        "{} scenario(s) in {} are valid",
        scenarios.len(),
        dir.display()
    ));
    Ok(())
}
