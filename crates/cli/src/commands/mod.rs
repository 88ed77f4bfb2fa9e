//! CLI Commands

pub mod list;
pub mod run;
pub mod validate;

use std::path::Path;

use clap::Args;
use sitecheck_e2e::{E2eResult, Scenario};

/// Scenario selection shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct SelectArgs {
    /// Scenario file or directory (defaults to `suites_dir` from the config)
    #[arg(long, env = "SITECHECK_SUITES")]
    pub suites: Option<std::path::PathBuf>,

    /// Only scenarios carrying this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Only scenarios with these names (repeatable)
    #[arg(short, long)]
    pub name: Vec<String>,
}

/// Load scenarios from a single file or a directory tree
pub fn load_scenarios(path: &Path) -> E2eResult<Vec<Scenario>> {
    if path.is_file() {
        Scenario::from_file(path)
    } else {
        Scenario::load_all(path)
    }
}

/// Apply tag and name filters, keeping load order
pub fn select(scenarios: Vec<Scenario>, args: &SelectArgs) -> Vec<Scenario> {
    let scenarios = match &args.tag {
        Some(tag) => Scenario::filter_by_tag(scenarios, tag),
        None => scenarios,
    };
    if args.name.is_empty() {
        return scenarios;
    }
    scenarios
        .into_iter()
        .filter(|s| args.name.contains(&s.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = r#"
tags: [smoke]
target: /
scenarios:
  - name: home-title
    tags: [homepage]
    steps:
      - action: assert_title
        pattern: { regex: Biome }
  - name: docs-nav
    target: /guides/getting-started
    steps:
      - action: assert_visible
        selector: nav
"#;

    #[test]
    fn test_load_and_select() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.yaml");
        std::fs::write(&path, SUITE).unwrap();

        let from_file = load_scenarios(&path).unwrap();
        let from_dir = load_scenarios(dir.path()).unwrap();
        assert_eq!(from_file.len(), 2);
        assert_eq!(from_dir.len(), 2);

        let args = SelectArgs { tag: Some("homepage".into()), ..Default::default() };
        let picked = select(from_file.clone(), &args);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name, "home-title");

        let args = SelectArgs { name: vec!["docs-nav".into()], ..Default::default() };
        assert_eq!(select(from_file.clone(), &args)[0].name, "docs-nav");

        let args = SelectArgs { tag: Some("smoke".into()), ..Default::default() };
        assert_eq!(select(from_file, &args).len(), 2);
    }

    #[test]
    fn test_mistyped_suites_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_scenarios(&dir.path().join("suits")).is_err());
    }
}
