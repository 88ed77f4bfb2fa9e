//! sitecheck scenario runner
//!
//! Runs declarative YAML scenarios against a live website:
//! - Parses scenarios (page or API mode) with setup fixtures and steps
//! - Drives a Playwright browser over a line-delimited JSON protocol
//! - Issues HTTP requests through reqwest with a per-session cookie jar
//! - Collects one result per scenario, in submission order
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TestRunner                             │
//! │    ├── validate_suite(scenarios, base_url)                  │
//! │    ├── preflight (optional) -> unreachable = all Skipped    │
//! │    └── buffered(workers) ── supervise(scenario, deadline)   │
//! │                                └── run_scenario             │
//! │                                      ├── Session::acquire   │
//! │                                      ├── setup  -> Skipped  │
//! │                                      ├── steps  -> Failed   │
//! │                                      └── Session::release   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Session                                                    │
//! │    ├── Box<dyn Browser>     (PlaywrightBrowser, lazy)       │
//! │    └── Arc<dyn HttpClient>  (ReqwestClient)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod playwright;
pub mod preflight;
pub mod report;
pub mod runner;
pub mod session;
pub mod spec;

pub use config::{MismatchPolicy, RunnerConfig};
pub use error::{E2eError, E2eResult, FailureKind};
pub use report::{Outcome, ScenarioResult, ScenarioState, StepOutcome, StepStatus, SuiteResult};
pub use runner::{LiveSessionFactory, TestRunner};
pub use session::{Browser, ElementHandle, HttpClient, HttpResponse, Session, SessionFactory};
pub use spec::{validate_suite, Scenario, ScenarioMode, Step, Viewport};
