//! Declarative YAML scenario format

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::config::MismatchPolicy;
use crate::error::{E2eError, E2eResult};

/// A single named scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name within a suite
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Absolute URL or rooted path resolved against the base URL.
    /// Empty inside a suite file means "inherit the suite target".
    #[serde(default)]
    pub target: String,

    /// Whether the scenario drives a browser page or only the HTTP client
    #[serde(default)]
    pub mode: Option<ScenarioMode>,

    /// Viewport override for the browser
    #[serde(default)]
    pub viewport: Option<Viewport>,

    /// Per-scenario override of the content mismatch policy
    #[serde(default)]
    pub content_policy: Option<MismatchPolicy>,

    /// Fixture actions; a failure here skips the scenario
    #[serde(default)]
    pub setup: Vec<Step>,

    /// Steps to execute in order
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioMode {
    /// Launch a browser and open the target before setup
    #[default]
    Page,
    /// HTTP only, no browser is launched
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport { width: 1280, height: 720 }
    }
}

/// A file holding several scenarios that share tags, a target and setup
#[derive(Debug, Clone, Deserialize)]
struct SuiteFile {
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    mode: Option<ScenarioMode>,
    #[serde(default)]
    setup: Vec<Step>,
    scenarios: Vec<Scenario>,
}

/// A single step in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a URL (absolute, or rooted path relative to base)
    Navigate { url: String },

    /// Go back in history
    GoBack,

    /// Reload the current page
    Reload,

    /// Click an element
    Click {
        selector: String,
        #[serde(default)]
        index: Option<i64>,
    },

    /// Fill an input field
    Fill {
        selector: String,
        text: String,
        #[serde(default)]
        index: Option<i64>,
    },

    /// Type text with the keyboard, optionally into a focused element
    Type {
        text: String,
        #[serde(default)]
        selector: Option<String>,
    },

    /// Press a key or chord such as `Control+A`
    Press {
        key: String,
        #[serde(default)]
        selector: Option<String>,
    },

    /// Select an option from a dropdown
    SelectOption { selector: String, value: String },

    /// Resize the page viewport
    SetViewport { width: u32, height: u32 },

    /// Wait for an element to reach a state
    WaitFor {
        selector: String,
        #[serde(default)]
        state: WaitState,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
    },

    AssertVisible {
        selector: String,
        #[serde(default)]
        index: Option<i64>,
    },

    AssertHidden { selector: String },

    AssertChecked {
        selector: String,
        #[serde(default)]
        index: Option<i64>,
    },

    /// Assert the text content of an element
    AssertText {
        selector: String,
        pattern: Pattern,
        #[serde(default)]
        index: Option<i64>,
    },

    AssertTitle { pattern: Pattern },

    AssertUrl { pattern: Pattern },

    /// Assert an attribute is present, and optionally matches
    AssertAttribute {
        selector: String,
        name: String,
        #[serde(default)]
        pattern: Option<Pattern>,
        #[serde(default)]
        index: Option<i64>,
    },

    /// Assert how many elements match a selector
    AssertCount {
        selector: String,
        #[serde(default)]
        exactly: Option<usize>,
        #[serde(default)]
        at_least: Option<usize>,
        #[serde(default)]
        at_most: Option<usize>,
    },

    /// Every match must satisfy the pattern (attribute value, or text when no attribute)
    AssertEach {
        selector: String,
        #[serde(default)]
        attribute: Option<String>,
        pattern: Pattern,
    },

    /// Headings never skip a level going down the page
    AssertHeadingOrder {
        #[serde(default = "default_heading_selector")]
        selector: String,
    },

    /// Click each matching link, check the URL followed it, then go back
    VisitLinks {
        selector: String,
        #[serde(default)]
        href_prefix: Option<String>,
    },

    /// Send an HTTP request; the response is kept for later assertions
    HttpRequest {
        #[serde(default)]
        method: HttpMethod,
        /// Defaults to the scenario target
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default)]
        body: Option<serde_json::Value>,
        /// Send this many identical requests concurrently
        #[serde(default)]
        repeat: Option<usize>,
        /// Repeat a string field of `body` to build a large payload
        #[serde(default)]
        body_repeat: Option<BodyRepeat>,
    },

    AssertStatus { code: u16 },

    /// Assert the last response status is 2xx
    AssertStatusOk,

    AssertHeader {
        name: String,
        #[serde(default)]
        pattern: Option<Pattern>,
    },

    /// Assert a field of the last JSON response body
    AssertJsonField { path: String, matcher: JsonMatcher },

    /// Run `then` only when the predicate holds
    Conditional { when: Predicate, then: Vec<Step> },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep { ms: u64 },

    /// Log a message
    Log { message: String },
}

fn default_wait_timeout() -> u64 {
    5000
}

fn default_heading_selector() -> String {
    "h1, h2, h3, h4, h5, h6".to_string()
}

/// `field` is a dotted path to a string in the request body, sent `times` times over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyRepeat {
    pub field: String,
    pub times: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    #[default]
    #[serde(rename = "GET", alias = "get")]
    Get,
    #[serde(rename = "POST", alias = "post")]
    Post,
    #[serde(rename = "PUT", alias = "put")]
    Put,
    #[serde(rename = "PATCH", alias = "patch")]
    Patch,
    #[serde(rename = "DELETE", alias = "delete")]
    Delete,
    #[serde(rename = "HEAD", alias = "head")]
    Head,
    #[serde(rename = "OPTIONS", alias = "options")]
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

/// Text matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    Equals(String),
    NotEquals(String),
    Contains(String),
    Regex(String),
}

impl Pattern {
    pub fn matches(&self, text: &str) -> E2eResult<bool> {
        Ok(match self {
            Pattern::Equals(expected) => text == expected,
            Pattern::NotEquals(expected) => text != expected,
            Pattern::Contains(needle) => text.contains(needle.as_str()),
            Pattern::Regex(re) => Regex::new(re)?.is_match(text),
        })
    }

    /// Human-readable form used in mismatch messages
    pub fn describe(&self) -> String {
        match self {
            Pattern::Equals(s) => format!("equal to {:?}", s),
            Pattern::NotEquals(s) => format!("not equal to {:?}", s),
            Pattern::Contains(s) => format!("containing {:?}", s),
            Pattern::Regex(re) => format!("matching /{}/", re),
        }
    }

    fn validate(&self) -> E2eResult<()> {
        if let Pattern::Regex(re) = self {
            Regex::new(re)?;
        }
        Ok(())
    }
}

/// Matcher for a field of a JSON response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonMatcher {
    Exists,
    Equals(serde_json::Value),
    Type(JsonType),
    Matches(Pattern),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonType {
    String,
    Number,
    Bool,
    Object,
    Array,
    Null,
}

impl JsonType {
    pub fn of(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::String(_) => JsonType::String,
            Value::Number(_) => JsonType::Number,
            Value::Bool(_) => JsonType::Bool,
            Value::Object(_) => JsonType::Object,
            Value::Array(_) => JsonType::Array,
            Value::Null => JsonType::Null,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Bool => "bool",
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::Null => "null",
        }
    }
}

/// Condition for a `conditional` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// First match is visible
    Visible(String),
    /// At least one element matches
    Exists(String),
    /// At least `n` elements match
    CountAtLeast { selector: String, n: usize },
    /// Current URL matches
    UrlMatches(Pattern),
}

impl Step {
    /// Short label used in logs and reports
    pub fn name(&self) -> String {
        match self {
            Step::Navigate { url } => format!("navigate:{}", url),
            Step::GoBack => "go_back".to_string(),
            Step::Reload => "reload".to_string(),
            Step::Click { selector, .. } => format!("click:{}", selector),
            Step::Fill { selector, .. } => format!("fill:{}", selector),
            Step::Type { text, .. } => format!("type:{}", truncate(text, 30)),
            Step::Press { key, .. } => format!("press:{}", key),
            Step::SelectOption { selector, .. } => format!("select_option:{}", selector),
            Step::SetViewport { width, height } => format!("set_viewport:{}x{}", width, height),
            Step::WaitFor { selector, .. } => format!("wait_for:{}", selector),
            Step::AssertVisible { selector, .. } => format!("assert_visible:{}", selector),
            Step::AssertHidden { selector } => format!("assert_hidden:{}", selector),
            Step::AssertChecked { selector, .. } => format!("assert_checked:{}", selector),
            Step::AssertText { selector, .. } => format!("assert_text:{}", selector),
            Step::AssertTitle { .. } => "assert_title".to_string(),
            Step::AssertUrl { .. } => "assert_url".to_string(),
            Step::AssertAttribute { selector, name, .. } => {
                format!("assert_attribute:{}[{}]", selector, name)
            }
            Step::AssertCount { selector, .. } => format!("assert_count:{}", selector),
            Step::AssertEach { selector, .. } => format!("assert_each:{}", selector),
            Step::AssertHeadingOrder { .. } => "assert_heading_order".to_string(),
            Step::VisitLinks { selector, .. } => format!("visit_links:{}", selector),
            Step::HttpRequest { method, url, .. } => format!(
                "http:{} {}",
                method.as_str(),
                url.as_deref().unwrap_or("<target>")
            ),
            Step::AssertStatus { code } => format!("assert_status:{}", code),
            Step::AssertStatusOk => "assert_status_ok".to_string(),
            Step::AssertHeader { name, .. } => format!("assert_header:{}", name),
            Step::AssertJsonField { path, .. } => format!("assert_json_field:{}", path),
            Step::Conditional { .. } => "conditional".to_string(),
            Step::Sleep { ms } => format!("sleep:{}ms", ms),
            Step::Log { message } => format!("log:{}", truncate(message, 30)),
        }
    }

    /// Content assertions follow the configured mismatch policy
    pub fn is_content_assertion(&self) -> bool {
        matches!(
            self,
            Step::AssertText { .. } | Step::AssertCount { .. } | Step::AssertEach { .. }
        )
    }

    fn validate(&self, base_url: &Url) -> E2eResult<()> {
        match self {
            Step::Navigate { url } => {
                resolve_location(base_url, url)?;
            }
            Step::HttpRequest { url, repeat, body, body_repeat, .. } => {
                if let Some(url) = url {
                    resolve_location(base_url, url)?;
                }
                if *repeat == Some(0) {
                    return Err(E2eError::InvalidSuite("repeat must be at least 1".into()));
                }
                if let Some(body_repeat) = body_repeat {
                    if body_repeat.times == 0 {
                        return Err(E2eError::InvalidSuite(
                            "body_repeat.times must be at least 1".into(),
                        ));
                    }
                    let field = body
                        .as_ref()
                        .and_then(|body| crate::executor::json_path(body, &body_repeat.field));
                    if !matches!(field, Some(serde_json::Value::String(_))) {
                        return Err(E2eError::InvalidSuite(format!(
                            "body_repeat.field '{}' is not a string in the request body",
                            body_repeat.field
                        )));
                    }
                }
            }
            Step::AssertText { pattern, .. }
            | Step::AssertTitle { pattern }
            | Step::AssertUrl { pattern }
            | Step::AssertEach { pattern, .. } => pattern.validate()?,
            Step::AssertAttribute { pattern: Some(pattern), .. }
            | Step::AssertHeader { pattern: Some(pattern), .. } => pattern.validate()?,
            Step::AssertJsonField { matcher: JsonMatcher::Matches(pattern), .. } => {
                pattern.validate()?
            }
            Step::AssertCount { selector, exactly, at_least, at_most } => {
                if exactly.is_none() && at_least.is_none() && at_most.is_none() {
                    return Err(E2eError::InvalidSuite(format!(
                        "assert_count on '{}' needs exactly, at_least or at_most",
                        selector
                    )));
                }
            }
            Step::Conditional { when, then } => {
                if let Predicate::UrlMatches(pattern) = when {
                    pattern.validate()?;
                }
                for step in then {
                    step.validate(base_url)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Resolve an absolute http(s) URL, or a rooted path against `base`
pub fn resolve_location(base: &Url, location: &str) -> E2eResult<Url> {
    if location.starts_with('/') {
        let joined = format!("{}{}", base.as_str().trim_end_matches('/'), location);
        return Url::parse(&joined)
            .map_err(|e| E2eError::InvalidSuite(format!("bad location '{}': {}", location, e)));
    }

    match Url::parse(location) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(url),
        Ok(url) => Err(E2eError::InvalidSuite(format!(
            "unsupported scheme '{}' in '{}'",
            url.scheme(),
            location
        ))),
        Err(_) => Err(E2eError::InvalidSuite(format!(
            "location '{}' is neither an absolute URL nor a rooted path",
            location
        ))),
    }
}

impl Scenario {
    /// Parse a single scenario from YAML
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a YAML document holding one scenario or a `scenarios:` suite
    pub fn parse_document(yaml: &str) -> E2eResult<Vec<Self>> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let is_suite = value
            .as_mapping()
            .map(|m| m.contains_key("scenarios"))
            .unwrap_or(false);

        if !is_suite {
            return Ok(vec![serde_yaml::from_value(value)?]);
        }

        let suite: SuiteFile = serde_yaml::from_value(value)?;
        let scenarios = suite
            .scenarios
            .into_iter()
            .map(|mut scenario| {
                if scenario.target.is_empty() {
                    if let Some(target) = &suite.target {
                        scenario.target = target.clone();
                    }
                }
                if scenario.mode.is_none() {
                    scenario.mode = suite.mode;
                }
                for tag in &suite.tags {
                    if !scenario.tags.contains(tag) {
                        scenario.tags.push(tag.clone());
                    }
                }
                let mut setup = suite.setup.clone();
                setup.append(&mut scenario.setup);
                scenario.setup = setup;
                scenario
            })
            .collect();
        Ok(scenarios)
    }

    /// Parse all scenarios from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Vec<Self>> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_document(&content).map_err(|e| {
            E2eError::SpecParse(format!("{}: {}", path.display(), e))
        })
    }

    /// Load all scenarios from a directory, in path order
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        if !dir.is_dir() {
            return Err(E2eError::SpecParse(format!(
                "suites directory {} does not exist",
                dir.display()
            )));
        }

        let mut scenarios = Vec::new();
        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                E2eError::SpecParse(format!("reading {}: {}", dir.display(), e))
            })?;
            let is_yaml = entry
                .path()
                .extension()
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false);
            if is_yaml && entry.file_type().is_file() {
                scenarios.extend(Self::from_file(entry.path())?);
            }
        }

        Ok(scenarios)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag(scenarios: Vec<Self>, tag: &str) -> Vec<Self> {
        scenarios
            .into_iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    pub fn mode(&self) -> ScenarioMode {
        self.mode.unwrap_or_default()
    }

    /// Resolved target URL
    pub fn target_url(&self, base_url: &Url) -> E2eResult<Url> {
        resolve_location(base_url, &self.target)
    }
}

/// Check suite-level constraints before anything runs
pub fn validate_suite(scenarios: &[Scenario], base_url: &Url) -> E2eResult<()> {
    let mut seen = HashSet::new();

    for scenario in scenarios {
        if scenario.name.trim().is_empty() {
            return Err(E2eError::InvalidSuite("scenario with empty name".into()));
        }
        if !seen.insert(scenario.name.as_str()) {
            return Err(E2eError::InvalidSuite(format!(
                "duplicate scenario name '{}'",
                scenario.name
            )));
        }
        if scenario.target.is_empty() {
            return Err(E2eError::InvalidSuite(format!(
                "scenario '{}' has no target",
                scenario.name
            )));
        }
        scenario.target_url(base_url).map_err(|e| {
            E2eError::InvalidSuite(format!("scenario '{}': {}", scenario.name, e))
        })?;
        for step in scenario.setup.iter().chain(scenario.steps.iter()) {
            step.validate(base_url).map_err(|e| {
                E2eError::InvalidSuite(format!(
                    "scenario '{}', step {}: {}",
                    scenario.name,
                    step.name(),
                    e
                ))
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://biomejs.dev").unwrap()
    }

    #[test]
    fn test_parse_simple_scenario() {
        let yaml = r#"
name: home-title
target: /
tags:
  - smoke
steps:
  - action: assert_title
    pattern:
      regex: Biome
  - action: assert_visible
    selector: .hero-section
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.name, "home-title");
        assert_eq!(scenario.mode(), ScenarioMode::Page);
        assert_eq!(scenario.steps.len(), 2);
        assert_eq!(
            scenario.steps[0],
            Step::AssertTitle { pattern: Pattern::Regex("Biome".into()) }
        );
    }

    #[test]
    fn test_parse_suite_inherits_target_tags_and_setup() {
        let yaml = r#"
tags: [blog]
target: /blog/
setup:
  - action: wait_for
    selector: main
scenarios:
  - name: blog-index
    steps:
      - action: assert_title
        pattern: { contains: Blog }
  - name: blog-api
    target: /api/version
    mode: api
    tags: [api]
    setup:
      - action: log
        message: hi
    steps:
      - action: http_request
      - action: assert_json_field
        path: version
        matcher: { type: string }
"#;
        let scenarios = Scenario::parse_document(yaml).unwrap();
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].target, "/blog/");
        assert_eq!(scenarios[0].tags, vec!["blog".to_string()]);
        assert_eq!(scenarios[0].setup.len(), 1);
        assert_eq!(scenarios[1].target, "/api/version");
        assert_eq!(scenarios[1].mode(), ScenarioMode::Api);
        assert_eq!(scenarios[1].tags, vec!["api".to_string(), "blog".to_string()]);
        assert_eq!(scenarios[1].setup.len(), 2);
        assert!(matches!(scenarios[1].setup[0], Step::WaitFor { .. }));
    }

    #[test]
    fn test_parse_http_and_conditional_steps() {
        let yaml = r#"
name: mixed
target: /
steps:
  - action: http_request
    method: post
    url: /api/format
    headers:
      Origin: https://example.com
    body:
      code: "const x = 1"
      syntax: invalid
  - action: assert_status
    code: 400
  - action: assert_json_field
    path: error
    matcher:
      matches: { regex: "(?i)invalid syntax" }
  - action: conditional
    when: { visible: .pagination }
    then:
      - action: click
        selector: .pagination a
        index: 0
  - action: go_back
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        match &scenario.steps[0] {
            Step::HttpRequest { method, headers, body, .. } => {
                assert_eq!(*method, HttpMethod::Post);
                assert_eq!(headers.get("Origin").unwrap(), "https://example.com");
                assert_eq!(body.as_ref().unwrap()["syntax"], "invalid");
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert!(matches!(scenario.steps[3], Step::Conditional { .. }));
        assert_eq!(scenario.steps[4], Step::GoBack);
    }

    #[test]
    fn test_pattern_matching() {
        assert!(Pattern::Regex("Biome".into()).matches("Biome — Toolchain").unwrap());
        assert!(Pattern::Contains("Tool".into()).matches("Biome — Toolchain").unwrap());
        assert!(!Pattern::Equals("Biome".into()).matches("Biome — Toolchain").unwrap());
        assert!(Pattern::NotEquals("a".into()).matches("b").unwrap());
        assert!(Pattern::Regex("(".into()).matches("x").is_err());
        assert_eq!(Pattern::Regex("404".into()).describe(), "matching /404/");
    }

    #[test]
    fn test_resolve_location() {
        let base = Url::parse("https://biomejs.dev/").unwrap();
        assert_eq!(
            resolve_location(&base, "/blog/").unwrap().as_str(),
            "https://biomejs.dev/blog/"
        );
        assert_eq!(
            resolve_location(&base, "https://example.com/x").unwrap().as_str(),
            "https://example.com/x"
        );
        assert!(resolve_location(&base, "blog").is_err());
        assert!(resolve_location(&base, "ftp://example.com").is_err());
    }

    #[test]
    fn test_resolve_location_keeps_base_prefix() {
        let base = Url::parse("http://127.0.0.1:8080/docs").unwrap();
        assert_eq!(
            resolve_location(&base, "/intro").unwrap().as_str(),
            "http://127.0.0.1:8080/docs/intro"
        );
    }

    #[test]
    fn test_validate_rejects_duplicates_and_bad_targets() {
        let mut a = Scenario::from_yaml("name: a\ntarget: /\nsteps: []\n").unwrap();
        let b = a.clone();
        assert!(matches!(
            validate_suite(&[a.clone(), b], &base()),
            Err(E2eError::InvalidSuite(_))
        ));

        a.target = "relative/path".into();
        assert!(validate_suite(&[a], &base()).is_err());
    }

    #[test]
    fn test_validate_checks_nested_patterns_and_counts() {
        let yaml = r#"
name: nested
target: /
steps:
  - action: conditional
    when: { exists: nav }
    then:
      - action: assert_url
        pattern: { regex: "(" }
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert!(validate_suite(&[scenario], &base()).is_err());

        let yaml = "name: c\ntarget: /\nsteps:\n  - action: assert_count\n    selector: nav a\n";
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert!(validate_suite(&[scenario], &base()).is_err());
    }

    #[test]
    fn test_load_all_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), "name: second\ntarget: /\nsteps: []\n").unwrap();
        std::fs::write(dir.path().join("a.yml"), "name: first\ntarget: /\nsteps: []\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let scenarios = Scenario::load_all(dir.path()).unwrap();
        let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_load_all_missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("suitse");

        match Scenario::load_all(&missing) {
            Err(E2eError::SpecParse(message)) => assert!(message.contains("does not exist")),
            other => panic!("expected a parse error, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn test_load_all_reports_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "name: [unclosed\n").unwrap();
        assert!(Scenario::load_all(dir.path()).is_err());
    }

    #[test]
    fn test_parse_heading_order_default_selector() {
        let scenario =
            Scenario::from_yaml("name: h\ntarget: /\nsteps:\n  - action: assert_heading_order\n")
                .unwrap();
        assert_eq!(
            scenario.steps[0],
            Step::AssertHeadingOrder { selector: "h1, h2, h3, h4, h5, h6".into() }
        );
        assert!(!scenario.steps[0].is_content_assertion());
    }

    #[test]
    fn test_validate_body_repeat() {
        let yaml = r#"
name: large
target: /api/format
mode: api
steps:
  - action: http_request
    method: POST
    body: { code: "x\n", syntax: js }
    body_repeat: { field: code, times: 1000 }
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        validate_suite(&[scenario.clone()], &base()).unwrap();

        let mut bad = scenario;
        if let Step::HttpRequest { body_repeat: Some(repeat), .. } = &mut bad.steps[0] {
            repeat.field = "syntax.missing".into();
        }
        assert!(matches!(
            validate_suite(&[bad], &base()),
            Err(E2eError::InvalidSuite(message)) if message.contains("body_repeat.field")
        ));
    }

    #[test]
    fn test_step_names() {
        assert_eq!(Step::AssertStatus { code: 404 }.name(), "assert_status:404");
        assert!(Step::AssertCount {
            selector: "a".into(),
            exactly: Some(1),
            at_least: None,
            at_most: None
        }
        .is_content_assertion());
        assert!(!Step::AssertStatusOk.is_content_assertion());
    }
}
