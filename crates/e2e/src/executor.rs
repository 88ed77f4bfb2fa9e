//! Step execution against a live session
//!
//! Page assertions are evaluated until they hold or the assertion window
//! closes, the way a `waitFor(condition, timeout)` would. HTTP assertions
//! read the last recorded response once. A step that fails is never run
//! again.

use std::time::{Duration, Instant};

use futures::future::{join_all, BoxFuture, FutureExt};
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::MismatchPolicy;
use crate::error::{E2eError, E2eResult, FailureKind};
use crate::session::{Browser, ElementHandle, Session};
use crate::spec::{
    resolve_location, BodyRepeat, JsonMatcher, JsonType, Pattern, Predicate, Step, WaitState,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-scenario inputs the executor needs besides the session
#[derive(Debug, Clone)]
pub struct StepContext {
    pub base_url: Url,
    pub target: Url,
    /// Window in which a page assertion may become true
    pub assert_timeout: Duration,
    pub content_policy: MismatchPolicy,
}

impl StepContext {
    /// Whether `error` raised by `step` is recorded as a warning instead of failing
    pub fn softens(&self, step: &Step, error: &E2eError) -> bool {
        self.content_policy == MismatchPolicy::Warn
            && step.is_content_assertion()
            && error.kind() == FailureKind::Assertion
    }
}

/// Execute one step. `Conditional` recurses into its branch.
pub fn execute_step<'a>(
    session: &'a mut Session,
    step: &'a Step,
    ctx: &'a StepContext,
) -> BoxFuture<'a, E2eResult<()>> {
    async move {
        debug!("Executing step: {}", step.name());

        match step {
            Step::HttpRequest { method, url, headers, body, repeat, body_repeat } => {
                let url = match url {
                    Some(url) => resolve_location(&ctx.base_url, url)?,
                    None => ctx.target.clone(),
                };
                let body = match (body, body_repeat) {
                    (Some(body), Some(expand)) => Some(expand_body(body, expand)?),
                    (body, _) => body.clone(),
                };
                let http = session.http();
                let repeat = repeat.unwrap_or(1).max(1);

                let requests = (0..repeat)
                    .map(|_| http.request(*method, url.as_str(), headers, body.as_ref()));
                let mut last = None;
                for response in join_all(requests).await {
                    last = Some(response?);
                }
                if let Some(response) = last {
                    debug!("{} {} -> {}", method.as_str(), url, response.status);
                    session.set_last_response(response);
                }
                Ok(())
            }
            Step::AssertStatus { code } => {
                let status = session.last_response()?.status;
                if status != *code {
                    return Err(E2eError::assertion(format!(
                        "expected status {}, got {}",
                        code, status
                    )));
                }
                Ok(())
            }
            Step::AssertStatusOk => {
                let status = session.last_response()?.status;
                if !(200..300).contains(&status) {
                    return Err(E2eError::assertion(format!(
                        "expected a 2xx status, got {}",
                        status
                    )));
                }
                Ok(())
            }
            Step::AssertHeader { name, pattern } => {
                let response = session.last_response()?;
                let value = response.header(name).ok_or_else(|| {
                    E2eError::assertion(format!("expected header '{}' to be present", name))
                })?;
                expect_pattern(&format!("header '{}'", name), value, pattern.as_ref())
            }
            Step::AssertJsonField { path, matcher } => {
                let body = session.last_response()?.json()?;
                check_json_field(&body, path, matcher)
            }
            Step::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
            Step::Log { message } => {
                info!("[SCENARIO LOG] {}", message);
                Ok(())
            }
            Step::Conditional { when, then } => {
                let holds = {
                    let browser = session.browser().await?;
                    evaluate_predicate(browser, when).await?
                };
                if !holds {
                    debug!("Condition not met, skipping {} step(s)", then.len());
                    return Ok(());
                }
                for (i, nested) in then.iter().enumerate() {
                    match execute_step(session, nested, ctx).await {
                        Ok(()) => {}
                        Err(e) if ctx.softens(nested, &e) => {
                            let reason = nest_error(e, i, nested).reason();
                            warn!("{}", reason);
                            session.record_warning(reason);
                        }
                        Err(e) => return Err(nest_error(e, i, nested)),
                    }
                }
                Ok(())
            }
            page_step => {
                let browser = session.browser().await?;
                execute_page_step(browser, page_step, ctx).await
            }
        }
    }
    .boxed()
}

async fn execute_page_step(
    browser: &mut dyn Browser,
    step: &Step,
    ctx: &StepContext,
) -> E2eResult<()> {
    match step {
        Step::Navigate { url } => {
            let url = resolve_location(&ctx.base_url, url)?;
            browser.navigate(url.as_str()).await
        }
        Step::GoBack => browser.go_back().await,
        Step::Reload => browser.reload().await,
        Step::Click { selector, index } => {
            let element = resolve_element(browser, selector, *index).await?;
            browser.click(&element).await
        }
        Step::Fill { selector, text, index } => {
            let element = resolve_element(browser, selector, *index).await?;
            browser.fill(&element, text).await
        }
        Step::Type { text, selector } => {
            if let Some(selector) = selector {
                let element = resolve_element(browser, selector, None).await?;
                browser.click(&element).await?;
            }
            browser.type_text(text).await
        }
        Step::Press { key, selector } => match selector {
            Some(selector) => {
                let element = resolve_element(browser, selector, None).await?;
                browser.press(Some(&element), key).await
            }
            None => browser.press(None, key).await,
        },
        Step::SelectOption { selector, value } => {
            let element = resolve_element(browser, selector, None).await?;
            browser.select_option(&element, value).await
        }
        Step::SetViewport { width, height } => {
            browser
                .set_viewport(crate::spec::Viewport { width: *width, height: *height })
                .await
        }
        Step::WaitFor { selector, state, timeout_ms } => browser
            .wait_for(selector, *state, Duration::from_millis(*timeout_ms))
            .await
            .map_err(|e| match e {
                E2eError::Timeout { .. } => E2eError::Timeout {
                    what: format!("'{}' to be {}", selector, state.as_str()),
                    ms: *timeout_ms,
                },
                other => other,
            }),
        Step::AssertVisible { selector, index: None } => {
            wait_for_assertion(browser, selector, WaitState::Visible, ctx.assert_timeout).await
        }
        Step::AssertHidden { selector } => {
            wait_for_assertion(browser, selector, WaitState::Hidden, ctx.assert_timeout).await
        }
        Step::VisitLinks { selector, href_prefix } => {
            visit_links(browser, selector, href_prefix.as_deref(), ctx.assert_timeout).await
        }
        assertion => {
            let deadline = Instant::now() + ctx.assert_timeout;
            loop {
                match check_page_assertion(browser, assertion).await {
                    Err(e) if is_mismatch(&e) && Instant::now() < deadline => {
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                    other => return other,
                }
            }
        }
    }
}

/// Evaluate a page assertion once
async fn check_page_assertion(browser: &mut dyn Browser, step: &Step) -> E2eResult<()> {
    match step {
        Step::AssertVisible { selector, index } => {
            let element = resolve_element(browser, selector, *index).await?;
            if !browser.is_visible(&element).await? {
                return Err(E2eError::assertion(format!(
                    "expected '{}' to be visible",
                    element
                )));
            }
            Ok(())
        }
        Step::AssertChecked { selector, index } => {
            let element = resolve_element(browser, selector, *index).await?;
            if !browser.is_checked(&element).await? {
                return Err(E2eError::assertion(format!(
                    "expected '{}' to be checked",
                    element
                )));
            }
            Ok(())
        }
        Step::AssertText { selector, pattern, index } => {
            let element = resolve_element(browser, selector, *index).await?;
            let text = browser.text_content(&element).await?.unwrap_or_default();
            expect_pattern(&format!("text of '{}'", selector), text.trim(), Some(pattern))
        }
        Step::AssertTitle { pattern } => {
            let title = browser.title().await?;
            expect_pattern("page title", &title, Some(pattern))
        }
        Step::AssertUrl { pattern } => {
            let url = browser.current_url().await?;
            expect_pattern("page URL", &url, Some(pattern))
        }
        Step::AssertAttribute { selector, name, pattern, index } => {
            let element = resolve_element(browser, selector, *index).await?;
            let value = browser.attribute(&element, name).await?.ok_or_else(|| {
                E2eError::assertion(format!(
                    "expected '{}' to have attribute '{}'",
                    selector, name
                ))
            })?;
            expect_pattern(
                &format!("attribute '{}' of '{}'", name, selector),
                &value,
                pattern.as_ref(),
            )
        }
        Step::AssertCount { selector, exactly, at_least, at_most } => {
            let count = browser.count(selector).await?;
            check_count(selector, count, *exactly, *at_least, *at_most)
        }
        Step::AssertEach { selector, attribute, pattern } => {
            for element in browser.find(selector).await? {
                let value = match attribute {
                    Some(name) => browser.attribute(&element, name).await?,
                    None => browser.text_content(&element).await?,
                };
                let value = value.unwrap_or_default();
                let what = match attribute {
                    Some(name) => format!("attribute '{}' of '{}'", name, element),
                    None => format!("text of '{}'", element),
                };
                expect_pattern(&what, value.trim(), Some(pattern))?;
            }
            Ok(())
        }
        Step::AssertHeadingOrder { selector } => {
            let mut previous = 1;
            for element in browser.find(selector).await? {
                let tag = browser.tag_name(&element).await?;
                let level = heading_level(&tag).ok_or_else(|| {
                    E2eError::assertion(format!("'{}' is a <{}>, not a heading", element, tag))
                })?;
                if level > previous + 1 {
                    return Err(E2eError::assertion(format!(
                        "heading '{}' skips from h{} to h{}",
                        element, previous, level
                    )));
                }
                previous = level;
            }
            Ok(())
        }
        other => Err(E2eError::InvalidSuite(format!(
            "step {} is not a page assertion",
            other.name()
        ))),
    }
}

fn heading_level(tag: &str) -> Option<u32> {
    tag.strip_prefix('h')
        .and_then(|n| n.parse().ok())
        .filter(|n| (1..=6).contains(n))
}

/// Copy of `body` with the string at `expand.field` repeated `expand.times` times
fn expand_body(body: &Value, expand: &BodyRepeat) -> E2eResult<Value> {
    let mut body = body.clone();
    let field = expand
        .field
        .split('.')
        .try_fold(&mut body, |current, segment| match current {
            Value::Object(map) => map.get_mut(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        });
    match field {
        Some(Value::String(text)) => {
            *text = text.repeat(expand.times);
            Ok(body)
        }
        _ => Err(E2eError::InvalidSuite(format!(
            "body_repeat.field '{}' is not a string in the request body",
            expand.field
        ))),
    }
}

fn is_mismatch(e: &E2eError) -> bool {
    matches!(e, E2eError::AssertionFailed(_) | E2eError::NotFound(_))
}

async fn wait_for_assertion(
    browser: &mut dyn Browser,
    selector: &str,
    state: WaitState,
    timeout: Duration,
) -> E2eResult<()> {
    match browser.wait_for(selector, state, timeout).await {
        Err(E2eError::Timeout { .. }) => Err(E2eError::assertion(format!(
            "expected '{}' to be {} within {} ms",
            selector,
            state.as_str(),
            timeout.as_millis()
        ))),
        other => other,
    }
}

/// Resolve `index` (negative counts from the end) into a handle
async fn resolve_element(
    browser: &mut dyn Browser,
    selector: &str,
    index: Option<i64>,
) -> E2eResult<ElementHandle> {
    let count = browser.count(selector).await?;
    if count == 0 {
        return Err(E2eError::NotFound(selector.to_string()));
    }

    let requested = index.unwrap_or(0);
    let resolved = if requested < 0 {
        count as i64 + requested
    } else {
        requested
    };
    if resolved < 0 || resolved >= count as i64 {
        return Err(E2eError::NotFound(format!(
            "{} (index {} of {} matches)",
            selector, requested, count
        )));
    }

    Ok(ElementHandle::new(selector, resolved as usize))
}

async fn visit_links(
    browser: &mut dyn Browser,
    selector: &str,
    href_prefix: Option<&str>,
    assert_timeout: Duration,
) -> E2eResult<()> {
    let count = browser.count(selector).await?;
    let mut visited = 0;

    for i in 0..count {
        let link = ElementHandle::new(selector, i);
        let href = browser.attribute(&link, "href").await?.unwrap_or_default();
        if href.is_empty() {
            return Err(E2eError::assertion(format!("link '{}' has no href", link)));
        }
        if let Some(prefix) = href_prefix {
            if !href.starts_with(prefix) {
                continue;
            }
        }

        browser.click(&link).await?;

        let deadline = Instant::now() + assert_timeout;
        loop {
            let url = browser.current_url().await?;
            if url.contains(href.as_str()) {
                break;
            }
            if Instant::now() >= deadline {
                return Err(E2eError::assertion(format!(
                    "following '{}' (href {}) landed on {}",
                    link, href, url
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        browser.go_back().await?;
        visited += 1;
    }

    debug!("Visited {} link(s) matching '{}'", visited, selector);
    Ok(())
}

async fn evaluate_predicate(browser: &mut dyn Browser, predicate: &Predicate) -> E2eResult<bool> {
    match predicate {
        Predicate::Exists(selector) => Ok(browser.count(selector).await? > 0),
        Predicate::CountAtLeast { selector, n } => Ok(browser.count(selector).await? >= *n),
        Predicate::Visible(selector) => {
            if browser.count(selector).await? == 0 {
                return Ok(false);
            }
            browser.is_visible(&ElementHandle::new(selector.as_str(), 0)).await
        }
        Predicate::UrlMatches(pattern) => {
            let url = browser.current_url().await?;
            pattern.matches(&url)
        }
    }
}

fn nest_error(e: E2eError, index: usize, step: &Step) -> E2eError {
    let context = format!("conditional step {} ({})", index, step.name());
    match e {
        E2eError::AssertionFailed(msg) => {
            E2eError::AssertionFailed(format!("{}: {}", context, msg))
        }
        E2eError::Transport(msg) => E2eError::Transport(format!("{}: {}", context, msg)),
        E2eError::NotFound(msg) => E2eError::NotFound(format!("{}: {}", context, msg)),
        other => other,
    }
}

fn expect_pattern(what: &str, actual: &str, pattern: Option<&Pattern>) -> E2eResult<()> {
    let Some(pattern) = pattern else {
        return Ok(());
    };
    if pattern.matches(actual)? {
        Ok(())
    } else {
        Err(E2eError::assertion(format!(
            "expected {} {}, got {:?}",
            what,
            pattern.describe(),
            actual
        )))
    }
}

fn check_count(
    selector: &str,
    count: usize,
    exactly: Option<usize>,
    at_least: Option<usize>,
    at_most: Option<usize>,
) -> E2eResult<()> {
    if let Some(n) = exactly {
        if count != n {
            return Err(E2eError::assertion(format!(
                "expected {} match(es) for '{}', got {}",
                n, selector, count
            )));
        }
    }
    if let Some(n) = at_least {
        if count < n {
            return Err(E2eError::assertion(format!(
                "expected at least {} match(es) for '{}', got {}",
                n, selector, count
            )));
        }
    }
    if let Some(n) = at_most {
        if count > n {
            return Err(E2eError::assertion(format!(
                "expected at most {} match(es) for '{}', got {}",
                n, selector, count
            )));
        }
    }
    Ok(())
}

/// Look up a dotted path such as `preferences.theme` or `icons.0.src`
pub fn json_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn check_json_field(body: &Value, path: &str, matcher: &JsonMatcher) -> E2eResult<()> {
    let field = json_path(body, path);

    match (matcher, field) {
        (_, None) => Err(E2eError::assertion(format!(
            "expected JSON field '{}' to exist",
            path
        ))),
        (JsonMatcher::Exists, Some(_)) => Ok(()),
        (JsonMatcher::Equals(expected), Some(actual)) => {
            if actual == expected {
                Ok(())
            } else {
                Err(E2eError::assertion(format!(
                    "expected JSON field '{}' to equal {}, got {}",
                    path, expected, actual
                )))
            }
        }
        (JsonMatcher::Type(expected), Some(actual)) => {
            let actual_type = JsonType::of(actual);
            if actual_type == *expected {
                Ok(())
            } else {
                Err(E2eError::assertion(format!(
                    "expected JSON field '{}' to be {}, got {}",
                    path,
                    expected.as_str(),
                    actual_type.as_str()
                )))
            }
        }
        (JsonMatcher::Matches(pattern), Some(actual)) => {
            let text = match actual {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            expect_pattern(&format!("JSON field '{}'", path), &text, Some(pattern))
        }
    }
}
