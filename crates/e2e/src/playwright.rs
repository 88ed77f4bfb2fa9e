//! Playwright browser automation
//!
//! Each [`PlaywrightBrowser`] is one Node process running a small driver
//! script. Commands go over stdin and replies come back on stdout, one JSON
//! object per line. The page lives as long as the process, so state carries
//! from step to step inside a scenario and nowhere else.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::session::{Browser, ElementHandle};
use crate::spec::{Viewport, WaitState};

const DRIVER_SCRIPT: &str = r#"
const path = require('path');
const readline = require('readline');
const { createRequire } = require('module');

const send = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

(async () => {
  const config = JSON.parse(process.argv[2]);
  const pw = createRequire(path.join(process.cwd(), 'driver.js'))('playwright');
  const browser = await pw[config.browser].launch({ headless: config.headless });
  const context = await browser.newContext({ viewport: config.viewport });
  const page = await context.newPage();
  page.setDefaultTimeout(config.action_timeout_ms);
  page.setDefaultNavigationTimeout(config.navigation_timeout_ms);

  const nth = (c) => page.locator(c.selector).nth(c.index);
  const handlers = {
    navigate: async (c) => { const r = await page.goto(c.url); return r ? r.status() : null; },
    go_back: async () => { await page.goBack(); return null; },
    reload: async () => { await page.reload(); return null; },
    title: async () => page.title(),
    url: async () => page.url(),
    count: async (c) => page.locator(c.selector).count(),
    click: async (c) => { await nth(c).click(); return null; },
    fill: async (c) => { await nth(c).fill(c.text); return null; },
    press: async (c) => {
      if (c.selector) { await nth(c).press(c.key); } else { await page.keyboard.press(c.key); }
      return null;
    },
    type: async (c) => { await page.keyboard.type(c.text); return null; },
    select_option: async (c) => { await nth(c).selectOption(c.value); return null; },
    attribute: async (c) => nth(c).getAttribute(c.name),
    text_content: async (c) => nth(c).textContent(),
    tag_name: async (c) => nth(c).evaluate((el) => el.tagName.toLowerCase()),
    is_visible: async (c) => nth(c).isVisible(),
    is_checked: async (c) => nth(c).isChecked(),
    wait_for: async (c) => {
      await page.locator(c.selector).first().waitFor({ state: c.state, timeout: c.timeout_ms });
      return null;
    },
    set_viewport: async (c) => { await page.setViewportSize({ width: c.width, height: c.height }); return null; },
  };

  send({ id: 0, ok: true, value: 'ready' });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    const cmd = JSON.parse(line);
    if (cmd.op === 'close') {
      await browser.close();
      send({ id: cmd.id, ok: true, value: null });
      break;
    }
    try {
      const handler = handlers[cmd.op];
      if (!handler) throw new Error('unknown op ' + cmd.op);
      const value = await handler(cmd);
      send({ id: cmd.id, ok: true, value: value === undefined ? null : value });
    } catch (error) {
      const kind = error.name === 'TimeoutError' ? 'timeout' : 'error';
      send({ id: cmd.id, ok: false, kind, error: error.message });
    }
  }
  process.exit(0);
})().catch((error) => {
  send({ id: 0, ok: false, kind: 'launch', error: error.message });
  process.exit(1);
});
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for BrowserKind {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" => Ok(BrowserKind::Webkit),
            other => Err(E2eError::InvalidConfig(format!("unknown browser '{}'", other))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub browser: BrowserKind,
    pub headless: bool,
    /// Node executable
    pub node_binary: PathBuf,
    /// Directory whose node_modules provides `playwright`
    pub project_dir: PathBuf,
    pub action_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    pub launch_timeout_ms: u64,
    pub viewport: Viewport,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: true,
            node_binary: PathBuf::from("node"),
            project_dir: PathBuf::from("."),
            action_timeout_ms: 10_000,
            navigation_timeout_ms: 30_000,
            launch_timeout_ms: 60_000,
            viewport: Viewport::default(),
        }
    }
}

/// Command sent to the driver
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum DriverOp<'a> {
    Navigate { url: &'a str },
    GoBack,
    Reload,
    Title,
    Url,
    Count { selector: &'a str },
    Click { selector: &'a str, index: usize },
    Fill { selector: &'a str, index: usize, text: &'a str },
    Press {
        #[serde(skip_serializing_if = "Option::is_none")]
        selector: Option<&'a str>,
        index: usize,
        key: &'a str,
    },
    Type { text: &'a str },
    SelectOption { selector: &'a str, index: usize, value: &'a str },
    Attribute { selector: &'a str, index: usize, name: &'a str },
    TextContent { selector: &'a str, index: usize },
    TagName { selector: &'a str, index: usize },
    IsVisible { selector: &'a str, index: usize },
    IsChecked { selector: &'a str, index: usize },
    WaitFor { selector: &'a str, state: &'a str, timeout_ms: u64 },
    SetViewport { width: u32, height: u32 },
    Close,
}

#[derive(Debug, Serialize)]
struct DriverRequest<'a> {
    id: u64,
    #[serde(flatten)]
    op: DriverOp<'a>,
}

#[derive(Debug, Deserialize)]
struct DriverResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct LaunchArgs<'a> {
    browser: &'a str,
    headless: bool,
    viewport: Viewport,
    action_timeout_ms: u64,
    navigation_timeout_ms: u64,
}

/// Playwright browser handle
pub struct PlaywrightBrowser {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    action_timeout_ms: u64,
    closed: bool,
    /// Holds the driver script for the lifetime of the process
    _script_dir: tempfile::TempDir,
}

impl PlaywrightBrowser {
    /// Launch a browser with one page at the given viewport
    pub async fn launch(config: &PlaywrightConfig, viewport: Viewport) -> E2eResult<Self> {
        Self::check_playwright_installed(config).await?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("sitecheck-driver.js");
        std::fs::write(&script_path, DRIVER_SCRIPT)?;

        let args = serde_json::to_string(&LaunchArgs {
            browser: config.browser.as_str(),
            headless: config.headless,
            viewport,
            action_timeout_ms: config.action_timeout_ms,
            navigation_timeout_ms: config.navigation_timeout_ms,
        })?;

        debug!("Launching Playwright driver: {}", script_path.display());

        let mut child = Command::new(&config.node_binary)
            .arg(&script_path)
            .arg(args)
            .current_dir(&config.project_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                E2eError::Playwright(format!(
                    "Failed to spawn {}: {}",
                    config.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdout unavailable".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "sitecheck::driver", "{}", line);
                }
            });
        }

        let mut browser = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            action_timeout_ms: config.action_timeout_ms,
            closed: false,
            _script_dir: script_dir,
        };

        let launch_timeout = Duration::from_millis(config.launch_timeout_ms);
        match tokio::time::timeout(launch_timeout, browser.read_response(0)).await {
            Ok(Ok(_)) => {
                info!("Playwright {} ready", config.browser.as_str());
                Ok(browser)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(E2eError::Timeout {
                what: "browser launch".into(),
                ms: config.launch_timeout_ms,
            }),
        }
    }

    /// Check that node can resolve the playwright package
    async fn check_playwright_installed(config: &PlaywrightConfig) -> E2eResult<()> {
        let status = Command::new(&config.node_binary)
            .args(["-e", "require.resolve('playwright')"])
            .current_dir(&config.project_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    async fn call(&mut self, op: DriverOp<'_>) -> E2eResult<serde_json::Value> {
        let id = self.next_id;
        self.next_id += 1;

        let mut line = serde_json::to_string(&DriverRequest { id, op })?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| E2eError::Transport(format!("driver write failed: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| E2eError::Transport(format!("driver flush failed: {}", e)))?;

        self.read_response(id).await
    }

    /// Read until the reply for `id`. Replies to calls abandoned by a step
    /// timeout arrive with smaller ids and are discarded.
    async fn read_response(&mut self, id: u64) -> E2eResult<serde_json::Value> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|e| E2eError::Transport(format!("driver read failed: {}", e)))?
                .ok_or_else(|| E2eError::Transport("browser driver exited".into()))?;

            let resp: DriverResponse = match serde_json::from_str(&line) {
                Ok(resp) => resp,
                Err(_) => {
                    debug!("Ignoring driver output: {}", line);
                    continue;
                }
            };

            if resp.id < id {
                debug!("Discarding stale driver reply {}", resp.id);
                continue;
            }

            if resp.ok {
                return Ok(resp.value);
            }

            let message = resp.error.unwrap_or_else(|| "unknown driver error".into());
            return Err(match resp.kind.as_deref() {
                Some("timeout") => E2eError::Timeout {
                    what: message,
                    ms: self.action_timeout_ms,
                },
                Some("launch") => E2eError::Playwright(message),
                _ => E2eError::Transport(message),
            });
        }
    }

    async fn call_unit(&mut self, op: DriverOp<'_>) -> E2eResult<()> {
        self.call(op).await.map(|_| ())
    }

    async fn call_string(&mut self, op: DriverOp<'_>) -> E2eResult<Option<String>> {
        match self.call(op).await? {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::String(s) => Ok(Some(s)),
            other => Ok(Some(other.to_string())),
        }
    }

    async fn call_bool(&mut self, op: DriverOp<'_>) -> E2eResult<bool> {
        Ok(self.call(op).await?.as_bool().unwrap_or(false))
    }

    /// Terminate the driver process if it is still running
    async fn terminate(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                    && tokio::time::timeout(Duration::from_millis(500), self.child.wait())
                        .await
                        .is_ok()
                {
                    return;
                }
            }
        }

        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill browser driver: {}", e);
        }
    }
}

#[async_trait]
impl Browser for PlaywrightBrowser {
    async fn navigate(&mut self, url: &str) -> E2eResult<()> {
        self.call_unit(DriverOp::Navigate { url }).await
    }

    async fn go_back(&mut self) -> E2eResult<()> {
        self.call_unit(DriverOp::GoBack).await
    }

    async fn reload(&mut self) -> E2eResult<()> {
        self.call_unit(DriverOp::Reload).await
    }

    async fn title(&mut self) -> E2eResult<String> {
        Ok(self.call_string(DriverOp::Title).await?.unwrap_or_default())
    }

    async fn current_url(&mut self) -> E2eResult<String> {
        Ok(self.call_string(DriverOp::Url).await?.unwrap_or_default())
    }

    async fn count(&mut self, selector: &str) -> E2eResult<usize> {
        let value = self.call(DriverOp::Count { selector }).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn click(&mut self, element: &ElementHandle) -> E2eResult<()> {
        self.call_unit(DriverOp::Click {
            selector: &element.selector,
            index: element.index,
        })
        .await
    }

    async fn fill(&mut self, element: &ElementHandle, text: &str) -> E2eResult<()> {
        self.call_unit(DriverOp::Fill {
            selector: &element.selector,
            index: element.index,
            text,
        })
        .await
    }

    async fn press(&mut self, element: Option<&ElementHandle>, key: &str) -> E2eResult<()> {
        self.call_unit(DriverOp::Press {
            selector: element.map(|e| e.selector.as_str()),
            index: element.map(|e| e.index).unwrap_or(0),
            key,
        })
        .await
    }

    async fn type_text(&mut self, text: &str) -> E2eResult<()> {
        self.call_unit(DriverOp::Type { text }).await
    }

    async fn select_option(&mut self, element: &ElementHandle, value: &str) -> E2eResult<()> {
        self.call_unit(DriverOp::SelectOption {
            selector: &element.selector,
            index: element.index,
            value,
        })
        .await
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> E2eResult<Option<String>> {
        self.call_string(DriverOp::Attribute {
            selector: &element.selector,
            index: element.index,
            name,
        })
        .await
    }

    async fn text_content(&mut self, element: &ElementHandle) -> E2eResult<Option<String>> {
        self.call_string(DriverOp::TextContent {
            selector: &element.selector,
            index: element.index,
        })
        .await
    }

    async fn tag_name(&mut self, element: &ElementHandle) -> E2eResult<String> {
        Ok(self
            .call_string(DriverOp::TagName {
                selector: &element.selector,
                index: element.index,
            })
            .await?
            .unwrap_or_default())
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> E2eResult<bool> {
        self.call_bool(DriverOp::IsVisible {
            selector: &element.selector,
            index: element.index,
        })
        .await
    }

    async fn is_checked(&mut self, element: &ElementHandle) -> E2eResult<bool> {
        self.call_bool(DriverOp::IsChecked {
            selector: &element.selector,
            index: element.index,
        })
        .await
    }

    async fn wait_for(
        &mut self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> E2eResult<()> {
        self.call_unit(DriverOp::WaitFor {
            selector,
            state: state.as_str(),
            timeout_ms: timeout.as_millis() as u64,
        })
        .await
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> E2eResult<()> {
        self.call_unit(DriverOp::SetViewport {
            width: viewport.width,
            height: viewport.height,
        })
        .await
    }

    async fn close(&mut self) -> E2eResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let graceful = tokio::time::timeout(
            Duration::from_secs(5),
            self.call_unit(DriverOp::Close),
        )
        .await;
        if !matches!(graceful, Ok(Ok(()))) {
            debug!("Browser did not close gracefully, terminating driver");
        }
        self.terminate().await;
        Ok(())
    }
}
