//! Per-scenario session and the collaborator traits it drives
//!
//! A [`Session`] owns at most one browser and exactly one HTTP client for the
//! lifetime of one scenario. Nothing in it is shared with other scenarios.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{E2eError, E2eResult};
use crate::spec::{HttpMethod, Viewport, WaitState};

/// Lazy reference to the n-th element matching a selector.
///
/// Nothing is resolved until the handle is used, so a handle taken before a
/// navigation points at whatever matches on the new page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub selector: String,
    pub index: usize,
}

impl ElementHandle {
    pub fn new(selector: impl Into<String>, index: usize) -> Self {
        Self { selector: selector.into(), index }
    }
}

impl std::fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} >> nth={}", self.selector, self.index)
    }
}

/// Browsing collaborator
///
/// Implementations report missing elements as [`E2eError::NotFound`] and
/// navigation or protocol failures as [`E2eError::Transport`].
#[async_trait]
pub trait Browser: Send {
    async fn navigate(&mut self, url: &str) -> E2eResult<()>;

    async fn go_back(&mut self) -> E2eResult<()>;

    async fn reload(&mut self) -> E2eResult<()>;

    async fn title(&mut self) -> E2eResult<String>;

    async fn current_url(&mut self) -> E2eResult<String>;

    /// Number of elements currently matching `selector`
    async fn count(&mut self, selector: &str) -> E2eResult<usize>;

    /// Handles for every element currently matching `selector`
    async fn find(&mut self, selector: &str) -> E2eResult<Vec<ElementHandle>> {
        let count = self.count(selector).await?;
        Ok((0..count).map(|i| ElementHandle::new(selector, i)).collect())
    }

    async fn click(&mut self, element: &ElementHandle) -> E2eResult<()>;

    async fn fill(&mut self, element: &ElementHandle, text: &str) -> E2eResult<()>;

    /// Press a key on an element, or on the page when `element` is `None`
    async fn press(&mut self, element: Option<&ElementHandle>, key: &str) -> E2eResult<()>;

    /// Type text with the keyboard into whatever has focus
    async fn type_text(&mut self, text: &str) -> E2eResult<()>;

    async fn select_option(&mut self, element: &ElementHandle, value: &str) -> E2eResult<()>;

    async fn attribute(&mut self, element: &ElementHandle, name: &str)
        -> E2eResult<Option<String>>;

    async fn text_content(&mut self, element: &ElementHandle) -> E2eResult<Option<String>>;

    /// Lower-case tag name, such as `h2`
    async fn tag_name(&mut self, element: &ElementHandle) -> E2eResult<String>;

    async fn is_visible(&mut self, element: &ElementHandle) -> E2eResult<bool>;

    async fn is_checked(&mut self, element: &ElementHandle) -> E2eResult<bool>;

    async fn wait_for(&mut self, selector: &str, state: WaitState, timeout: Duration)
        -> E2eResult<()>;

    async fn set_viewport(&mut self, viewport: Viewport) -> E2eResult<()>;

    /// Release the browsing context
    async fn close(&mut self) -> E2eResult<()>;
}

/// Response captured from the HTTP collaborator
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercased
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> E2eResult<serde_json::Value> {
        serde_json::from_slice(&self.body).map_err(|e| {
            E2eError::assertion(format!("response body is not JSON: {}", e))
        })
    }
}

/// HTTP collaborator
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&serde_json::Value>,
    ) -> E2eResult<HttpResponse>;
}

/// Builds the collaborators for a fresh session
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn launch_browser(&self, viewport: Viewport) -> E2eResult<Box<dyn Browser>>;

    /// A client with its own cookie jar
    fn http_client(&self) -> E2eResult<Arc<dyn HttpClient>>;
}

/// Live handles owned by one running scenario
pub struct Session {
    factory: Arc<dyn SessionFactory>,
    viewport: Viewport,
    browser: Option<Box<dyn Browser>>,
    http: Arc<dyn HttpClient>,
    last_response: Option<HttpResponse>,
    /// Soft mismatches raised inside nested steps, drained per step
    warnings: Vec<String>,
}

impl Session {
    /// Acquire a session; the browser is launched on first use
    pub fn acquire(factory: Arc<dyn SessionFactory>, viewport: Viewport) -> E2eResult<Self> {
        let http = factory.http_client()?;
        Ok(Self {
            factory,
            viewport,
            browser: None,
            http,
            last_response: None,
            warnings: Vec::new(),
        })
    }

    /// The session's browser, launching it if needed
    pub async fn browser(&mut self) -> E2eResult<&mut (dyn Browser + 'static)> {
        if self.browser.is_none() {
            debug!("Launching browser ({}x{})", self.viewport.width, self.viewport.height);
            let browser = self
                .factory
                .launch_browser(self.viewport)
                .await
                .map_err(|e| E2eError::BrowserLaunch(Box::new(e)))?;
            self.browser = Some(browser);
        }
        match self.browser.as_deref_mut() {
            Some(browser) => Ok(browser),
            None => Err(E2eError::Transport("browser unavailable".into())),
        }
    }

    pub fn http(&self) -> Arc<dyn HttpClient> {
        Arc::clone(&self.http)
    }

    pub fn set_last_response(&mut self, response: HttpResponse) {
        self.last_response = Some(response);
    }

    /// Last HTTP response, or an assertion failure when no request was made
    pub fn last_response(&self) -> E2eResult<&HttpResponse> {
        self.last_response
            .as_ref()
            .ok_or_else(|| E2eError::assertion("no HTTP request has been made in this scenario"))
    }

    pub fn record_warning(&mut self, message: String) {
        self.warnings.push(message);
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub fn has_browser(&self) -> bool {
        self.browser.is_some()
    }

    /// Release the session. Dropping without calling this still releases
    /// the browser, but without a graceful shutdown.
    pub async fn release(mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser cleanly: {}", e);
            }
        }
    }
}
