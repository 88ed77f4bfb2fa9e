//! In-memory site and browser used by the runner tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use sitecheck_e2e::http::{HttpConfig, ReqwestClient};
use sitecheck_e2e::spec::WaitState;
use sitecheck_e2e::{
    Browser, E2eError, E2eResult, ElementHandle, HttpClient, SessionFactory, Viewport,
};

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub tag: String,
    pub text: String,
    pub attributes: HashMap<String, String>,
    pub visible: bool,
    pub checked: bool,
}

impl FakeElement {
    pub fn text(text: &str) -> Self {
        Self { tag: "div".to_string(), text: text.to_string(), visible: true, ..Default::default() }
    }

    pub fn heading(level: u8, text: &str) -> Self {
        Self { tag: format!("h{}", level), ..Self::text(text) }
    }

    pub fn link(text: &str, href: &str) -> Self {
        Self { tag: "a".to_string(), ..Self::text(text) }.with_attr("href", href)
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub title: String,
    pub elements: HashMap<String, Vec<FakeElement>>,
}

impl FakePage {
    pub fn new(title: &str) -> Self {
        Self { title: title.to_string(), elements: HashMap::new() }
    }

    pub fn with(mut self, selector: &str, elements: Vec<FakeElement>) -> Self {
        self.elements.insert(selector.to_string(), elements);
        self
    }
}

/// Pages keyed by URL path
#[derive(Default)]
pub struct FakeSite {
    pages: HashMap<String, FakePage>,
    /// Navigating to these paths never completes
    hanging: Vec<String>,
    /// Navigating to these paths panics
    panicking: Vec<String>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, path: &str, page: FakePage) -> Self {
        self.pages.insert(path.to_string(), page);
        self
    }

    pub fn hang_on(mut self, path: &str) -> Self {
        self.hanging.push(path.to_string());
        self
    }

    pub fn panic_on(mut self, path: &str) -> Self {
        self.panicking.push(path.to_string());
        self
    }
}

#[derive(Default)]
pub struct Counters {
    pub launched: AtomicUsize,
    pub closed: AtomicUsize,
    pub dropped: AtomicUsize,
}

pub struct FakeBrowser {
    site: Arc<FakeSite>,
    counters: Arc<Counters>,
    history: Vec<Url>,
    viewport: Viewport,
}

impl Drop for FakeBrowser {
    fn drop(&mut self) {
        self.counters.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

impl FakeBrowser {
    fn current(&self) -> E2eResult<(&Url, &FakePage)> {
        let url = self
            .history
            .last()
            .ok_or_else(|| E2eError::Transport("no page loaded".into()))?;
        let page = self
            .site
            .pages
            .get(url.path())
            .ok_or_else(|| E2eError::Transport(format!("no page at {}", url)))?;
        Ok((url, page))
    }

    fn elements(&self, selector: &str) -> E2eResult<Vec<FakeElement>> {
        let (_, page) = self.current()?;
        Ok(page.elements.get(selector).cloned().unwrap_or_default())
    }

    fn element(&self, handle: &ElementHandle) -> E2eResult<FakeElement> {
        self.elements(&handle.selector)?
            .get(handle.index)
            .cloned()
            .ok_or_else(|| E2eError::NotFound(handle.to_string()))
    }

    async fn load(&mut self, url: Url) -> E2eResult<()> {
        let path = url.path().to_string();
        if self.site.hanging.contains(&path) {
            futures::future::pending::<()>().await;
        }
        if self.site.panicking.contains(&path) {
            panic!("renderer crashed on {}", path);
        }
        if !self.site.pages.contains_key(&path) {
            return Err(E2eError::Transport(format!("net::ERR_CONNECTION_REFUSED at {}", url)));
        }
        self.history.push(url);
        Ok(())
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn navigate(&mut self, url: &str) -> E2eResult<()> {
        let url = Url::parse(url).map_err(|e| E2eError::Transport(e.to_string()))?;
        self.load(url).await
    }

    async fn go_back(&mut self) -> E2eResult<()> {
        if self.history.len() > 1 {
            self.history.pop();
        }
        Ok(())
    }

    async fn reload(&mut self) -> E2eResult<()> {
        self.current().map(|_| ())
    }

    async fn title(&mut self) -> E2eResult<String> {
        Ok(self.current()?.1.title.clone())
    }

    async fn current_url(&mut self) -> E2eResult<String> {
        Ok(self.current()?.0.to_string())
    }

    async fn count(&mut self, selector: &str) -> E2eResult<usize> {
        Ok(self.elements(selector)?.len())
    }

    async fn click(&mut self, element: &ElementHandle) -> E2eResult<()> {
        let target = self.element(element)?;
        if let Some(href) = target.attributes.get("href") {
            let next = self
                .current()?
                .0
                .join(href)
                .map_err(|e| E2eError::Transport(e.to_string()))?;
            self.load(next).await?;
        }
        Ok(())
    }

    async fn fill(&mut self, element: &ElementHandle, _text: &str) -> E2eResult<()> {
        self.element(element).map(|_| ())
    }

    async fn press(&mut self, element: Option<&ElementHandle>, _key: &str) -> E2eResult<()> {
        if let Some(element) = element {
            self.element(element)?;
        }
        Ok(())
    }

    async fn type_text(&mut self, _text: &str) -> E2eResult<()> {
        Ok(())
    }

    async fn select_option(&mut self, element: &ElementHandle, _value: &str) -> E2eResult<()> {
        self.element(element).map(|_| ())
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> E2eResult<Option<String>> {
        Ok(self.element(element)?.attributes.get(name).cloned())
    }

    async fn text_content(&mut self, element: &ElementHandle) -> E2eResult<Option<String>> {
        Ok(Some(self.element(element)?.text))
    }

    async fn tag_name(&mut self, element: &ElementHandle) -> E2eResult<String> {
        Ok(self.element(element)?.tag)
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> E2eResult<bool> {
        Ok(self.element(element)?.visible)
    }

    async fn is_checked(&mut self, element: &ElementHandle) -> E2eResult<bool> {
        Ok(self.element(element)?.checked)
    }

    async fn wait_for(
        &mut self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> E2eResult<()> {
        let elements = self.elements(selector)?;
        let visible = elements.first().map(|e| e.visible).unwrap_or(false);
        let holds = match state {
            WaitState::Visible => visible,
            WaitState::Hidden => !visible,
            WaitState::Attached => !elements.is_empty(),
            WaitState::Detached => elements.is_empty(),
        };
        if holds {
            return Ok(());
        }
        tokio::time::sleep(timeout).await;
        Err(E2eError::Timeout {
            what: format!("{} to be {}", selector, state.as_str()),
            ms: timeout.as_millis() as u64,
        })
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> E2eResult<()> {
        self.viewport = viewport;
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeFactory {
    site: Arc<FakeSite>,
    pub counters: Arc<Counters>,
    fail_launch: bool,
    fail_http: bool,
}

impl FakeFactory {
    pub fn new(site: FakeSite) -> Arc<Self> {
        Arc::new(Self {
            site: Arc::new(site),
            counters: Arc::new(Counters::default()),
            fail_launch: false,
            fail_http: false,
        })
    }

    pub fn failing_launch(site: FakeSite) -> Arc<Self> {
        Arc::new(Self {
            site: Arc::new(site),
            counters: Arc::new(Counters::default()),
            fail_launch: true,
            fail_http: false,
        })
    }

    pub fn failing_http(site: FakeSite) -> Arc<Self> {
        Arc::new(Self {
            site: Arc::new(site),
            counters: Arc::new(Counters::default()),
            fail_launch: false,
            fail_http: true,
        })
    }

    pub fn launched(&self) -> usize {
        self.counters.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.counters.dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn launch_browser(&self, viewport: Viewport) -> E2eResult<Box<dyn Browser>> {
        if self.fail_launch {
            return Err(E2eError::PlaywrightNotFound);
        }
        self.counters.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeBrowser {
            site: Arc::clone(&self.site),
            counters: Arc::clone(&self.counters),
            history: Vec::new(),
            viewport,
        }))
    }

    fn http_client(&self) -> E2eResult<Arc<dyn HttpClient>> {
        if self.fail_http {
            return Err(E2eError::Setup("http client unavailable".into()));
        }
        Ok(Arc::new(ReqwestClient::new(&HttpConfig::default())?))
    }
}

/// The Biome home page as the scenarios expect it
pub fn biome_site() -> FakeSite {
    FakeSite::new()
        .page(
            "/",
            FakePage::new("Biome — Toolchain")
                .with(".hero-section", vec![FakeElement::text("One toolchain for your web project")])
                .with(
                    "nav a",
                    vec![
                        FakeElement::link("Docs", "/guides/getting-started/"),
                        FakeElement::link("Blog", "/blog/"),
                    ],
                )
                .with(".theme-toggle", vec![FakeElement::text("").hidden()]),
        )
        .page(
            "/guides/getting-started/",
            FakePage::new("Getting Started | Biome")
                .with("h1", vec![FakeElement::text("Getting Started")]),
        )
        .page(
            "/blog/",
            FakePage::new("Blog | Biome")
                .with(
                    "article",
                    vec![FakeElement::text("Biome v1.9"), FakeElement::text("Biome v1.8")],
                )
                .with(".pagination a", vec![FakeElement::link("Next", "/blog/2/")]),
        )
        .page(
            "/blog/2/",
            FakePage::new("Blog - page 2 | Biome")
                .with("article", vec![FakeElement::text("Biome v1.0")]),
        )
}
