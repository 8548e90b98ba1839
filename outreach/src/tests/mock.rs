//! Scriptable in-memory automation engine.
//!
//! Pages, elements and click side effects are declared up front; every call
//! the workflow makes is recorded so tests can assert on what was touched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::engine::{AutomationEngine, AutomationSession, ElementRef, PageId, Scope, SessionOptions};
use crate::errors::AutomationError;
use crate::events::{EventSink, SessionEvent};
use crate::locator::Locator;

pub const MAIN: &str = "main";
pub const POPUP: &str = "popup";

pub fn page(id: &str) -> PageId {
    PageId(id.to_string())
}

/// What a click does to the mock world.
#[derive(Debug, Clone)]
pub enum Effect {
    SetUrl(PageId, String),
    SetText(PageId, String),
    OpenPage(MockPage),
    ClosePage(PageId),
    Dialog(PageId),
}

#[derive(Debug, Clone, Default)]
pub struct MockPage {
    pub id: String,
    pub url: String,
    pub text: String,
    pub frames: usize,
}

impl MockPage {
    pub fn new(id: &str, url: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            url: url.to_string(),
            text: text.to_string(),
            frames: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockElement {
    pub id: String,
    pub page: PageId,
    pub frame: Option<usize>,
    pub locator: Locator,
    pub label: String,
    pub disabled: bool,
    pub click_error: Option<AutomationError>,
    /// A failed click also removes the element, as if the page re-rendered without it.
    pub detach_on_failure: bool,
    pub on_click: Vec<Effect>,
}

impl MockElement {
    /// An element on `page_id` matched by the first candidate of `candidates`.
    pub fn new(id: &str, page_id: &str, candidates: &[Locator]) -> Self {
        Self {
            id: id.to_string(),
            page: page(page_id),
            frame: None,
            locator: candidates[0].clone(),
            label: String::new(),
            disabled: false,
            click_error: None,
            detach_on_failure: false,
            on_click: Vec::new(),
        }
    }

    pub fn in_frame(mut self, index: usize) -> Self {
        self.frame = Some(index);
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn failing_click(mut self, error: AutomationError) -> Self {
        self.click_error = Some(error);
        self
    }

    pub fn detached_after_failure(mut self) -> Self {
        self.detach_on_failure = true;
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.on_click.push(effect);
        self
    }
}

#[derive(Debug, Default)]
pub struct MockWorld {
    pub pages: Vec<MockPage>,
    pub elements: Vec<MockElement>,
    pub calls: Vec<String>,
    pub filled: Vec<(String, String)>,
    pub dialogs: HashMap<PageId, usize>,
    pub closed: bool,
}

impl MockWorld {
    fn page(&self, id: &PageId) -> Result<&MockPage, AutomationError> {
        self.pages
            .iter()
            .find(|p| p.id == id.0)
            .ok_or_else(|| AutomationError::ContextClosed(format!("page {id} is closed")))
    }

    fn page_mut(&mut self, id: &PageId) -> Result<&mut MockPage, AutomationError> {
        self.pages
            .iter_mut()
            .find(|p| p.id == id.0)
            .ok_or_else(|| AutomationError::ContextClosed(format!("page {id} is closed")))
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::SetUrl(id, url) => {
                if let Ok(page) = self.page_mut(&id) {
                    page.url = url;
                }
            }
            Effect::SetText(id, text) => {
                if let Ok(page) = self.page_mut(&id) {
                    page.text = text;
                }
            }
            Effect::OpenPage(page) => self.pages.push(page),
            Effect::ClosePage(id) => self.pages.retain(|p| p.id != id.0),
            Effect::Dialog(id) => *self.dialogs.entry(id).or_default() += 1,
        }
    }
}

/// Shared handle: the workflow owns the session, the test keeps a clone to inspect it.
#[derive(Clone, Default)]
pub struct MockSession {
    world: Arc<Mutex<MockWorld>>,
}

impl MockSession {
    pub fn new(url: &str) -> Self {
        let session = Self::default();
        session.world().pages.push(MockPage::new(MAIN, url, ""));
        session
    }

    pub fn world(&self) -> std::sync::MutexGuard<'_, MockWorld> {
        self.world.lock().unwrap()
    }

    pub fn with_text(self, page_id: &str, text: &str) -> Self {
        self.world().page_mut(&page(page_id)).unwrap().text = text.to_string();
        self
    }

    pub fn with_frames(self, page_id: &str, frames: usize) -> Self {
        self.world().page_mut(&page(page_id)).unwrap().frames = frames;
        self
    }

    pub fn with(self, element: MockElement) -> Self {
        self.world().elements.push(element);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.world().calls.clone()
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.world().calls.iter().any(|c| c.starts_with(prefix))
    }

    pub fn clicked(&self, id: &str) -> bool {
        self.world().calls.iter().any(|c| c == &format!("click:{id}"))
    }

    pub fn filled(&self) -> Vec<(String, String)> {
        self.world().filled.clone()
    }

    pub fn url(&self, page_id: &str) -> String {
        self.world().page(&page(page_id)).map(|p| p.url.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        self.world().calls.push(call);
    }
}

#[async_trait::async_trait]
impl AutomationSession for MockSession {
    fn main_page(&self) -> PageId {
        page(MAIN)
    }

    async fn pages(&self) -> Result<Vec<PageId>, AutomationError> {
        self.record("pages".to_string());
        Ok(self.world().pages.iter().map(|p| page(&p.id)).collect())
    }

    async fn is_open(&self, id: &PageId) -> bool {
        self.world().page(id).is_ok()
    }

    async fn navigate(&self, id: &PageId, url: &str, _timeout: Duration) -> Result<(), AutomationError> {
        self.record(format!("navigate:{url}"));
        self.world().page_mut(id)?.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self, id: &PageId) -> Result<String, AutomationError> {
        Ok(self.world().page(id)?.url.clone())
    }

    async fn frames(&self, id: &PageId) -> Result<Vec<Scope>, AutomationError> {
        let frames = self.world().page(id)?.frames;
        Ok((0..frames).map(|i| Scope::frame(id.clone(), i)).collect())
    }

    async fn query(&self, scope: &Scope, locator: &Locator) -> Result<Option<ElementRef>, AutomationError> {
        let world = self.world();
        world.page(&scope.page)?;
        Ok(world
            .elements
            .iter()
            .find(|e| e.page == scope.page && e.frame == scope.frame && &e.locator == locator)
            .map(|e| ElementRef {
                scope: scope.clone(),
                handle: e.id.clone(),
            }))
    }

    async fn wait_for(&self, scope: &Scope, locator: &Locator, timeout: Duration) -> Result<(), AutomationError> {
        match self.query(scope, locator).await? {
            Some(_) => Ok(()),
            None => Err(AutomationError::Timeout(format!("{locator} after {timeout:?}"))),
        }
    }

    async fn click(&self, element: &ElementRef) -> Result<(), AutomationError> {
        self.record(format!("click:{}", element.handle));
        let mut world = self.world();
        world.page(&element.scope.page)?;
        let found = world
            .elements
            .iter()
            .find(|e| e.id == element.handle)
            .cloned()
            .ok_or_else(|| AutomationError::ElementDetached(element.handle.clone()))?;
        if let Some(error) = found.click_error {
            if found.detach_on_failure {
                world.elements.retain(|e| e.id != found.id);
            }
            return Err(error);
        }
        for effect in found.on_click {
            world.apply(effect);
        }
        Ok(())
    }

    async fn fill(&self, element: &ElementRef, value: &str) -> Result<(), AutomationError> {
        self.record(format!("fill:{}", element.handle));
        let mut world = self.world();
        world.page(&element.scope.page)?;
        world.filled.push((element.handle.clone(), value.to_string()));
        Ok(())
    }

    async fn element_text(&self, element: &ElementRef) -> Result<String, AutomationError> {
        let world = self.world();
        world
            .elements
            .iter()
            .find(|e| e.id == element.handle)
            .map(|e| e.label.clone())
            .ok_or_else(|| AutomationError::ElementDetached(element.handle.clone()))
    }

    async fn is_disabled(&self, element: &ElementRef) -> Result<bool, AutomationError> {
        let world = self.world();
        Ok(world
            .elements
            .iter()
            .any(|e| e.id == element.handle && e.disabled))
    }

    async fn text_content(&self, scope: &Scope) -> Result<String, AutomationError> {
        self.record(format!("text:{scope}"));
        let world = self.world();
        let page = world.page(&scope.page)?;
        Ok(match scope.frame {
            None => page.text.clone(),
            Some(_) => String::new(),
        })
    }

    async fn accept_dialogs(&self, id: &PageId) -> Result<usize, AutomationError> {
        let mut world = self.world();
        world.page(id)?;
        Ok(world.dialogs.remove(id).unwrap_or(0))
    }

    async fn close(&self) -> Result<(), AutomationError> {
        self.record("close".to_string());
        self.world().closed = true;
        Ok(())
    }
}

/// Hands out clones of one prepared session, optionally after a delay.
pub struct MockEngine {
    pub session: MockSession,
    pub open_delay: Duration,
    pub open_error: Option<AutomationError>,
    pub opened: Mutex<Vec<SessionOptions>>,
}

impl MockEngine {
    pub fn new(session: MockSession) -> Self {
        Self {
            session,
            open_delay: Duration::ZERO,
            open_error: None,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl AutomationEngine for MockEngine {
    async fn open_session(&self, options: SessionOptions) -> Result<Box<dyn AutomationSession>, AutomationError> {
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        self.opened.lock().unwrap().push(options);
        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }
        Ok(Box::new(self.session.clone()))
    }
}

/// Event sink that keeps everything it is given.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<(String, SessionEvent)>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }
}

#[async_trait::async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, session_id: &str, event: SessionEvent) {
        self.events.lock().unwrap().push((session_id.to_string(), event));
    }
}
