//! Automation engine backed by a locally launched Chromium, driven through
//! `chromiumoxide`.
//!
//! Each session gets its own browser process and throwaway profile. Pages are
//! kept in the order they were first seen, so a popup window opened by the site
//! shows up as the newest page. JavaScript dialogs are accepted as soon as they
//! open and counted until the workflow asks.

mod script;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::engine::{AutomationEngine, AutomationSession, ElementRef, PageId, Scope, SessionOptions};
use crate::errors::AutomationError;
use crate::locator::Locator;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Protocol error texts that mean the addressed target or frame no longer exists.
const GONE_MARKERS: &[&str] = &[
    "No target with given id",
    "Session with given id not found",
    "Cannot find context with specified id",
    "Execution context was destroyed",
    "Inspected target navigated or closed",
    "Target closed",
];

/// Launches one Chromium per session.
#[derive(Debug, Clone)]
pub struct CdpEngine {
    /// Auto-detected by the launcher when unset.
    browser_path: Option<PathBuf>,
    launch_timeout: Duration,
    call_timeout: Duration,
}

impl CdpEngine {
    pub fn new(browser_path: Option<PathBuf>) -> Self {
        match &browser_path {
            Some(path) => info!(browser = %path.display(), "Using Chromium engine"),
            None => info!("Using Chromium engine, browser auto-detected"),
        }
        Self {
            browser_path,
            launch_timeout: Duration::from_secs(20),
            call_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    fn browser_config(&self, profile: &Path, options: &SessionOptions) -> Result<BrowserConfig, AutomationError> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile)
            .window_size(1280, 900)
            .launch_timeout(self.launch_timeout)
            .request_timeout(self.call_timeout)
            .args(launch_args(options));
        if let Some(path) = &self.browser_path {
            builder = builder.chrome_executable(path);
        }
        if !options.headless {
            builder = builder.with_head();
        }
        builder.build().map_err(AutomationError::SessionStart)
    }
}

impl Default for CdpEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Flags added on top of the launcher's defaults.
fn launch_args(options: &SessionOptions) -> Vec<String> {
    vec![
        format!("--user-agent={}", options.fingerprint),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-popup-blocking".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
    ]
}

fn page_id(page: &Page) -> PageId {
    PageId(page.target_id().inner().clone())
}

fn map_cdp_error(context: &str, error: CdpError) -> AutomationError {
    match error {
        CdpError::JavascriptException(details) => {
            let message = details
                .exception
                .as_ref()
                .and_then(|e| e.description.clone())
                .unwrap_or_else(|| details.text.clone());
            script::classify_exception(&message)
        }
        CdpError::Timeout => AutomationError::Timeout(context.to_string()),
        other => {
            let message = format!("{context}: {other}");
            if GONE_MARKERS.iter().any(|m| message.contains(m)) {
                AutomationError::ContextClosed(message)
            } else {
                AutomationError::Protocol(message)
            }
        }
    }
}

#[async_trait::async_trait]
impl AutomationEngine for CdpEngine {
    #[instrument(skip_all, fields(url = %options.url, headless = options.headless))]
    async fn open_session(
        &self,
        options: SessionOptions,
    ) -> Result<Box<dyn AutomationSession>, AutomationError> {
        let profile = tempfile::Builder::new()
            .prefix("outreach-profile-")
            .tempdir()
            .map_err(|e| AutomationError::SessionStart(format!("profile dir: {e}")))?;

        let config = self.browser_config(profile.path(), &options)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AutomationError::SessionStart(format!("launch: {e}")))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
            debug!("Browser handler finished");
        });

        let session = CdpSession::start(browser, handler, profile, self.call_timeout).await?;
        session
            .navigate(&session.main, &options.url, options.navigation_timeout)
            .await?;
        info!(page = %session.main, "🌐 Session ready");
        Ok(Box::new(session))
    }
}

/// Top-level pages in the order they were first seen.
#[derive(Debug, Default)]
struct PageOrder {
    order: Vec<PageId>,
    /// Pages that existed before the session opened its own.
    ignored: HashSet<PageId>,
}

impl PageOrder {
    /// Reconcile with the browser's live pages. Returns the pages seen for the first time.
    fn sync(&mut self, live: &[PageId]) -> Vec<PageId> {
        self.order.retain(|p| live.contains(p));
        let fresh: Vec<PageId> = live
            .iter()
            .filter(|p| !self.ignored.contains(*p) && !self.order.contains(*p))
            .cloned()
            .collect();
        self.order.extend(fresh.iter().cloned());
        fresh
    }
}

/// A page handle plus the task accepting its dialogs.
struct Tracked {
    page: Page,
    dialogs: Arc<AtomicUsize>,
    listener: JoinHandle<()>,
}

impl Tracked {
    async fn start(page: Page) -> Result<Self, AutomationError> {
        let mut opened = page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(|e| map_cdp_error("dialog listener", e))?;
        let dialogs = Arc::new(AtomicUsize::new(0));
        let counter = dialogs.clone();
        let handle = page.clone();
        let listener = tokio::spawn(async move {
            while let Some(event) = opened.next().await {
                debug!(dialog = %event.message, "Accepting dialog");
                counter.fetch_add(1, Ordering::SeqCst);
                if let Err(e) = handle.execute(HandleJavaScriptDialogParams::new(true)).await {
                    warn!("Could not accept dialog: {}", e);
                }
            }
        });
        Ok(Self {
            page,
            dialogs,
            listener,
        })
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[derive(Default)]
struct Pages {
    order: PageOrder,
    tracked: HashMap<PageId, Tracked>,
}

pub struct CdpSession {
    browser: Mutex<Browser>,
    pages: Mutex<Pages>,
    main: PageId,
    call_timeout: Duration,
    handler: JoinHandle<()>,
    _profile: TempDir,
}

impl CdpSession {
    async fn start(
        browser: Browser,
        handler: JoinHandle<()>,
        profile: TempDir,
        call_timeout: Duration,
    ) -> Result<Self, AutomationError> {
        let existing = browser
            .pages()
            .await
            .map_err(|e| AutomationError::SessionStart(format!("list pages: {e}")))?;
        let main = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AutomationError::SessionStart(format!("new page: {e}")))?;

        let mut pages = Pages::default();
        pages.order.ignored = existing.iter().map(page_id).collect();
        let main_id = page_id(&main);
        pages.order.sync(std::slice::from_ref(&main_id));
        pages.tracked.insert(main_id.clone(), Tracked::start(main).await?);
        debug!(page = %main_id, ignored = pages.order.ignored.len(), "Main page opened");

        Ok(Self {
            browser: Mutex::new(browser),
            pages: Mutex::new(pages),
            main: main_id,
            call_timeout,
            handler,
            _profile: profile,
        })
    }

    /// Pick up pages the site opened and forget the ones that closed.
    async fn refresh(&self) -> Result<(), AutomationError> {
        let live = self
            .browser
            .lock()
            .await
            .pages()
            .await
            .map_err(|e| map_cdp_error("list pages", e))?;
        let ids: Vec<PageId> = live.iter().map(page_id).collect();

        let mut pages = self.pages.lock().await;
        let fresh = pages.order.sync(&ids);
        pages.tracked.retain(|id, _| ids.contains(id));
        for page in live {
            let id = page_id(&page);
            if fresh.contains(&id) {
                debug!(page = %id, "Page opened");
                pages.tracked.insert(id, Tracked::start(page).await?);
            }
        }
        Ok(())
    }

    async fn page(&self, id: &PageId) -> Result<Page, AutomationError> {
        if let Some(tracked) = self.pages.lock().await.tracked.get(id) {
            return Ok(tracked.page.clone());
        }
        self.refresh().await?;
        self.pages
            .lock()
            .await
            .tracked
            .get(id)
            .map(|tracked| tracked.page.clone())
            .ok_or_else(|| AutomationError::ContextClosed(format!("page {id} is closed")))
    }

    /// Evaluate an expression in the page's top-level document and return its value.
    async fn evaluate(&self, id: &PageId, expression: String) -> Result<Value, AutomationError> {
        let page = self.page(id).await?;
        let result = match tokio::time::timeout(self.call_timeout, page.evaluate(expression)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                let error = map_cdp_error("evaluate", e);
                if !error.is_context_gone() && !self.is_open(id).await {
                    return Err(AutomationError::ContextClosed(format!("page {id} is closed")));
                }
                return Err(error);
            }
            Err(_) => {
                return Err(AutomationError::Timeout(format!(
                    "script on {id} after {:?}",
                    self.call_timeout
                )))
            }
        };
        // `undefined` carries no value.
        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }

    async fn evaluate_string(&self, id: &PageId, expression: String) -> Result<String, AutomationError> {
        let value = self.evaluate(id, expression).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn exists(&self, scope: &Scope, locator: &Locator) -> Result<bool, AutomationError> {
        let value = self.evaluate(&scope.page, script::exists(scope, locator)?).await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

#[async_trait::async_trait]
impl AutomationSession for CdpSession {
    fn main_page(&self) -> PageId {
        self.main.clone()
    }

    async fn pages(&self) -> Result<Vec<PageId>, AutomationError> {
        self.refresh().await?;
        Ok(self.pages.lock().await.order.order.clone())
    }

    async fn is_open(&self, page: &PageId) -> bool {
        if let Err(e) = self.refresh().await {
            debug!(%page, "Could not list pages: {}", e);
            return false;
        }
        self.pages.lock().await.tracked.contains_key(page)
    }

    #[instrument(level = "debug", skip(self))]
    async fn navigate(&self, page: &PageId, url: &str, timeout: Duration) -> Result<(), AutomationError> {
        let handle = self.page(page).await?;
        match tokio::time::timeout(timeout, handle.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => match map_cdp_error("navigate", e) {
                gone if gone.is_context_gone() => Err(gone),
                other => Err(AutomationError::NavigationFailed(format!("{url}: {other}"))),
            },
            Err(_) => Err(AutomationError::Timeout(format!("navigation to {url}"))),
        }
    }

    async fn current_url(&self, page: &PageId) -> Result<String, AutomationError> {
        let handle = self.page(page).await?;
        let url = handle.url().await.map_err(|e| map_cdp_error("url", e))?;
        Ok(url.unwrap_or_default())
    }

    async fn frames(&self, page: &PageId) -> Result<Vec<Scope>, AutomationError> {
        let value = self.evaluate(page, script::frames()).await?;
        let accessible = value.as_array().cloned().unwrap_or_default();
        Ok(accessible
            .iter()
            .enumerate()
            .filter(|(_, ok)| ok.as_bool().unwrap_or(false))
            .map(|(index, _)| Scope::frame(page.clone(), index))
            .collect())
    }

    async fn query(&self, scope: &Scope, locator: &Locator) -> Result<Option<ElementRef>, AutomationError> {
        let value = self.evaluate(&scope.page, script::find(scope, locator)?).await?;
        Ok(value.as_u64().map(|index| ElementRef {
            scope: scope.clone(),
            handle: index.to_string(),
        }))
    }

    async fn wait_for(&self, scope: &Scope, locator: &Locator, timeout: Duration) -> Result<(), AutomationError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.exists(scope, locator).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AutomationError::Timeout(format!("{locator} in {scope}")));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&self, element: &ElementRef) -> Result<(), AutomationError> {
        self.evaluate(&element.scope.page, script::click(&element.handle))
            .await
            .map(|_| ())
    }

    async fn fill(&self, element: &ElementRef, value: &str) -> Result<(), AutomationError> {
        self.evaluate(&element.scope.page, script::fill(&element.handle, value))
            .await
            .map(|_| ())
    }

    async fn element_text(&self, element: &ElementRef) -> Result<String, AutomationError> {
        self.evaluate_string(&element.scope.page, script::element_text(&element.handle))
            .await
    }

    async fn is_disabled(&self, element: &ElementRef) -> Result<bool, AutomationError> {
        let value = self
            .evaluate(&element.scope.page, script::is_disabled(&element.handle))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn text_content(&self, scope: &Scope) -> Result<String, AutomationError> {
        self.evaluate_string(&scope.page, script::page_text(scope)).await
    }

    async fn accept_dialogs(&self, page: &PageId) -> Result<usize, AutomationError> {
        // Looking the page up starts its dialog listener if it is new.
        self.page(page).await?;
        let pages = self.pages.lock().await;
        let tracked = pages
            .tracked
            .get(page)
            .ok_or_else(|| AutomationError::ContextClosed(format!("page {page} is closed")))?;
        Ok(tracked.dialogs.swap(0, Ordering::SeqCst))
    }

    async fn close(&self) -> Result<(), AutomationError> {
        self.pages.lock().await.tracked.clear();
        let mut browser = self.browser.lock().await;
        match tokio::time::timeout(CLOSE_TIMEOUT, browser.close()).await {
            Ok(Ok(_)) => {
                if let Err(e) = browser.wait().await {
                    debug!("Browser exit status unavailable: {}", e);
                }
            }
            Ok(Err(e)) => {
                debug!("Browser close failed, killing it: {}", e);
                if let Some(Err(e)) = browser.kill().await {
                    debug!("Browser already gone: {}", e);
                }
            }
            Err(_) => {
                debug!("Browser close timed out, killing it");
                if let Some(Err(e)) = browser.kill().await {
                    debug!("Browser already gone: {}", e);
                }
            }
        }
        self.handler.abort();
        info!("🛑 Session closed");
        Ok(())
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
