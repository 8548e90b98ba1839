//! Capability interface of the automation engine that manipulates the remote target.
//!
//! The workflow only ever talks to these traits, so any engine that can open a
//! page, enumerate frames, query, click and fill is substitutable.

use crate::errors::AutomationError;
use crate::locator::Locator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier of a top-level browsing context (tab or popup window).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub String);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document to search in: a page's top-level document or one of its nested frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub page: PageId,
    /// Index of the frame in document order, `None` for the top-level document.
    pub frame: Option<usize>,
}

impl Scope {
    pub fn main(page: PageId) -> Self {
        Self { page, frame: None }
    }

    pub fn frame(page: PageId, index: usize) -> Self {
        Self {
            page,
            frame: Some(index),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.frame {
            Some(index) => write!(f, "{}#frame{}", self.page, index),
            None => write!(f, "{}#main", self.page),
        }
    }
}

/// Handle to a live element found by a locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    pub scope: Scope,
    pub handle: String,
}

/// Parameters for opening an automation session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub url: String,
    pub fingerprint: String,
    pub headless: bool,
    pub navigation_timeout: Duration,
}

/// Opens isolated automation sessions. One session per task, never shared.
#[async_trait::async_trait]
pub trait AutomationEngine: Send + Sync {
    async fn open_session(
        &self,
        options: SessionOptions,
    ) -> Result<Box<dyn AutomationSession>, AutomationError>;
}

/// The operations a workflow may perform on a live session.
#[async_trait::async_trait]
pub trait AutomationSession: Send + Sync {
    /// The page the session was opened on.
    fn main_page(&self) -> PageId;

    /// Open top-level pages, oldest first.
    async fn pages(&self) -> Result<Vec<PageId>, AutomationError>;

    /// Whether the page is still open and reachable.
    async fn is_open(&self, page: &PageId) -> bool;

    async fn navigate(
        &self,
        page: &PageId,
        url: &str,
        timeout: Duration,
    ) -> Result<(), AutomationError>;

    async fn current_url(&self, page: &PageId) -> Result<String, AutomationError>;

    /// Nested frame documents of the page, in document order.
    async fn frames(&self, page: &PageId) -> Result<Vec<Scope>, AutomationError>;

    /// Immediate query; `Ok(None)` when nothing matches.
    async fn query(
        &self,
        scope: &Scope,
        locator: &Locator,
    ) -> Result<Option<ElementRef>, AutomationError>;

    /// Wait until the locator matches. Returns `Err(Timeout)` when it never appears.
    async fn wait_for(
        &self,
        scope: &Scope,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<(), AutomationError>;

    async fn click(&self, element: &ElementRef) -> Result<(), AutomationError>;

    async fn fill(&self, element: &ElementRef, value: &str) -> Result<(), AutomationError>;

    async fn element_text(&self, element: &ElementRef) -> Result<String, AutomationError>;

    async fn is_disabled(&self, element: &ElementRef) -> Result<bool, AutomationError>;

    /// Visible text content of a document.
    async fn text_content(&self, scope: &Scope) -> Result<String, AutomationError>;

    /// Accept any pending interruption dialogs, returning how many were handled.
    async fn accept_dialogs(&self, page: &PageId) -> Result<usize, AutomationError>;

    async fn close(&self) -> Result<(), AutomationError>;
}
