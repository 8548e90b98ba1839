use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::engine::{AutomationSession, ElementRef, PageId, Scope};
use crate::errors::AutomationError;
use crate::locator::Locator;

/// Options for a single discovery pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct FindOptions {
    /// Per-candidate wait before querying. On timeout the query still runs once.
    pub wait: Option<Duration>,
}

impl FindOptions {
    pub fn immediate() -> Self {
        Self { wait: None }
    }

    pub fn waiting(wait: Duration) -> Self {
        Self { wait: Some(wait) }
    }
}

/// A match together with the candidate that produced it.
#[derive(Debug, Clone)]
pub struct Found {
    pub element: ElementRef,
    pub locator: Locator,
}

/// Finds the first matching control across a page's frames and its main document.
///
/// Candidates are tried in order. A plain miss is never an error; an error is
/// only returned when every attempt failed at the transport level, or when an
/// action failed on an element that was found and no later context succeeded.
#[derive(Clone, Copy)]
pub struct Discovery<'a> {
    session: &'a dyn AutomationSession,
}

impl<'a> Discovery<'a> {
    pub fn new(session: &'a dyn AutomationSession) -> Self {
        Self { session }
    }

    /// Search one document for the first live match.
    pub async fn find(
        &self,
        scope: &Scope,
        candidates: &[Locator],
        opts: FindOptions,
    ) -> Result<Option<Found>, AutomationError> {
        let mut clean_miss = false;
        let mut last_error = None;

        for locator in candidates {
            if !locator.is_valid() {
                warn!(%locator, "Skipping invalid locator");
                continue;
            }

            if let Some(wait) = opts.wait {
                if let Err(e) = self.session.wait_for(scope, locator, wait).await {
                    // Fall through to an immediate query; slow and fast targets both work.
                    debug!(%scope, %locator, "wait_for gave up: {}", e);
                }
            }

            match self.session.query(scope, locator).await {
                Ok(Some(element)) => {
                    debug!(%scope, %locator, "Candidate matched");
                    return Ok(Some(Found {
                        element,
                        locator: locator.clone(),
                    }));
                }
                Ok(None) => clean_miss = true,
                Err(e) => {
                    debug!(%scope, %locator, "Query failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !clean_miss => Err(e),
            _ => Ok(None),
        }
    }

    /// Scopes of a page in search order: nested frames first, then the top document.
    pub async fn scopes(&self, page: &PageId) -> Vec<Scope> {
        let mut scopes = match self.session.frames(page).await {
            Ok(frames) => frames,
            Err(e) => {
                debug!(%page, "Could not enumerate frames: {}", e);
                Vec::new()
            }
        };
        scopes.push(Scope::main(page.clone()));
        scopes
    }

    /// Search every document of a page, frames first, stopping at the first hit.
    #[instrument(level = "debug", skip(self, candidates, opts))]
    pub async fn find_in_page(
        &self,
        page: &PageId,
        candidates: &[Locator],
        opts: FindOptions,
    ) -> Result<Option<Found>, AutomationError> {
        let mut clean_miss = false;
        let mut last_error = None;

        for scope in self.scopes(page).await {
            match self.find(&scope, candidates, opts).await {
                Ok(Some(found)) => return Ok(Some(found)),
                Ok(None) => clean_miss = true,
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) if !clean_miss => Err(e),
            _ => Ok(None),
        }
    }

    /// Locate a control and click it. `Ok(false)` when nothing matched.
    pub async fn find_and_click(
        &self,
        page: &PageId,
        candidates: &[Locator],
        opts: FindOptions,
    ) -> Result<bool, AutomationError> {
        self.find_and_act(page, candidates, opts, "click", |found| async move {
            self.session.click(&found.element).await
        })
        .await
    }

    /// Locate a field and fill it. `Ok(false)` when nothing matched.
    pub async fn find_and_fill(
        &self,
        page: &PageId,
        candidates: &[Locator],
        value: &str,
        opts: FindOptions,
    ) -> Result<bool, AutomationError> {
        self.find_and_act(page, candidates, opts, "fill", |found| async move {
            self.session.fill(&found.element, value).await
        })
        .await
    }

    async fn find_and_act<F, Fut>(
        &self,
        page: &PageId,
        candidates: &[Locator],
        opts: FindOptions,
        action: &str,
        act: F,
    ) -> Result<bool, AutomationError>
    where
        F: Fn(Found) -> Fut,
        Fut: std::future::Future<Output = Result<(), AutomationError>>,
    {
        let mut clean_miss = false;
        let mut query_error = None;
        let mut action_error = None;

        for scope in self.scopes(page).await {
            let found = match self.find(&scope, candidates, opts).await {
                Ok(Some(found)) => found,
                Ok(None) => {
                    clean_miss = true;
                    continue;
                }
                Err(e) => {
                    query_error = Some(e);
                    continue;
                }
            };

            let locator = found.locator.clone();
            match act(found).await {
                Ok(()) => {
                    debug!(%scope, %locator, "{} succeeded", action);
                    return Ok(true);
                }
                Err(e) => {
                    warn!(%scope, %locator, "{} failed on found element: {}", action, e);
                    action_error = Some(e);
                }
            }
        }

        if let Some(e) = action_error {
            return Err(e);
        }
        match query_error {
            Some(e) if !clean_miss => Err(e),
            _ => Ok(false),
        }
    }
}
