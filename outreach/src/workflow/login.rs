use tokio::time::Instant;
use tracing::{debug, info};

use super::text::{find_phrase, is_login_surface};
use super::{fail, FailureReason, Halt, Step, Workflow, WorkflowState};
use crate::discovery::FindOptions;
use crate::engine::Scope;
use crate::task::{canonical_target, is_on_target};

impl Workflow<'_> {
    /// Log in through the target's own entry point, then wait for the redirect.
    pub(super) async fn login(&mut self, identity: &str, secret: &str) -> Step {
        self.enter(WorkflowState::LoggingIn).await?;
        let page = self.main.clone();
        let config = self.config;
        let locators = &config.locators;
        let timeouts = &config.timeouts;
        let discovery = self.discovery();

        self.dismiss_dialogs(&page).await?;

        // A target that already bounced us to the login form has no entry point to click.
        let url = self.guard(self.session.current_url(&page)).await?;
        if is_login_surface(&url, &config.markers) {
            debug!(task_id = %self.task.id, %url, "Already on the login surface");
        } else {
            let clicked = self
                .guard(discovery.find_and_click(
                    &page,
                    locators.login_entry.as_slice(),
                    FindOptions::waiting(timeouts.field_wait()),
                ))
                .await?;
            if !clicked {
                return fail(FailureReason::LoginEntryNotFound);
            }
        }

        let fields = [
            ("identity", &locators.identity_field, identity),
            ("secret", &locators.secret_field, secret),
        ];
        for (field, candidates, value) in fields {
            let filled = self
                .guard(discovery.find_and_fill(
                    &page,
                    candidates.as_slice(),
                    value,
                    FindOptions::waiting(timeouts.field_wait()),
                ))
                .await?;
            if !filled {
                return fail(FailureReason::CredentialFieldNotFound(field.to_string()));
            }
        }

        let submitted = self
            .guard(discovery.find_and_click(
                &page,
                locators.login_submit.as_slice(),
                FindOptions::waiting(timeouts.field_wait()),
            ))
            .await?;
        if !submitted {
            return fail(FailureReason::CredentialFieldNotFound("submit".to_string()));
        }

        self.await_login_redirect().await
    }

    /// Poll until the address leaves the login surface, failing fast on known signatures.
    async fn await_login_redirect(&mut self) -> Step {
        self.enter(WorkflowState::AwaitingLoginRedirect).await?;
        let page = self.main.clone();
        let config = self.config;
        let markers = &config.markers;
        let deadline = Instant::now() + config.timeouts.login_redirect_timeout();

        loop {
            self.dismiss_dialogs(&page).await?;

            match self.guard(self.session.text_content(&Scope::main(page.clone()))).await {
                Ok(text) => {
                    if find_phrase(&text, &markers.credential_rejected).is_some() {
                        return fail(FailureReason::CredentialRejected);
                    }
                    if find_phrase(&text, &markers.challenge).is_some() {
                        return fail(FailureReason::AutomatedChallengeDetected);
                    }
                }
                // Mid-navigation reads fail routinely; the next poll retries.
                Err(Halt::Engine(e)) => debug!(task_id = %self.task.id, "Text read failed: {}", e),
                Err(halt) => return Err(halt),
            }

            match self.guard(self.session.current_url(&page)).await {
                Ok(url) if !is_login_surface(&url, markers) => {
                    info!(task_id = %self.task.id, %url, "Login completed");
                    return Ok(());
                }
                Ok(_) => {}
                Err(Halt::Engine(e)) => debug!(task_id = %self.task.id, "URL read failed: {}", e),
                Err(halt) => return Err(halt),
            }

            if Instant::now() >= deadline {
                return fail(FailureReason::LoginTimedOut);
            }
            self.pause(config.timeouts.login_poll_interval()).await?;
        }
    }

    /// Make sure the main page shows the target, navigating to its canonical address if not.
    pub(super) async fn return_to_target(&mut self) -> Step {
        self.enter(WorkflowState::BackOnTarget).await?;
        let page = self.main.clone();

        let current = self.guard(self.session.current_url(&page)).await?;
        if !is_on_target(&current, &self.task.target) {
            let canonical = canonical_target(&self.task.target);
            info!(task_id = %self.task.id, from = %current, to = %canonical, "Returning to target");
            self.guard(self.session.navigate(
                &page,
                canonical.as_str(),
                self.config.timeouts.navigation(),
            ))
            .await?;
        }

        self.dismiss_dialogs(&page).await
    }
}
