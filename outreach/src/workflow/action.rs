use tracing::{debug, info, warn};

use super::text::{classify_label, find_phrase, is_wrong_context, scan_signal, LabelKind, Signal};
use super::{fail, finish, FailureReason, Halt, Outcome, Step, Workflow, WorkflowState};
use crate::discovery::{FindOptions, Found};
use crate::engine::PageId;

impl Workflow<'_> {
    /// Find the primary action control and decide from its label whether the
    /// relationship already holds.
    pub(super) async fn locate_action(&mut self) -> Step<Found> {
        self.enter(WorkflowState::LocatingAction).await?;
        let config = self.config;
        let page = self.main.clone();

        let found = self
            .guard(self.discovery().find_in_page(
                &page,
                config.locators.action_button.as_slice(),
                FindOptions::waiting(config.timeouts.control_wait()),
            ))
            .await?;
        let Some(found) = found else {
            self.enter(WorkflowState::ActionNotFound).await?;
            return fail(FailureReason::ActionControlNotFound);
        };

        let label = match self.guard(self.session.element_text(&found.element)).await {
            Ok(label) => label,
            Err(Halt::Engine(e)) => {
                debug!(task_id = %self.task.id, "Could not read action label: {}", e);
                String::new()
            }
            Err(halt) => return Err(halt),
        };

        match classify_label(&label, &config.markers) {
            LabelKind::AlreadySatisfied => {
                info!(task_id = %self.task.id, label = label.trim(), "Relationship already holds");
                self.enter_with(WorkflowState::AlreadyInDesiredState, Some(label.trim().to_string()))
                    .await?;
                finish(Outcome::AlreadyLinked)
            }
            LabelKind::Available => {
                debug!(task_id = %self.task.id, locator = %found.locator, label = label.trim(), "Action available");
                Ok(found)
            }
        }
    }

    pub(super) async fn click_action(&mut self, action: Found) -> Step {
        let page = self.main.clone();

        match self.guard(self.session.click(&action.element)).await {
            Ok(()) => {}
            // The control re-rendered between lookup and click; search again.
            Err(Halt::Engine(e)) => {
                warn!(task_id = %self.task.id, locator = %action.locator, "Action click failed, retrying discovery: {}", e);
                let clicked = self
                    .guard(self.discovery().find_and_click(
                        &page,
                        self.config.locators.action_button.as_slice(),
                        FindOptions::immediate(),
                    ))
                    .await?;
                if !clicked {
                    self.enter(WorkflowState::ActionNotFound).await?;
                    return fail(FailureReason::ActionControlNotFound);
                }
            }
            Err(halt) => return Err(halt),
        }

        self.enter_with(WorkflowState::ActionClicked, Some(action.locator.to_string()))
            .await
    }

    /// Drive the connect popup from its appearance to the final confirmation.
    pub(super) async fn secondary_flow(&mut self) -> Step<Outcome> {
        let config = self.config;
        let task = self.task;
        let locators = &config.locators;
        let timeouts = &config.timeouts;
        let discovery = self.discovery();

        self.enter(WorkflowState::AwaitingSecondaryContext).await?;
        self.pause(timeouts.secondary_settle()).await?;
        let popup = self.resolve_secondary().await?;

        self.enter(WorkflowState::SecondaryPopupMessageCheck).await?;
        let text = self.page_text(&popup).await?;
        if is_wrong_context(&text, &config.markers) {
            return fail(FailureReason::WrongSecondaryContext);
        }
        self.checkpoint(&text)?;

        self.enter(WorkflowState::SelectingOption).await?;
        self.select_option(&popup).await?;
        self.option_stage_done = true;

        self.enter(WorkflowState::OptionErrorCheck).await?;
        self.pause(timeouts.step_settle()).await?;
        self.ensure_popup_open(&popup).await?;
        let text = self.page_text(&popup).await?;
        self.checkpoint(&text)?;

        self.enter(WorkflowState::ConfirmingStep1).await?;
        let confirmed = self
            .guard(discovery.find_and_click(
                &popup,
                locators.confirm_step.as_slice(),
                FindOptions::waiting(timeouts.control_wait()),
            ))
            .await?;
        if !confirmed {
            debug!(task_id = %self.task.id, "No intermediate confirmation, continuing");
        }

        self.enter(WorkflowState::PopupClosedCheck).await?;
        self.pause(timeouts.step_settle()).await?;
        self.ensure_popup_open(&popup).await?;

        if let Some(message) = task.action.message.as_deref() {
            self.enter(WorkflowState::EnteringMessage).await?;
            self.enter_message(&popup, message).await?;
        }

        self.enter(WorkflowState::ConfirmingFinal).await?;
        let sent = self
            .guard(discovery.find_and_click(
                &popup,
                locators.confirm_final.as_slice(),
                FindOptions::waiting(timeouts.control_wait()),
            ))
            .await?;
        if !sent {
            self.ensure_popup_open(&popup).await?;
            return fail(FailureReason::ConfirmControlNotFound);
        }

        info!(task_id = %self.task.id, "Request sent");
        Ok(Outcome::Success)
    }

    /// Newest page when the click opened one, otherwise the main page hosts an inline modal.
    async fn resolve_secondary(&mut self) -> Step<PageId> {
        let pages = self.guard(self.session.pages()).await?;
        let popup = match pages.last() {
            Some(newest) if pages.len() > 1 => newest.clone(),
            _ => self.main.clone(),
        };
        debug!(task_id = %self.task.id, %popup, open_pages = pages.len(), "Secondary context resolved");
        self.dismiss_dialogs(&popup).await?;
        self.secondary = Some(popup.clone());
        Ok(popup)
    }

    /// Explicit terminal phrasing in the popup ends the task before the happy path continues.
    /// Only a silent disappearance counts as `AlreadyPending`; pending wording is a failure.
    fn checkpoint(&self, text: &str) -> Step {
        match scan_signal(text, &self.config.markers) {
            Some(Signal::AlreadyLinked) => finish(Outcome::AlreadyLinked),
            Some(Signal::AlreadyPending(phrase)) => fail(FailureReason::RequestAlreadyPending(phrase)),
            Some(Signal::Rejected(phrase)) => fail(FailureReason::OptionRejected(phrase)),
            None => Ok(()),
        }
    }

    async fn select_option(&mut self, popup: &PageId) -> Step {
        let config = self.config;
        let candidates = config.locators.relationship_option.as_slice();
        let found = self
            .guard(self.discovery().find_in_page(
                popup,
                candidates,
                FindOptions::waiting(config.timeouts.control_wait()),
            ))
            .await?;
        let Some(option) = found else {
            debug!(task_id = %self.task.id, "No relationship option offered");
            return Ok(());
        };

        match self.guard(self.session.is_disabled(&option.element)).await {
            Ok(true) => {
                debug!(task_id = %self.task.id, locator = %option.locator, "Option already selected");
                return Ok(());
            }
            Ok(false) => {}
            Err(Halt::Engine(e)) => debug!(task_id = %self.task.id, "Could not read option state: {}", e),
            Err(halt) => return Err(halt),
        }

        match self.guard(self.session.click(&option.element)).await {
            Ok(()) => Ok(()),
            Err(Halt::Engine(e)) => {
                warn!(task_id = %self.task.id, locator = %option.locator, "Option click failed, retrying discovery: {}", e);
                let clicked = self
                    .guard(self.discovery().find_and_click(popup, candidates, FindOptions::immediate()))
                    .await?;
                if !clicked {
                    warn!(task_id = %self.task.id, "Option gone on retry, continuing without a selection");
                }
                Ok(())
            }
            Err(halt) => Err(halt),
        }
    }

    async fn enter_message(&mut self, popup: &PageId, message: &str) -> Step {
        let config = self.config;
        let discovery = self.discovery();

        let expanded = self
            .guard(discovery.find_and_click(
                popup,
                config.locators.add_message.as_slice(),
                FindOptions::immediate(),
            ))
            .await?;
        if expanded {
            self.pause(config.timeouts.step_settle()).await?;
        }

        let filled = self
            .guard(discovery.find_and_fill(
                popup,
                config.locators.message_field.as_slice(),
                message,
                FindOptions::waiting(config.timeouts.field_wait()),
            ))
            .await?;
        if !filled {
            warn!(task_id = %self.task.id, "Message field not found, sending without a note");
        }
        Ok(())
    }

    /// A popup that closed on its own after the option step means the target settled the request.
    ///
    /// An inline modal shares the main page, which never closes; it counts as
    /// gone once none of the popup vocabulary is left in the page text.
    async fn ensure_popup_open(&self, popup: &PageId) -> Step {
        if self.task.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        if !self.session.is_open(popup).await {
            info!(task_id = %self.task.id, %popup, "Popup closed without a signal");
            return finish(Outcome::AlreadyPending);
        }
        if *popup == self.main {
            let text = self.page_text(popup).await?;
            if find_phrase(&text, &self.config.markers.action_vocabulary).is_none() {
                info!(task_id = %self.task.id, "Inline modal dismissed without a signal");
                return finish(Outcome::AlreadyPending);
            }
        }
        Ok(())
    }
}
