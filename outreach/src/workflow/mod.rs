//! Per-task state machine: login, return to the target, classify the action
//! control, then drive the connect popup to exactly one terminal outcome.

mod action;
mod login;
mod runner;
pub mod text;

pub use runner::WorkflowRunner;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;
use crate::discovery::Discovery;
use crate::engine::{AutomationSession, PageId, Scope};
use crate::errors::AutomationError;
use crate::events::{EventSink, SessionEvent};
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowState {
    Idle,
    LoggingIn,
    AwaitingLoginRedirect,
    BackOnTarget,
    LocatingAction,
    ActionNotFound,
    AlreadyInDesiredState,
    ActionClicked,
    AwaitingSecondaryContext,
    SecondaryPopupMessageCheck,
    SelectingOption,
    OptionErrorCheck,
    ConfirmingStep1,
    PopupClosedCheck,
    EnteringMessage,
    ConfirmingFinal,
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("login entry point not found")]
    LoginEntryNotFound,
    #[error("credential field not found: {0}")]
    CredentialFieldNotFound(String),
    #[error("credentials rejected")]
    CredentialRejected,
    #[error("automated verification challenge detected")]
    AutomatedChallengeDetected,
    #[error("login did not complete in time")]
    LoginTimedOut,
    #[error("action control not found")]
    ActionControlNotFound,
    #[error("secondary context is not the connect popup")]
    WrongSecondaryContext,
    #[error("request rejected: {0}")]
    OptionRejected(String),
    #[error("request already pending: {0}")]
    RequestAlreadyPending(String),
    #[error("confirmation control not found")]
    ConfirmControlNotFound,
    #[error("cancelled")]
    Cancelled,
    #[error("task timed out")]
    TimedOut,
    #[error("session failed to start: {0}")]
    SessionStart(String),
    #[error("{0}")]
    Automation(String),
}

/// Exactly one of these ends every task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    AlreadyLinked,
    AlreadyPending,
    Failed(FailureReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    Success,
    AlreadyLinked,
    AlreadyPending,
    Failed,
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success => OutcomeKind::Success,
            Outcome::AlreadyLinked => OutcomeKind::AlreadyLinked,
            Outcome::AlreadyPending => OutcomeKind::AlreadyPending,
            Outcome::Failed(_) => OutcomeKind::Failed,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn error(&self) -> Option<String> {
        match self {
            Outcome::Failed(reason) => Some(reason.to_string()),
            _ => None,
        }
    }
}

/// Why the step sequence stopped early.
#[derive(Debug)]
enum Halt {
    Done(Outcome),
    Cancelled,
    Engine(AutomationError),
}

impl From<AutomationError> for Halt {
    fn from(e: AutomationError) -> Self {
        Halt::Engine(e)
    }
}

type Step<T = ()> = Result<T, Halt>;

fn finish<T>(outcome: Outcome) -> Step<T> {
    Err(Halt::Done(outcome))
}

fn fail<T>(reason: FailureReason) -> Step<T> {
    finish(Outcome::Failed(reason))
}

/// One workflow instance, bound to a single task and its session.
pub struct Workflow<'a> {
    task: &'a Task,
    config: &'a WorkflowConfig,
    session: &'a dyn AutomationSession,
    events: &'a dyn EventSink,
    state: WorkflowState,
    main: PageId,
    secondary: Option<PageId>,
    /// Past the option step, a vanished popup means the target settled the request itself.
    option_stage_done: bool,
}

impl<'a> Workflow<'a> {
    pub fn new(
        task: &'a Task,
        config: &'a WorkflowConfig,
        session: &'a dyn AutomationSession,
        events: &'a dyn EventSink,
    ) -> Self {
        Self {
            task,
            config,
            session,
            events,
            state: WorkflowState::Idle,
            main: session.main_page(),
            secondary: None,
            option_stage_done: false,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Drive the task to its terminal outcome. Never panics on engine errors.
    pub async fn run(mut self) -> Outcome {
        let result = self.drive().await;
        let outcome = match result {
            Ok(outcome) | Err(Halt::Done(outcome)) => outcome,
            Err(Halt::Cancelled) => Outcome::Failed(FailureReason::Cancelled),
            Err(Halt::Engine(e)) if self.option_stage_done && e.is_context_gone() => {
                info!(task_id = %self.task.id, "Popup vanished after option step: {}", e);
                Outcome::AlreadyPending
            }
            Err(Halt::Engine(e)) => {
                warn!(
                    task_id = %self.task.id,
                    state = ?self.state,
                    secondary = ?self.secondary,
                    "Workflow failed: {}",
                    e
                );
                Outcome::Failed(FailureReason::Automation(e.to_string()))
            }
        };
        self.state = WorkflowState::Terminal;
        info!(task_id = %self.task.id, outcome = ?outcome, "Workflow finished");
        outcome
    }

    async fn drive(&mut self) -> Step<Outcome> {
        if let Some(credentials) = self.task.credentials.clone() {
            self.login(&credentials.identity, &credentials.secret).await?;
        }
        self.return_to_target().await?;

        let action = self.locate_action().await?;
        if !self.task.action.do_action {
            info!(task_id = %self.task.id, "Visit-only task, leaving action untouched");
            return Ok(Outcome::Success);
        }

        self.click_action(action).await?;
        self.secondary_flow().await
    }

    /// Transition, publishing progress. Every transition is a cancellation check.
    async fn enter(&mut self, state: WorkflowState) -> Step {
        self.enter_with(state, None).await
    }

    async fn enter_with(&mut self, state: WorkflowState, detail: Option<String>) -> Step {
        if self.task.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        debug!(task_id = %self.task.id, from = ?self.state, to = ?state, "Transition");
        self.state = state;
        self.events
            .publish(
                &self.task.session_id,
                SessionEvent::Progress {
                    task_id: self.task.id,
                    target: self.task.target.to_string(),
                    state,
                    detail,
                },
            )
            .await;
        Ok(())
    }

    /// Await an engine call, abandoning it if the task is cancelled.
    async fn guard<T>(&self, fut: impl Future<Output = Result<T, AutomationError>>) -> Step<T> {
        tokio::select! {
            biased;
            _ = self.task.cancel.cancelled() => Err(Halt::Cancelled),
            result = fut => result.map_err(Halt::from),
        }
    }

    async fn pause(&self, duration: Duration) -> Step {
        tokio::select! {
            biased;
            _ = self.task.cancel.cancelled() => Err(Halt::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    fn discovery(&self) -> Discovery<'a> {
        Discovery::new(self.session)
    }

    /// Best-effort dialog dismissal; a failure here is never fatal.
    async fn dismiss_dialogs(&self, page: &PageId) -> Step {
        match self.guard(self.session.accept_dialogs(page)).await {
            Ok(0) => Ok(()),
            Ok(n) => {
                debug!(task_id = %self.task.id, %page, "Accepted {} dialog(s)", n);
                Ok(())
            }
            Err(Halt::Engine(e)) => {
                debug!(task_id = %self.task.id, %page, "Dialog check failed: {}", e);
                Ok(())
            }
            Err(halt) => Err(halt),
        }
    }

    /// Text of a page's main document followed by its frames.
    async fn page_text(&self, page: &PageId) -> Step<String> {
        let mut text = self.guard(self.session.text_content(&Scope::main(page.clone()))).await?;
        let frames = match self.guard(self.session.frames(page)).await {
            Ok(frames) => frames,
            Err(Halt::Engine(_)) => Vec::new(),
            Err(halt) => return Err(halt),
        };
        for frame in frames {
            match self.guard(self.session.text_content(&frame)).await {
                Ok(frame_text) => {
                    text.push('\n');
                    text.push_str(&frame_text);
                }
                // Cross-origin or detached frames are skipped.
                Err(Halt::Engine(_)) => {}
                Err(halt) => return Err(halt),
            }
        }
        Ok(text)
    }
}
