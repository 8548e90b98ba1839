//! Queue-driven browser outreach.
//!
//! Tasks ("visit this profile, log in if needed, send a connection request")
//! are submitted to a [`Scheduler`] that runs at most `max_concurrent` of them
//! at once. Each admitted task gets its own automation session and a
//! [`Workflow`] state machine that resolves to exactly one [`Outcome`].
//! Progress and results are published per client session through an
//! [`EventSink`], usually the in-process [`SessionHub`].

pub mod cancellation;
pub mod cdp;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod errors;
pub mod events;
pub mod fingerprint;
pub mod locator;
pub mod queue;
pub mod task;
#[cfg(test)]
mod tests;
pub mod workflow;

pub use cancellation::SessionCancellation;
pub use cdp::CdpEngine;
pub use config::{OutreachConfig, QueueConfig, WorkflowConfig};
pub use discovery::{Discovery, FindOptions, Found};
pub use engine::{AutomationEngine, AutomationSession, ElementRef, PageId, Scope, SessionOptions};
pub use errors::{AutomationError, ConfigError, SubmissionError};
pub use events::{EventSink, SessionEvent, SessionHub, Subscription, TaskResult};
pub use fingerprint::{FingerprintProvider, FixedFingerprint, UserAgentPool};
pub use locator::{Locator, LocatorSet};
pub use queue::{QueueStatus, Scheduler, TaskExecutor};
pub use task::{Task, TaskId, TaskRequest};
pub use workflow::{FailureReason, Outcome, OutcomeKind, Workflow, WorkflowRunner, WorkflowState};
