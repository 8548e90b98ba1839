//! Tunable timeouts, page-text vocabularies and locator candidates.
//!
//! Every field has a default so a YAML file only needs the keys it overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::locator::LocatorSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutreachConfig {
    pub queue: QueueConfig,
    pub workflow: WorkflowConfig,
}

impl OutreachConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: OutreachConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "queue.max_concurrent must be at least 1".to_string(),
            ));
        }
        self.workflow.locators.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_concurrent: usize,
    /// Reject submissions once this many tasks are waiting. `None` keeps the queue unbounded.
    pub max_pending: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_pending: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub timeouts: Timeouts,
    pub markers: Markers,
    pub locators: Locators,
}

/// All waits are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub navigation_ms: u64,
    /// Per-candidate wait when looking for login form fields.
    pub field_wait_ms: u64,
    /// Per-candidate wait when looking for the primary action and popup controls.
    pub control_wait_ms: u64,
    pub login_poll_interval_ms: u64,
    pub login_redirect_timeout_ms: u64,
    /// Pause after clicking the action control before looking for the popup.
    pub secondary_settle_ms: u64,
    /// Pause between popup steps.
    pub step_settle_ms: u64,
    /// Ceiling for one whole task.
    pub task_timeout_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation_ms: 30_000,
            field_wait_ms: 3_000,
            control_wait_ms: 5_000,
            login_poll_interval_ms: 1_000,
            login_redirect_timeout_ms: 60_000,
            secondary_settle_ms: 2_000,
            step_settle_ms: 1_000,
            task_timeout_ms: 180_000,
        }
    }
}

impl Timeouts {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn field_wait(&self) -> Duration {
        Duration::from_millis(self.field_wait_ms)
    }

    pub fn control_wait(&self) -> Duration {
        Duration::from_millis(self.control_wait_ms)
    }

    pub fn login_poll_interval(&self) -> Duration {
        Duration::from_millis(self.login_poll_interval_ms)
    }

    pub fn login_redirect_timeout(&self) -> Duration {
        Duration::from_millis(self.login_redirect_timeout_ms)
    }

    pub fn secondary_settle(&self) -> Duration {
        Duration::from_millis(self.secondary_settle_ms)
    }

    pub fn step_settle(&self) -> Duration {
        Duration::from_millis(self.step_settle_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }
}

/// Lower-case phrases matched against page text, URLs and control labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Markers {
    /// Address fragments that mean we are still on the login surface.
    pub login_url: Vec<String>,
    pub credential_rejected: Vec<String>,
    pub challenge: Vec<String>,
    /// Words that make an action label an invitation to act.
    pub action_verbs: Vec<String>,
    /// Words that, without any verb, mean the relationship already holds.
    pub satisfied_nouns: Vec<String>,
    pub already_linked: Vec<String>,
    pub already_pending: Vec<String>,
    pub rejection: Vec<String>,
    /// Navigation landmarks of an unrelated page.
    pub site_chrome: Vec<String>,
    /// Vocabulary expected inside the connect popup.
    pub action_vocabulary: Vec<String>,
}

fn phrases(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            login_url: phrases(&["/login", "/signin", "/sign-in", "/uas/login", "/auth/"]),
            credential_rejected: phrases(&[
                "wrong password",
                "incorrect password",
                "that's not the right password",
                "invalid email or password",
                "couldn't find an account",
            ]),
            challenge: phrases(&[
                "captcha",
                "security verification",
                "let's do a quick security check",
                "verify you're human",
                "unusual activity",
            ]),
            action_verbs: phrases(&["add", "connect", "follow", "invite", "send"]),
            satisfied_nouns: phrases(&["friend", "friends", "connected", "connection", "following"]),
            already_linked: phrases(&[
                "already friends",
                "already connected",
                "you are now connected",
                "1st degree connection",
            ]),
            already_pending: phrases(&[
                "invitation sent",
                "request sent",
                "already sent an invitation",
                "invitation pending",
            ]),
            rejection: phrases(&[
                "does not accept invitations",
                "isn't accepting",
                "only accepts invitations from",
                "prefers to be contacted by email",
            ]),
            site_chrome: phrases(&["my network", "notifications", "messaging", "sign out", "home"]),
            action_vocabulary: phrases(&[
                "connect",
                "invite",
                "how do you know",
                "add a note",
                "friend request",
                "send",
            ]),
        }
    }
}

/// Candidate locators for each control the workflow touches, highest priority first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Locators {
    pub login_entry: LocatorSet,
    pub identity_field: LocatorSet,
    pub secret_field: LocatorSet,
    pub login_submit: LocatorSet,
    pub action_button: LocatorSet,
    pub relationship_option: LocatorSet,
    pub confirm_step: LocatorSet,
    pub add_message: LocatorSet,
    pub message_field: LocatorSet,
    pub confirm_final: LocatorSet,
}

impl Default for Locators {
    fn default() -> Self {
        Self {
            login_entry: [
                "a,button>>text=Sign in",
                "a,button>>text=Log in",
                "css:a[href*='login']",
                "css:a[href*='signin']",
            ]
            .into_iter()
            .collect(),
            identity_field: [
                "css:input#username",
                "css:input[name='session_key']",
                "css:input[autocomplete='username']",
                "css:input[type='email']",
                "css:input[name='email']",
            ]
            .into_iter()
            .collect(),
            secret_field: [
                "css:input#password",
                "css:input[name='session_password']",
                "css:input[type='password']",
            ]
            .into_iter()
            .collect(),
            login_submit: [
                "css:button[type='submit']",
                "css:input[type='submit']",
                "button>>text=Sign in",
                "button>>text=Log in",
            ]
            .into_iter()
            .collect(),
            action_button: [
                "css:main button[aria-label*='connect' i]",
                "css:main button[aria-label*='friend' i]",
                "button>>text=Connect",
                "button>>text=Add friend",
                "button>>text=Connected",
                "button>>text=Friends",
            ]
            .into_iter()
            .collect(),
            relationship_option: [
                "css:[role='dialog'] input[value='friend']",
                "css:[role='dialog'] button[aria-label*='friend' i]",
                "label,button>>text=Friend",
            ]
            .into_iter()
            .collect(),
            confirm_step: [
                "css:[role='dialog'] button[aria-label*='connect' i]",
                "css:[role='dialog'] button.artdeco-button--primary",
                "button>>text=Next",
                "button>>text=Continue",
            ]
            .into_iter()
            .collect(),
            add_message: [
                "css:[role='dialog'] button[aria-label*='add a note' i]",
                "button>>text=Add a note",
            ]
            .into_iter()
            .collect(),
            message_field: [
                "css:textarea[name='message']",
                "css:textarea#custom-message",
                "css:[role='dialog'] textarea",
            ]
            .into_iter()
            .collect(),
            confirm_final: [
                "css:[role='dialog'] button[aria-label*='send' i]",
                "button>>text=Send",
                "button>>text=Send invitation",
                "button>>text=Done",
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl Locators {
    fn validate(&self) -> Result<(), ConfigError> {
        let sets = [
            ("login_entry", &self.login_entry),
            ("identity_field", &self.identity_field),
            ("secret_field", &self.secret_field),
            ("login_submit", &self.login_submit),
            ("action_button", &self.action_button),
            ("relationship_option", &self.relationship_option),
            ("confirm_step", &self.confirm_step),
            ("add_message", &self.add_message),
            ("message_field", &self.message_field),
            ("confirm_final", &self.confirm_final),
        ];
        for (name, set) in sets {
            if set.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "locators.{name} needs at least one candidate"
                )));
            }
            if let Some(bad) = set.invalid().next() {
                return Err(ConfigError::Invalid(format!("locators.{name}: {bad}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        OutreachConfig::default()
            .validate()
            .expect("default config validates");
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = OutreachConfig::from_yaml_str(
            "queue:\n  max_concurrent: 5\nworkflow:\n  timeouts:\n    navigation_ms: 1000\n",
        )
        .expect("valid config");
        assert_eq!(config.queue.max_concurrent, 5);
        assert_eq!(config.queue.max_pending, None);
        assert_eq!(config.workflow.timeouts.navigation(), Duration::from_secs(1));
        assert_eq!(config.workflow.timeouts.field_wait_ms, 3_000);
        assert!(!config.workflow.locators.action_button.is_empty());
    }

    #[test]
    fn rejects_bad_locator_and_zero_concurrency() {
        let err = OutreachConfig::from_yaml_str(
            "workflow:\n  locators:\n    confirm_final:\n      - Send\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("confirm_final"), "{err}");

        let err = OutreachConfig::from_yaml_str("queue:\n  max_concurrent: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
