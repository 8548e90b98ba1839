//! Client identity strings presented by each automation session.

use rand::seq::SliceRandom;

/// Supplies a plausible client identity for a new session.
pub trait FingerprintProvider: Send + Sync {
    fn fingerprint(&self) -> String;
}

const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36 Edg/128.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
];

/// Random pick from a pool of desktop user agents.
#[derive(Debug, Clone)]
pub struct UserAgentPool {
    agents: Vec<String>,
}

impl UserAgentPool {
    pub fn new(agents: Vec<String>) -> Self {
        Self { agents }
    }
}

impl Default for UserAgentPool {
    fn default() -> Self {
        Self::new(DESKTOP_USER_AGENTS.iter().map(|ua| ua.to_string()).collect())
    }
}

impl FingerprintProvider for UserAgentPool {
    fn fingerprint(&self) -> String {
        self.agents
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| DESKTOP_USER_AGENTS[0].to_string())
    }
}

/// Always the same identity.
#[derive(Debug, Clone)]
pub struct FixedFingerprint(pub String);

impl FingerprintProvider for FixedFingerprint {
    fn fingerprint(&self) -> String {
        self.0.clone()
    }
}
