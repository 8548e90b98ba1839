//! Page-text and label classification against configured marker phrases.

use crate::config::Markers;

/// Returns the first phrase contained in `haystack`, case-insensitively.
pub fn find_phrase<'p>(haystack: &str, phrases: &'p [String]) -> Option<&'p str> {
    let haystack = haystack.to_lowercase();
    phrases
        .iter()
        .map(String::as_str)
        .find(|phrase| !phrase.is_empty() && haystack.contains(&phrase.to_lowercase()))
}

/// What the label of the primary action control says about the relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    /// The control invites the action ("Connect", "Add friend").
    Available,
    /// Bare noun without a verb ("Friends", "Connected"): the state already holds.
    AlreadySatisfied,
}

pub fn classify_label(label: &str, markers: &Markers) -> LabelKind {
    let words: Vec<String> = label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    let has_word = |list: &[String]| list.iter().any(|m| words.iter().any(|w| w == &m.to_lowercase()));

    if !has_word(&markers.action_verbs) && has_word(&markers.satisfied_nouns) {
        LabelKind::AlreadySatisfied
    } else {
        LabelKind::Available
    }
}

/// Explicit signal found in page text at a popup checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    AlreadyLinked,
    AlreadyPending(String),
    Rejected(String),
}

pub fn scan_signal(text: &str, markers: &Markers) -> Option<Signal> {
    if find_phrase(text, &markers.already_linked).is_some() {
        return Some(Signal::AlreadyLinked);
    }
    if let Some(phrase) = find_phrase(text, &markers.rejection) {
        return Some(Signal::Rejected(phrase.to_string()));
    }
    if let Some(phrase) = find_phrase(text, &markers.already_pending) {
        return Some(Signal::AlreadyPending(phrase.to_string()));
    }
    None
}

/// Unrelated page: site chrome present and no popup vocabulary at all.
pub fn is_wrong_context(text: &str, markers: &Markers) -> bool {
    find_phrase(text, &markers.site_chrome).is_some()
        && find_phrase(text, &markers.action_vocabulary).is_none()
}

pub fn is_login_surface(url: &str, markers: &Markers) -> bool {
    find_phrase(url, &markers.login_url).is_some()
}
