use serde::{Deserialize, Serialize};

/// Represents ways to locate a control inside a web document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Locator {
    /// CSS selector, e.g. `button[aria-label*='Connect']`
    Css { selector: String },
    /// XPath expression
    XPath { expression: String },
    /// Visible text of an element, optionally restricted to a tag list
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tags: Option<String>,
        #[serde(default)]
        exact: bool,
    },
    /// ARIA role plus optional accessible name
    Role { role: String, name: Option<String> },
    /// Attribute equality, e.g. `name=session_key`
    Attribute { name: String, value: String },
    /// Represents an invalid locator string, with a reason.
    Invalid { reason: String },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css {
            selector: selector.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Locator::Text {
            text: text.into(),
            tags: None,
            exact: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Locator::Invalid { .. })
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css { selector } => write!(f, "css:{selector}"),
            Locator::XPath { expression } => write!(f, "xpath:{expression}"),
            Locator::Text { text, tags, exact } => {
                let prefix = if *exact { "text=" } else { "text:" };
                match tags {
                    Some(tags) => write!(f, "{tags}>>{prefix}{text}"),
                    None => write!(f, "{prefix}{text}"),
                }
            }
            Locator::Role { role, name } => match name {
                Some(name) => write!(f, "role:{role}|{name}"),
                None => write!(f, "role:{role}"),
            },
            Locator::Attribute { name, value } => write!(f, "attr:{name}={value}"),
            Locator::Invalid { reason } => write!(f, "invalid({reason})"),
        }
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        let s = s.trim();

        // "button,a>>text:Connect" restricts a text match to a tag list
        if let Some((tags, rest)) = s.split_once(">>") {
            return match Locator::from(rest) {
                Locator::Text { text, exact, .. } => Locator::Text {
                    text,
                    tags: Some(tags.trim().to_string()),
                    exact,
                },
                _ => Locator::Invalid {
                    reason: format!("Tag restriction only applies to text locators: \"{s}\""),
                },
            };
        }

        let lower = s.to_lowercase();
        match s {
            _ if lower.starts_with("css:") => Locator::css(s[4..].trim()),
            _ if lower.starts_with("xpath:") => Locator::XPath {
                expression: s[6..].trim().to_string(),
            },
            _ if s.starts_with("//") || s.starts_with("(//") => Locator::XPath {
                expression: s.to_string(),
            },
            _ if lower.starts_with("text=") => Locator::Text {
                text: s[5..].trim().to_string(),
                tags: None,
                exact: true,
            },
            _ if lower.starts_with("text:") => Locator::text(s[5..].trim()),
            _ if lower.starts_with("role:") => {
                let rest = &s[5..];
                match rest.split_once('|') {
                    Some((role, name)) => Locator::Role {
                        role: role.trim().to_string(),
                        name: Some(name.trim().to_string()),
                    },
                    None => Locator::Role {
                        role: rest.trim().to_string(),
                        name: None,
                    },
                }
            }
            _ if lower.starts_with("attr:") => match s[5..].split_once('=') {
                Some((name, value)) => Locator::Attribute {
                    name: name.trim().to_string(),
                    value: value.trim().to_string(),
                },
                None => Locator::Invalid {
                    reason: format!("Attribute locator needs name=value: \"{s}\""),
                },
            },
            "" => Locator::Invalid {
                reason: "Empty locator".to_string(),
            },
            _ if s.starts_with('#') || s.starts_with('.') || s.starts_with('[') => Locator::css(s),
            _ => Locator::Invalid {
                reason: format!(
                    "Unknown locator format: \"{s}\". Use prefixes like 'css:', 'xpath:', 'text:', 'text=', 'role:' or 'attr:'."
                ),
            },
        }
    }
}

impl From<String> for Locator {
    fn from(s: String) -> Self {
        Locator::from(s.as_str())
    }
}

/// Priority-ordered list of candidate locators for one logical control.
///
/// Deserializes from a list of locator strings, so config files stay terse.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocatorSet(Vec<Locator>);

impl LocatorSet {
    pub fn new(locators: Vec<Locator>) -> Self {
        Self(locators)
    }

    pub fn as_slice(&self) -> &[Locator] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn invalid(&self) -> impl Iterator<Item = &Locator> {
        self.0.iter().filter(|l| !l.is_valid())
    }
}

impl<S: AsRef<str>> FromIterator<S> for LocatorSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(|s| Locator::from(s.as_ref())).collect())
    }
}

impl Serialize for LocatorSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|l| l.to_string()))
    }
}

impl<'de> Deserialize<'de> for LocatorSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        Ok(raw.iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_locators() {
        assert_eq!(
            Locator::from("css:button.connect"),
            Locator::css("button.connect")
        );
        assert_eq!(Locator::from("text:Connect"), Locator::text("Connect"));
        assert_eq!(
            Locator::from("role:button|Add friend"),
            Locator::Role {
                role: "button".to_string(),
                name: Some("Add friend".to_string())
            }
        );
        assert_eq!(
            Locator::from("attr:name=session_key"),
            Locator::Attribute {
                name: "name".to_string(),
                value: "session_key".to_string()
            }
        );
        assert!(matches!(
            Locator::from("//button[@type='submit']"),
            Locator::XPath { .. }
        ));
        assert_eq!(Locator::from("#username"), Locator::css("#username"));
    }

    #[test]
    fn tag_restricted_text() {
        assert_eq!(
            Locator::from("button,a>>text=Send"),
            Locator::Text {
                text: "Send".to_string(),
                tags: Some("button,a".to_string()),
                exact: true,
            }
        );
        assert!(!Locator::from("button>>css:.x").is_valid());
    }

    #[test]
    fn unknown_formats_are_invalid() {
        assert!(!Locator::from("Connect").is_valid());
        assert!(!Locator::from("").is_valid());
        assert!(!Locator::from("attr:missing-equals").is_valid());
    }

    #[test]
    fn display_round_trips_through_parser() {
        for raw in [
            "css:input[type=password]",
            "text:Log in",
            "button>>text=Send now",
            "role:dialog",
            "attr:name=message",
        ] {
            let parsed = Locator::from(raw);
            assert_eq!(Locator::from(parsed.to_string()), parsed, "{raw}");
        }
    }

    #[test]
    fn locator_set_deserializes_from_strings() {
        let set: LocatorSet = serde_yaml::from_str("- text:Connect\n- css:button.pv-connect\n")
            .expect("valid yaml");
        assert_eq!(set.as_slice().len(), 2);
        assert_eq!(set.invalid().count(), 0);
    }
}
