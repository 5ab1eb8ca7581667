//! Validated application names.
//!
//! An app name is the identity key of an application. It is embedded in job
//! identifiers and scheduler unit names, so the alphabet is restricted to
//! characters that are safe in both.

use std::fmt;
use std::str::FromStr;

use crate::IdError;

const MIN_LEN: usize = 2;
const MAX_LEN: usize = 30;

/// A validated application name.
///
/// Rules: 2 to 30 characters, lowercase ASCII letters, digits and dashes,
/// starting with a letter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppName(String);

impl AppName {
    /// Parses and validates an app name.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let invalid = |reason| IdError::InvalidName {
            name: s.to_string(),
            reason,
        };

        if s.len() < MIN_LEN || s.len() > MAX_LEN {
            return Err(invalid("must be between 2 and 30 characters"));
        }

        if !s.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(invalid("must start with a lowercase letter"));
        }

        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(invalid(
                "may only contain lowercase letters, digits, and dashes",
            ));
        }

        Ok(Self(s.to_string()))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AppName {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for AppName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for AppName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for AppName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_names() {
        for name in ["web-app", "ab", "api2", "a-b-c"] {
            assert!(AppName::parse(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_rejects_bad_names() {
        assert!(matches!(AppName::parse(""), Err(IdError::Empty)));
        for name in ["a", "Web", "1app", "web.app", "web_app", &"a".repeat(31)] {
            assert!(
                matches!(AppName::parse(name), Err(IdError::InvalidName { .. })),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_json_uses_plain_string() {
        let name = AppName::parse("web-app").unwrap();
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"web-app\"");
        assert!(serde_json::from_str::<AppName>("\"Bad Name\"").is_err());
    }

    proptest! {
        #[test]
        fn test_valid_names_never_contain_dots(name in "[a-z][a-z0-9-]{1,29}") {
            let parsed = AppName::parse(&name).unwrap();
            prop_assert!(!parsed.as_str().contains('.'));
            prop_assert_eq!(parsed.as_str(), name.as_str());
        }
    }
}
