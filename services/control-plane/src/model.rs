//! Records owned by the store.
//!
//! Apps, configs, slugs and releases are value objects: once written they are
//! never edited. Changes always produce a new record.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use armada_id::{AppName, ConfigId, ReleaseId, ReleaseVersion, SlugId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::formation::Formation;

/// Environment variables of a config.
pub type Vars = BTreeMap<String, String>;

/// A pending change to a config: `Some` sets a variable, `None` removes it.
pub type VarsUpdate = BTreeMap<String, Option<String>>;

/// Process type name to command.
pub type ProcessCommands = BTreeMap<String, String>;

/// A named deployable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub name: AppName,
    pub created_at: DateTime<Utc>,
}

impl App {
    pub fn new(name: AppName) -> Self {
        Self {
            name,
            created_at: Utc::now(),
        }
    }
}

/// An immutable set of environment variables for an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub id: ConfigId,
    pub app: AppName,
    pub vars: Vars,
    pub created_at: DateTime<Utc>,
}

impl AppConfig {
    pub fn new(app: AppName, vars: Vars) -> Self {
        Self {
            id: ConfigId::new(),
            app,
            vars,
            created_at: Utc::now(),
        }
    }

    /// Returns the vars that result from applying `update` to this config.
    pub fn apply(&self, update: &VarsUpdate) -> Vars {
        let mut vars = self.vars.clone();
        for (key, value) in update {
            match value {
                Some(value) => {
                    vars.insert(key.clone(), value.clone());
                }
                None => {
                    vars.remove(key);
                }
            }
        }
        vars
    }
}

/// A container image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Image {
    pub repo: String,
    pub tag: String,
}

impl Image {
    pub const DEFAULT_TAG: &'static str = "latest";
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo, self.tag)
    }
}

impl FromStr for Image {
    type Err = Error;

    /// Parses `repo[:tag]`. A colon inside the registry host (`host:5000/repo`)
    /// is not a tag separator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Validation("image reference cannot be empty".into()));
        }

        let (repo, tag) = match s.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => (repo, tag),
            _ => (s, Self::DEFAULT_TAG),
        };

        if repo.is_empty() || tag.is_empty() {
            return Err(Error::Validation(format!("invalid image reference '{s}'")));
        }

        Ok(Self {
            repo: repo.to_string(),
            tag: tag.to_string(),
        })
    }
}

/// An extracted, runnable image and the process types it declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slug {
    pub id: SlugId,
    pub image: Image,
    pub process_types: ProcessCommands,
}

impl Slug {
    pub fn new(image: Image, process_types: ProcessCommands) -> Self {
        Self {
            id: SlugId::new(),
            image,
            process_types,
        }
    }
}

/// An immutable, versioned snapshot of config, slug and formation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: ReleaseId,
    pub app: AppName,
    pub version: ReleaseVersion,
    pub config_id: ConfigId,
    pub slug_id: SlugId,
    pub formation: Formation,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("remind101/acme-inc", "remind101/acme-inc", "latest")]
    #[case("remind101/acme-inc:v2", "remind101/acme-inc", "v2")]
    #[case("registry.local:5000/acme", "registry.local:5000/acme", "latest")]
    #[case("registry.local:5000/acme:abc123", "registry.local:5000/acme", "abc123")]
    fn test_image_parse(#[case] input: &str, #[case] repo: &str, #[case] tag: &str) {
        let image: Image = input.parse().unwrap();
        assert_eq!(image.repo, repo);
        assert_eq!(image.tag, tag);
    }

    #[test]
    fn test_image_parse_rejects_empty() {
        assert!("".parse::<Image>().is_err());
        assert!("acme:".parse::<Image>().is_err());
    }

    #[test]
    fn test_config_apply_sets_and_removes() {
        let app = AppName::parse("web-app").unwrap();
        let config = AppConfig::new(
            app,
            Vars::from([
                ("RAILS_ENV".to_string(), "production".to_string()),
                ("DEBUG".to_string(), "1".to_string()),
            ]),
        );

        let update = VarsUpdate::from([
            ("DEBUG".to_string(), None),
            ("PORT".to_string(), Some("8080".to_string())),
        ]);
        let vars = config.apply(&update);

        assert_eq!(vars.get("RAILS_ENV").map(String::as_str), Some("production"));
        assert_eq!(vars.get("PORT").map(String::as_str), Some("8080"));
        assert!(!vars.contains_key("DEBUG"));
        // The original config is untouched.
        assert!(config.vars.contains_key("DEBUG"));
    }
}
