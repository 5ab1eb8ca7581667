//! Formations: which process types run, with what command, how many times.
//!
//! A release carries an immutable formation snapshot. Scaling never touches
//! that snapshot; it produces a new [`ActiveFormation`], the single mutable,
//! versioned record per app describing what was last confirmed scheduled.

use std::collections::{BTreeMap, BTreeSet};

use armada_id::{AppName, FormationSeq, ReleaseVersion};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::jobs::JobId;
use crate::model::Slug;

/// Process type that gets one instance by default on an app's first release.
pub const DEFAULT_PROCESS_TYPE: &str = "web";

/// Largest instance count one process type may be scaled to.
pub const MAX_QUANTITY: u32 = 1_000;

/// Requested instance counts, keyed by process type. Only used as scale input.
pub type ProcessQuantityMap = BTreeMap<String, u32>;

/// Command and desired instance count for one process type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub command: String,
    pub quantity: u32,
}

impl ProcessSpec {
    pub fn new(command: impl Into<String>, quantity: u32) -> Self {
        Self {
            command: command.into(),
            quantity,
        }
    }
}

/// Mapping of process type to [`ProcessSpec`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Formation(BTreeMap<String, ProcessSpec>);

impl Formation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a formation, validating every process type name.
    pub fn from_specs<I, K>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, ProcessSpec)>,
        K: Into<String>,
    {
        let mut formation = Self::new();
        for (process_type, spec) in specs {
            formation.insert(process_type, spec)?;
        }
        Ok(formation)
    }

    /// Adds or replaces a process type.
    pub fn insert(&mut self, process_type: impl Into<String>, spec: ProcessSpec) -> Result<()> {
        let process_type = process_type.into();
        validate_process_type(&process_type)?;
        self.0.insert(process_type, spec);
        Ok(())
    }

    pub fn get(&self, process_type: &str) -> Option<&ProcessSpec> {
        self.0.get(process_type)
    }

    pub fn contains(&self, process_type: &str) -> bool {
        self.0.contains_key(process_type)
    }

    /// Desired count for a process type, zero when absent.
    pub fn quantity(&self, process_type: &str) -> u32 {
        self.0.get(process_type).map_or(0, |spec| spec.quantity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProcessSpec)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn process_types(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of desired instances across all process types.
    pub fn total_quantity(&self) -> u32 {
        self.0.values().map(|spec| spec.quantity).sum()
    }

    /// Rejects quantity maps that mention process types this formation does
    /// not define, or counts above [`MAX_QUANTITY`].
    pub fn validate_quantities(&self, quantities: &ProcessQuantityMap) -> Result<()> {
        if let Some((process_type, quantity)) = quantities.iter().find(|(_, q)| **q > MAX_QUANTITY) {
            return Err(Error::Validation(format!(
                "{process_type}={quantity} exceeds the limit of {MAX_QUANTITY} instances"
            )));
        }

        let unknown: Vec<&str> = quantities
            .keys()
            .filter(|process_type| !self.contains(process_type))
            .map(String::as_str)
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "unknown process type(s): {}",
                unknown.join(", ")
            )))
        }
    }

    /// Returns a copy with the requested counts applied.
    ///
    /// Types not mentioned in `quantities` are unchanged. Keys that this
    /// formation does not define are ignored; call
    /// [`validate_quantities`](Self::validate_quantities) first to reject them.
    pub fn merge(&self, quantities: &ProcessQuantityMap) -> Formation {
        let mut merged = self.clone();
        for (process_type, quantity) in quantities {
            if let Some(spec) = merged.0.get_mut(process_type) {
                spec.quantity = *quantity;
            }
        }
        merged
    }

    /// Initial formation for a release built from `slug`.
    ///
    /// Process types and commands come from the slug. Counts are carried over
    /// from `prior` (the previous release's active formation) where the type
    /// already existed; otherwise [`DEFAULT_PROCESS_TYPE`] starts at 1 and
    /// every other type at 0.
    pub fn from_slug(slug: &Slug, prior: Option<&Formation>) -> Result<Self> {
        let mut formation = Self::new();
        for (process_type, command) in &slug.process_types {
            let quantity = match prior.and_then(|f| f.get(process_type)) {
                Some(spec) => spec.quantity,
                None if prior.is_none() && process_type == DEFAULT_PROCESS_TYPE => 1,
                None => 0,
            };
            formation.insert(process_type.clone(), ProcessSpec::new(command.clone(), quantity))?;
        }
        Ok(formation)
    }
}

/// Validates a process type name. Dots are rejected because process types
/// are embedded in job identifiers.
pub fn validate_process_type(process_type: &str) -> Result<()> {
    let valid = !process_type.is_empty()
        && process_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "invalid process type '{process_type}': use letters, digits, '-' or '_'"
        )))
    }
}

/// The formation an app is actually running, as last confirmed by the
/// scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveFormation {
    pub app: AppName,

    /// Release the formation belongs to.
    pub release_version: ReleaseVersion,

    /// Commands from the release; quantities are the achieved counts.
    pub formation: Formation,

    /// Jobs confirmed scheduled. May include jobs of an older release that
    /// have not been stopped yet.
    pub jobs: BTreeSet<JobId>,
}

impl ActiveFormation {
    /// Builds the record for `jobs`, setting each process type's quantity to
    /// the number of contiguous jobs of `release_version` it has.
    pub fn from_jobs(
        app: AppName,
        release_version: ReleaseVersion,
        commands: &Formation,
        jobs: BTreeSet<JobId>,
    ) -> Self {
        let mut formation = commands.clone();
        for (process_type, spec) in formation.0.iter_mut() {
            spec.quantity = contiguous_count(&jobs, release_version, process_type);
        }

        Self {
            app,
            release_version,
            formation,
            jobs,
        }
    }

    /// Highest known index plus one for `process_type` jobs of `version`.
    pub fn existing_count(&self, version: ReleaseVersion, process_type: &str) -> u32 {
        self.jobs
            .iter()
            .filter(|job| job.release_version == version && job.process_type == process_type)
            .map(|job| job.index + 1)
            .max()
            .unwrap_or(0)
    }
}

fn contiguous_count(jobs: &BTreeSet<JobId>, version: ReleaseVersion, process_type: &str) -> u32 {
    let indices: BTreeSet<u32> = jobs
        .iter()
        .filter(|job| job.release_version == version && job.process_type == process_type)
        .map(|job| job.index)
        .collect();

    (0..).take_while(|i| indices.contains(i)).count() as u32
}

/// An [`ActiveFormation`] together with the stamp it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampedFormation {
    pub active: ActiveFormation,
    pub seq: FormationSeq,
}
