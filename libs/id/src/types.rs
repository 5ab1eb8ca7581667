//! Typed ID definitions for control plane records.
//!
//! Each ID type has a unique prefix that identifies the record type.
//! IDs are ULID-based for sortability and uniqueness.

use crate::record_ids;
use crate::IdError;

record_ids! {
    /// Identifies an immutable config (a set of vars).
    ConfigId => "cfg",
    /// Identifies a slug extracted from an image.
    SlugId => "slug",
    /// Identifies a release record. Releases are addressed by version too.
    ReleaseId => "rel",
    /// Correlates the log lines of one operation.
    RequestId => "req",
}

// =============================================================================
// Release Version
// =============================================================================

/// Per-app release version. Starts at 1 and only ever increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseVersion(u32);

impl ReleaseVersion {
    /// The version of an app's first release.
    pub const FIRST: Self = Self(1);

    /// Creates a version from a raw number.
    #[must_use]
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// Returns the underlying number.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Returns the version that follows this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the version following `last`, or `FIRST` when there is none.
    #[must_use]
    pub fn after(last: Option<Self>) -> Self {
        last.map_or(Self::FIRST, |v| v.next())
    }

    /// Parses the `v{n}` form used in job identifiers.
    pub fn parse_tagged(s: &str) -> Result<Self, IdError> {
        let digits = s
            .strip_prefix('v')
            .ok_or_else(|| IdError::InvalidNumber(s.to_string()))?;
        digits
            .parse()
            .map(Self)
            .map_err(|_| IdError::InvalidNumber(s.to_string()))
    }
}

impl std::fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u32> for ReleaseVersion {
    fn from(version: u32) -> Self {
        Self(version)
    }
}

impl From<ReleaseVersion> for u32 {
    fn from(version: ReleaseVersion) -> Self {
        version.0
    }
}

impl serde::Serialize for ReleaseVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ReleaseVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let version = u32::deserialize(deserializer)?;
        Ok(Self(version))
    }
}

// =============================================================================
// Formation Sequence Number
// =============================================================================

/// Optimistic-concurrency stamp of an app's active formation.
///
/// Writers supply the stamp they read; the store rejects the write if the
/// stored stamp has moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormationSeq(i64);

impl FormationSeq {
    /// The stamp of a freshly inserted formation.
    pub const FIRST: Self = Self(1);

    /// Creates a stamp from a raw number.
    #[must_use]
    pub const fn new(seq: i64) -> Self {
        Self(seq)
    }

    /// Returns the underlying number.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// Returns the next stamp.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for FormationSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for FormationSeq {
    fn from(seq: i64) -> Self {
        Self(seq)
    }
}

impl serde::Serialize for FormationSeq {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for FormationSeq {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let seq = i64::deserialize(deserializer)?;
        Ok(Self(seq))
    }
}

// =============================================================================
// Tests
// =============================================================================
