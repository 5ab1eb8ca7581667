//! `record_ids!`, the generator behind the prefixed ULID types in `types.rs`.

use ulid::Ulid;

use crate::IdError;

/// Declares record id newtypes rendered as `{prefix}_{ulid}`.
///
/// ```ignore
/// record_ids! {
///     /// Identifies a slug.
///     SlugId => "slug",
/// }
/// ```
#[macro_export]
macro_rules! record_ids {
    ($($(#[$meta:meta])* $name:ident => $prefix:literal),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
            pub struct $name($crate::Ulid);

            impl $name {
                pub const PREFIX: &'static str = $prefix;

                /// A fresh id. Ids created later sort after earlier ones.
                #[must_use]
                pub fn new() -> Self {
                    Self($crate::Ulid::new())
                }

                pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                    $crate::parse_prefixed(s, Self::PREFIX).map(Self)
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}_{}", Self::PREFIX, self.0)
                }
            }

            impl std::str::FromStr for $name {
                type Err = $crate::IdError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    Self::parse(s)
                }
            }

            impl serde::Serialize for $name {
                fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    serializer.collect_str(self)
                }
            }

            impl<'de> serde::Deserialize<'de> for $name {
                fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                    let raw = String::deserialize(deserializer)?;
                    raw.parse().map_err(serde::de::Error::custom)
                }
            }
        )+
    };
}

/// Splits `{prefix}_{ulid}` and checks the prefix before decoding the ULID.
#[doc(hidden)]
pub fn parse_prefixed(s: &str, expected: &'static str) -> Result<Ulid, IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }

    let (prefix, raw) = s.split_once('_').ok_or(IdError::MissingSeparator)?;
    if prefix != expected {
        return Err(IdError::InvalidPrefix {
            expected,
            actual: prefix.to_string(),
        });
    }

    raw.parse()
        .map_err(|e: ulid::DecodeError| IdError::InvalidUlid(e.to_string()))
}
