//! # armada-id
//!
//! Typed identifiers and names for the armada control plane.
//!
//! ## Design Principles
//!
//! - Record IDs are system-generated; app names are user-controlled keys
//! - Every ID and name has a canonical string form with strict parsing
//! - Types are distinct so a `SlugId` can never be passed where a `ConfigId`
//!   is expected
//!
//! ## ID Format
//!
//! Record IDs use a prefixed format: `{prefix}_{ulid}`
//!
//! Examples:
//! - `cfg_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `slug_01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//! - `rel_01HV4Z4NYPLTRS0JTUA8XDME5F`
//!
//! Release versions and formation sequence numbers are plain integers with
//! their own newtypes.

mod error;
mod macros;
mod name;
mod types;

pub use error::IdError;
#[doc(hidden)]
pub use macros::parse_prefixed;
pub use name::AppName;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
