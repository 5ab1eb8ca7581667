//! armada control plane library.
//!
//! Turns releases and scale requests into jobs on a cluster scheduler and
//! reports the jobs back. [`Platform`] is the entry point; the `armadactl`
//! binary drives it directly.

pub mod apps;
pub mod config;
pub mod configs;
pub mod db;
pub mod error;
pub mod formation;
pub mod job_states;
pub mod jobs;
pub mod manager;
pub mod model;
pub mod platform;
pub mod releases;
pub mod scheduler;
pub mod slugs;

pub use error::{Error, Result};
pub use platform::Platform;
