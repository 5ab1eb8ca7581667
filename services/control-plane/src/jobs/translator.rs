//! Translates a desired formation into scheduler operations.
//!
//! The translator is pure: it compares the last confirmed [`ActiveFormation`]
//! and what the scheduler currently reports against the desired formation,
//! and returns an ordered list of operations. Applying them is the manager's
//! job.
//!
//! Operation order:
//! 1. surplus instances of the target release are stopped, highest index
//!    first, so low indices stay stable;
//! 2. known instances the scheduler no longer reports are scheduled again;
//! 3. new instances are started at the top of each sequence;
//! 4. jobs of other releases, or of process types the formation no longer
//!    has, are stopped last so a deploy starts replacements first.

use std::collections::BTreeSet;

use armada_id::{AppName, ReleaseVersion};
use armada_reconcile::IndexPlan;

use super::{JobId, JobSpec};
use crate::formation::{ActiveFormation, Formation};
use crate::model::{Image, Vars};

/// The jobs an app should be running.
#[derive(Debug, Clone)]
pub struct DesiredJobs {
    pub app: AppName,
    pub release_version: ReleaseVersion,
    pub formation: Formation,
    pub image: Image,
    pub env: Vars,
}

impl DesiredJobs {
    fn job_id(&self, process_type: &str, index: u32) -> JobId {
        JobId::new(self.app.clone(), self.release_version, process_type, index)
    }

    fn spec(&self, process_type: &str, command: &str, index: u32) -> JobSpec {
        JobSpec {
            id: self.job_id(process_type, index),
            command: command.to_string(),
            image: self.image.clone(),
            env: self.env.clone(),
        }
    }
}

/// A single scheduler operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOp {
    Schedule(JobSpec),
    Unschedule(JobId),
}

impl JobOp {
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Schedule(spec) => &spec.id,
            Self::Unschedule(id) => id,
        }
    }
}

/// Ordered scheduler operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub ops: Vec<JobOp>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn schedules(&self) -> impl Iterator<Item = &JobSpec> {
        self.ops.iter().filter_map(|op| match op {
            JobOp::Schedule(spec) => Some(spec),
            JobOp::Unschedule(_) => None,
        })
    }

    pub fn unschedules(&self) -> impl Iterator<Item = &JobId> {
        self.ops.iter().filter_map(|op| match op {
            JobOp::Unschedule(id) => Some(id),
            JobOp::Schedule(_) => None,
        })
    }
}

/// Computes the operations that move `current` to `desired`.
///
/// `observed` holds the job ids the scheduler currently reports for the app.
pub fn plan(
    current: Option<&ActiveFormation>,
    desired: &DesiredJobs,
    observed: &BTreeSet<JobId>,
) -> Plan {
    let mut removals = Vec::new();
    let mut repairs = Vec::new();
    let mut additions = Vec::new();

    for (process_type, spec) in desired.formation.iter() {
        let existing = current.map_or(0, |active| {
            active.existing_count(desired.release_version, process_type)
        });

        let indices = IndexPlan::compute(existing, spec.quantity, |index| {
            observed.contains(&desired.job_id(process_type, index))
        });

        removals.extend(
            indices
                .remove
                .iter()
                .map(|&index| JobOp::Unschedule(desired.job_id(process_type, index))),
        );
        repairs.extend(
            indices
                .repair
                .iter()
                .map(|&index| JobOp::Schedule(desired.spec(process_type, &spec.command, index))),
        );
        additions.extend(
            indices
                .add
                .iter()
                .map(|&index| JobOp::Schedule(desired.spec(process_type, &spec.command, index))),
        );
    }

    let mut stale: Vec<&JobId> = current
        .map(|active| {
            active
                .jobs
                .iter()
                .filter(|job| {
                    job.release_version != desired.release_version
                        || !desired.formation.contains(&job.process_type)
                })
                .collect()
        })
        .unwrap_or_default();
    stale.sort_by(|a, b| {
        (a.release_version, &a.process_type)
            .cmp(&(b.release_version, &b.process_type))
            .then(b.index.cmp(&a.index))
    });

    let mut ops = removals;
    ops.extend(repairs);
    ops.extend(additions);
    ops.extend(stale.into_iter().cloned().map(JobOp::Unschedule));

    Plan { ops }
}
