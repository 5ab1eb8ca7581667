//! Convergence primitives.
//!
//! This library holds the pure decision logic used when converging the
//! scheduled instances of a process type to a desired count. Key concepts:
//!
//! - **Existing count**: how many instances were last confirmed scheduled.
//!   Instances are numbered contiguously from 0.
//! - **Desired count**: how many instances should exist.
//! - **Present**: which of the existing instances the scheduler still reports.
//!
//! # Invariants
//!
//! - Decisions are deterministic given the same inputs
//! - Indices stay contiguous: scale-down removes from the top, scale-up
//!   appends at the top, and holes below the top are repaired first

use std::time::Duration;

/// Index-level plan for one process type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexPlan {
    /// Indices to stop, highest first.
    pub remove: Vec<u32>,

    /// Indices that should exist but are not present, lowest first.
    pub repair: Vec<u32>,

    /// New indices to start, lowest first.
    pub add: Vec<u32>,
}

impl IndexPlan {
    /// Compute the index plan for moving from `existing` to `desired`
    /// instances.
    ///
    /// `present` reports whether an index below `existing` is still observed.
    /// Only indices that survive the change (`< min(existing, desired)`) are
    /// considered for repair; missing indices that are about to be removed
    /// are still listed in `remove` so the stop is issued regardless.
    pub fn compute<F>(existing: u32, desired: u32, present: F) -> Self
    where
        F: Fn(u32) -> bool,
    {
        let kept = existing.min(desired);

        Self {
            remove: (desired..existing).rev().collect(),
            repair: (0..kept).filter(|i| !present(*i)).collect(),
            add: (existing..desired).collect(),
        }
    }

    /// Returns true if nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.repair.is_empty() && self.add.is_empty()
    }
}

/// Bounded exponential backoff for retrying idempotent calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_backoff: Duration,

    /// Upper bound for any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Returns true if another attempt is allowed after `attempt` attempts
    /// have been made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff.saturating_mul(1u32 << exponent);
        delay.min(self.max_backoff)
    }

    /// Time one attempt may take so that every attempt, plus the delays
    /// between them, fits in `budget`.
    ///
    /// When the delays alone exceed the budget, the budget is split evenly
    /// between attempts instead.
    pub fn attempt_timeout(&self, budget: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        let delays: Duration = (1..attempts).map(|attempt| self.backoff(attempt)).sum();
        let available = if delays < budget { budget - delays } else { budget };
        available / attempts
    }
}

/// Default attempts for idempotent scheduler calls.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case::scale_up_from_zero(0, 3, vec![], vec![], vec![0, 1, 2])]
    #[case::scale_up(1, 3, vec![], vec![], vec![1, 2])]
    #[case::scale_down(3, 1, vec![2, 1], vec![], vec![])]
    #[case::scale_to_zero(2, 0, vec![1, 0], vec![], vec![])]
    #[case::unchanged(2, 2, vec![], vec![], vec![])]
    fn test_index_plan_all_present(
        #[case] existing: u32,
        #[case] desired: u32,
        #[case] remove: Vec<u32>,
        #[case] repair: Vec<u32>,
        #[case] add: Vec<u32>,
    ) {
        let plan = IndexPlan::compute(existing, desired, |_| true);
        assert_eq!(plan, IndexPlan { remove, repair, add });
    }

    #[test]
    fn test_index_plan_repairs_hole_before_adding() {
        let plan = IndexPlan::compute(3, 5, |i| i != 1);
        assert_eq!(plan.repair, vec![1]);
        assert_eq!(plan.add, vec![3, 4]);
        assert!(plan.remove.is_empty());
    }

    #[test]
    fn test_index_plan_ignores_missing_index_being_removed() {
        let plan = IndexPlan::compute(3, 1, |i| i != 2);
        assert_eq!(plan.remove, vec![2, 1]);
        assert!(plan.repair.is_empty());
    }

    #[test]
    fn test_index_plan_empty() {
        assert!(IndexPlan::compute(4, 4, |_| true).is_empty());
        assert!(!IndexPlan::compute(4, 4, |i| i != 0).is_empty());
    }

    #[test]
    fn test_retry_policy_backoff() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };

        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_policy_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::none().should_retry(1));
    }

    #[test]
    fn test_attempt_timeout_leaves_room_for_retries() {
        // 3 attempts with 200ms + 400ms between them.
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.attempt_timeout(Duration::from_secs(30)),
            Duration::from_millis(9_800)
        );
        assert_eq!(
            RetryPolicy::none().attempt_timeout(Duration::from_secs(30)),
            Duration::from_secs(30)
        );
        assert_eq!(
            policy.attempt_timeout(Duration::from_millis(300)),
            Duration::from_millis(100)
        );
    }

    proptest! {
        #[test]
        fn test_index_plan_keeps_indices_contiguous(existing in 0u32..50, desired in 0u32..50) {
            let plan = IndexPlan::compute(existing, desired, |_| true);

            // Survivors are [0, existing) minus removals, plus additions.
            let mut indices: Vec<u32> = (0..existing)
                .filter(|i| !plan.remove.contains(i))
                .chain(plan.add.iter().copied())
                .collect();
            indices.sort_unstable();

            prop_assert_eq!(indices, (0..desired).collect::<Vec<_>>());
            prop_assert!(plan.remove.windows(2).all(|w| w[0] > w[1]));
        }
    }
}
