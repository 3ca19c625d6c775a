//! Typed pass outcomes and run planning
//!
//! Phase transitions are communicated as values returned up the call
//! chain: the top-level driver inspects the outcome of each pass instead
//! of catching control-flow exceptions across deep stacks.

use crate::filter::AgeBucket;
use std::collections::BTreeMap;

/// How a harvest or revisit pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The pass ran to the end of its work list
    Completed,

    /// Every credential in the pool is exhausted; the driver must wait
    /// for quota reset and restart the same generation
    QuotaExhausted,

    /// A shutdown signal was observed; progress has been persisted
    Interrupted,
}

/// What the driver should run next, derived from persisted state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPlan {
    /// The initial harvest is incomplete; per-category bucket shortfalls
    Harvest {
        shortfalls: BTreeMap<String, BTreeMap<AgeBucket, usize>>,
    },

    /// All categories are complete; revisit the listed target timestamps
    Revisit {
        generation: u32,
        /// Target timestamp -> the fixed id list frozen at harvest time
        pending: BTreeMap<String, Vec<String>>,
    },

    /// The configured number of growth snapshots has been taken
    GloballyComplete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_equality() {
        assert_eq!(PassOutcome::Completed, PassOutcome::Completed);
        assert_ne!(PassOutcome::Completed, PassOutcome::QuotaExhausted);
    }

    #[test]
    fn test_plan_carries_shortfalls() {
        let mut buckets = BTreeMap::new();
        buckets.insert(AgeBucket::LessOneDay, 3usize);
        let mut shortfalls = BTreeMap::new();
        shortfalls.insert("music".to_string(), buckets);

        let plan = RunPlan::Harvest { shortfalls };
        match plan {
            RunPlan::Harvest { shortfalls } => {
                assert_eq!(shortfalls["music"][&AgeBucket::LessOneDay], 3);
            }
            _ => panic!("expected harvest plan"),
        }
    }
}
