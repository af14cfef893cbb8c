use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::RuntimeStatistic;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DrainError {
    #[error("node count must be at least 1")]
    NoNodes,
    #[error("no runtime estimate for job type {0}")]
    MissingEstimate(String),
}

/// Time for `node_count` identical workers to clear the sampled queue, in days.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrainEstimate {
    pub min_days: f64,
    pub max_days: f64,
    pub job_count: usize,
}

impl DrainEstimate {
    pub const EMPTY: DrainEstimate = DrainEstimate {
        min_days: 0.0,
        max_days: 0.0,
        job_count: 0,
    };
}

/// Sum per-job bounds over the queue and split them across `node_count` parallel drains.
///
/// Each job contributes `max(0, point - spread)` to the lower bound and `point + spread` to the
/// upper bound of its type's estimate. This ignores dependency ordering and node heterogeneity.
pub fn drain_time<'a, I>(
    job_types: I,
    estimates: &HashMap<String, RuntimeStatistic>,
    node_count: u32,
) -> Result<DrainEstimate, DrainError>
where
    I: IntoIterator<Item = &'a str>,
{
    if node_count == 0 {
        return Err(DrainError::NoNodes);
    }

    let mut low = 0.0;
    let mut high = 0.0;
    let mut job_count = 0;
    for job_type in job_types {
        let est = estimates
            .get(job_type)
            .ok_or_else(|| DrainError::MissingEstimate(job_type.to_string()))?;
        low += (est.point - est.spread).max(0.0);
        high += est.point + est.spread;
        job_count += 1;
    }

    let nodes = f64::from(node_count);
    Ok(DrainEstimate {
        min_days: low / nodes,
        max_days: high / nodes,
        job_count,
    })
}

/// Remaining run time of an in-flight job, clamped at zero once it overruns its estimate.
pub fn remaining_days(estimated_runtime: f64, elapsed_days: f64) -> f64 {
    (estimated_runtime - elapsed_days.max(0.0)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(point: f64, spread: f64) -> RuntimeStatistic {
        RuntimeStatistic {
            point,
            spread,
            low: point,
            high: point,
            sample_count: 5,
        }
    }

    #[test]
    fn four_jobs_two_nodes() {
        let estimates = HashMap::from([("Z".to_string(), stat(2.0, 0.5))]);
        let d = drain_time(["Z", "Z", "Z", "Z"], &estimates, 2).unwrap();
        assert_eq!(d, DrainEstimate { min_days: 3.0, max_days: 5.0, job_count: 4 });
    }

    #[test]
    fn lower_bound_clamps_per_job() {
        let estimates = HashMap::from([("w".to_string(), stat(1.0, 3.0))]);
        let d = drain_time(["w", "w"], &estimates, 1).unwrap();
        assert_eq!(d.min_days, 0.0);
        assert_eq!(d.max_days, 8.0);
    }

    #[test]
    fn zero_nodes_rejected() {
        assert_eq!(drain_time(std::iter::empty::<&str>(), &HashMap::new(), 0), Err(DrainError::NoNodes));
    }

    #[test]
    fn empty_queue_is_empty() {
        assert_eq!(drain_time(std::iter::empty::<&str>(), &HashMap::new(), 3).unwrap(), DrainEstimate::EMPTY);
    }

    #[test]
    fn remaining_never_negative() {
        assert_eq!(remaining_days(1.0, 0.25), 0.75);
        assert_eq!(remaining_days(1.0, 2.0), 0.0);
        assert_eq!(remaining_days(1.0, -1.0), 1.0);
    }
}
