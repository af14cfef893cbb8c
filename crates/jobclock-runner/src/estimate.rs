use jobclock_core::{CostEstimate, RuntimeStatistic};
use jobclock_storage::Mirror;
use tracing::{debug, warn};

/// Anything that can produce runtime statistics for a (type, instance) query.
pub trait RuntimeModel {
    fn estimate(&self, job_type: &str, instance: &str, sample_limit: usize) -> RuntimeStatistic;
}

/// Runtime statistics over the newest `sample_limit` matching mirror rows.
///
/// Storage failures are logged and answered with [`RuntimeStatistic::NO_DATA`], so callers see
/// "no history" rather than an error. Use the mirror directly when the distinction matters.
pub struct RuntimeEstimator<'a, M: Mirror + ?Sized> {
    mirror: &'a M,
}

impl<'a, M: Mirror + ?Sized> RuntimeEstimator<'a, M> {
    pub fn new(mirror: &'a M) -> Self {
        Self { mirror }
    }

    /// Hourly-rate cost of one run, derived from the runtime estimate.
    pub fn run_cost(&self, job_type: &str, instance: &str, sample_limit: usize, hourly_rate: f64) -> CostEstimate {
        let stat = self.estimate(job_type, instance, sample_limit);
        CostEstimate::from_days(stat.point, stat.spread, hourly_rate)
    }
}

impl<M: Mirror + ?Sized> RuntimeModel for RuntimeEstimator<'_, M> {
    fn estimate(&self, job_type: &str, instance: &str, sample_limit: usize) -> RuntimeStatistic {
        let records = match self.mirror.query(job_type, instance, Some(sample_limit)) {
            Ok(r) => r,
            Err(e) => {
                warn!(job_type, instance, error = %e, "mirror query failed; reporting no data");
                return RuntimeStatistic::NO_DATA;
            }
        };
        let samples: Vec<f64> = records.iter().map(|r| r.run_time).collect();
        let stat = RuntimeStatistic::from_samples(&samples);
        if stat.is_no_data() {
            debug!(job_type, instance, samples = samples.len(), "no usable history");
        }
        stat
    }
}
