use serde::{Deserialize, Serialize};

/// Below this many samples the raw min/max are reported instead of trimmed percentiles.
pub const TRIM_THRESHOLD: usize = 10;

/// Runtime statistics for one (job type, instance) query. Values are in days.
///
/// Always recomputed from the current sample set, never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStatistic {
    pub point: f64,
    pub spread: f64,
    pub low: f64,
    pub high: f64,
    pub sample_count: usize,
}

impl RuntimeStatistic {
    /// Returned when there is no history or the statistics degenerate to NaN.
    pub const NO_DATA: RuntimeStatistic = RuntimeStatistic {
        point: 0.0,
        spread: 0.0,
        low: 0.0,
        high: 0.0,
        sample_count: 0,
    };

    /// Regimes by sample count:
    /// - 0: [`Self::NO_DATA`]
    /// - 1: the value itself, zero spread
    /// - 2..=9: median, population stdev, min, max
    /// - 10+: the same over the trimmed set, bounded by its 1st/99th percentiles
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let stat = match n {
            0 => return Self::NO_DATA,
            1 => RuntimeStatistic {
                point: sorted[0],
                spread: 0.0,
                low: sorted[0],
                high: sorted[0],
                sample_count: 1,
            },
            _ if n < TRIM_THRESHOLD => RuntimeStatistic {
                point: median(&sorted),
                spread: population_stdev(&sorted),
                low: sorted[0],
                high: sorted[n - 1],
                sample_count: n,
            },
            _ => {
                let trimmed = trim_top_decile(&sorted);
                RuntimeStatistic {
                    point: median(trimmed),
                    spread: population_stdev(trimmed),
                    low: percentile(trimmed, 1.0),
                    high: percentile(trimmed, 99.0),
                    sample_count: n,
                }
            }
        };

        if stat.has_nan() {
            Self::NO_DATA
        } else {
            stat
        }
    }

    pub fn is_no_data(&self) -> bool {
        self.sample_count == 0
    }

    fn has_nan(&self) -> bool {
        self.point.is_nan() || self.spread.is_nan() || self.low.is_nan() || self.high.is_nan()
    }
}

/// Drop the `n / 10` largest values of an ascending slice.
pub fn trim_top_decile(sorted: &[f64]) -> &[f64] {
    let cut = sorted.len() / 10;
    &sorted[..sorted.len() - cut]
}

/// Median of an ascending slice; NaN when empty.
pub fn median(sorted: &[f64]) -> f64 {
    percentile(sorted, 50.0)
}

/// Percentile of an ascending slice using linear interpolation between closest ranks.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (pct / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

pub fn population_stdev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    var.sqrt()
}
