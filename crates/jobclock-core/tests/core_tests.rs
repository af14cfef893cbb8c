use jobclock_core::{percentile, transform, RuntimeStatistic};
use serde_json::json;

#[test]
fn identical_samples_have_zero_spread() {
    for n in [1usize, 3, 9, 10, 25] {
        let samples = vec![1.0; n];
        let s = RuntimeStatistic::from_samples(&samples);
        assert_eq!(s.spread, 0.0, "n={n}");
        assert_eq!(s.low, s.point, "n={n}");
        assert_eq!(s.high, s.point, "n={n}");
        assert_eq!(s.point, 1.0, "n={n}");
    }
}

#[test]
fn scenario_a_three_identical_runs() {
    let s = RuntimeStatistic::from_samples(&[1.0, 1.0, 1.0]);
    assert_eq!((s.point, s.spread, s.low, s.high), (1.0, 0.0, 1.0, 1.0));
}

#[test]
fn scenario_b_outlier_is_trimmed() {
    let mut samples: Vec<f64> = (0..11).map(|i| 1.0 + f64::from(i) * 0.01).collect();
    samples.push(100.0);
    let s = RuntimeStatistic::from_samples(&samples);

    let mut remaining = samples[..11].to_vec();
    remaining.sort_by(|a, b| a.total_cmp(b));
    assert!((s.high - percentile(&remaining, 99.0)).abs() < 1e-12);
    assert!(s.high < 1.11);
    assert!(s.spread < 0.05);
    assert!((s.point - 1.05).abs() < 1e-12);
    assert_eq!(s.sample_count, 12);
}

#[test]
fn bounds_bracket_the_point() {
    let sets: Vec<Vec<f64>> = vec![
        vec![5.0, 1.0],
        vec![0.1, 0.9, 0.3, 0.3, 7.0],
        (1..=40).map(|i| f64::from(i * i) / 100.0).collect(),
        vec![2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 3.0, 50.0],
    ];
    for set in sets {
        let s = RuntimeStatistic::from_samples(&set);
        assert!(s.low <= s.point && s.point <= s.high, "{set:?} -> {s:?}");
    }
}

#[test]
fn scenario_d_missing_start_is_dropped() {
    let hits = vec![
        json!({"_source": {"@timestamp": "2023-01-01T00:00:00Z", "type": "d", "job": {"job_info": {
            "time_queued": "2022-12-31T00:00:00Z",
            "time_end": "2023-01-01T00:00:00Z",
        }}}}),
        json!({"_source": {"@timestamp": "2023-01-01T00:00:01Z", "type": "d", "job": {"job_info": {
            "time_queued": "2022-12-31T00:00:00Z",
            "time_start": "2022-12-31T12:00:00Z",
            "time_end": "2023-01-01T00:00:00Z",
        }}}}),
    ];
    let first = transform(&hits[0]);
    assert_eq!(first.record.run_time, 0.0);
    assert!(!first.is_valid());

    let (valid, dropped) = jobclock_core::valid_hits(&hits);
    assert_eq!(dropped, 1);
    assert_eq!(valid.len(), 1);
    assert_eq!(valid[0].record.run_time, 0.5);
    assert_eq!(valid[0].queue_time, 0.5);
}
