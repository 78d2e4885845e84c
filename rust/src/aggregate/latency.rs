//! Latency statistics over observed step durations.

use crate::models::AgentStep;

use super::types::{Diagnostic, LatencyMetrics};

/// Observed latencies plus the diagnostics for steps left out.
pub struct LatencySamples {
    pub values: Vec<f64>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Collect usable latencies in declared order.
///
/// Steps missing either timestamp are grouped into one
/// `IncompleteTelemetry` diagnostic. Inverted windows, and windows too long
/// to measure in milliseconds, get their own `InvalidTiming` entry.
pub fn collect_latencies<'a>(steps: impl IntoIterator<Item = &'a AgentStep>) -> LatencySamples {
    let mut values = Vec::new();
    let mut incomplete = Vec::new();
    let mut diagnostics = Vec::new();

    for step in steps {
        match (step.start_time, step.end_time) {
            (Some(start_time), Some(end_time)) => match step.observed_latency() {
                Some(latency) => values.push(latency),
                None => diagnostics.push(Diagnostic::InvalidTiming {
                    step_id: step.id.clone(),
                    start_time,
                    end_time,
                }),
            },
            _ => incomplete.push(step.id.clone()),
        }
    }

    if !incomplete.is_empty() {
        diagnostics.insert(0, Diagnostic::IncompleteTelemetry {
            step_ids: incomplete,
        });
    }

    LatencySamples {
        values,
        diagnostics,
    }
}

/// Percentile by linear interpolation between order statistics.
///
/// `sorted` must be ascending. The rank `p/100 * (n-1)` is split into a
/// lower index and a fraction; an exact rank takes the lower index alone.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = (lower + 1).min(n - 1);
            let fraction = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
        }
    }
}

impl LatencyMetrics {
    /// Summary statistics over a sample set; `None` when empty.
    ///
    /// Input order does not matter. Variance is the population variance.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            p50: percentile(&sorted, 50.0),
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            mean,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            std_dev: variance.sqrt(),
            variance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [10.0, 20.0, 30.0, 40.0];
        // rank = 0.5 * 3 = 1.5 -> halfway between 20 and 30
        assert!((percentile(&sorted, 50.0) - 25.0).abs() < 1e-9);
        // rank = 0.9 * 3 = 2.7
        assert!((percentile(&sorted, 90.0) - 37.0).abs() < 1e-9);
        assert_eq!(percentile(&sorted, 0.0), 10.0);
        assert_eq!(percentile(&sorted, 100.0), 40.0);
    }

    #[test]
    fn test_percentile_edge_sizes() {
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[7.0], 99.0), 7.0);
    }

    #[test]
    fn test_metrics_basic() {
        let metrics = LatencyMetrics::from_samples(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((metrics.mean - 5.0).abs() < 1e-9);
        assert!((metrics.variance - 4.0).abs() < 1e-9);
        assert!((metrics.std_dev - 2.0).abs() < 1e-9);
        assert_eq!(metrics.min, 2.0);
        assert_eq!(metrics.max, 9.0);
        assert!((metrics.p50 - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_order_independent() {
        let a = LatencyMetrics::from_samples(&[30.0, 10.0, 50.0, 20.0, 40.0]).unwrap();
        let b = LatencyMetrics::from_samples(&[50.0, 40.0, 30.0, 20.0, 10.0]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, LatencyMetrics::from_samples(&[30.0, 10.0, 50.0, 20.0, 40.0]).unwrap());
    }

    #[test]
    fn test_metrics_empty() {
        assert!(LatencyMetrics::from_samples(&[]).is_none());
    }

    #[test]
    fn test_unmeasurable_window_is_invalid() {
        let steps = vec![
            AgentStep::new("ok", "a").with_timing(0, 5),
            AgentStep::new("huge", "a").with_timing(-9_000_000_000_000_000_000, i64::MAX),
        ];
        let samples = collect_latencies(&steps);

        assert_eq!(samples.values, vec![5.0]);
        assert_eq!(
            samples.diagnostics,
            vec![Diagnostic::InvalidTiming {
                step_id: "huge".to_string(),
                start_time: -9_000_000_000_000_000_000,
                end_time: i64::MAX,
            }]
        );
    }

    #[test]
    fn test_collect_reports_exclusions() {
        let steps = vec![
            AgentStep::new("ok", "a").with_timing(0, 40),
            AgentStep::new("open", "a"),
            AgentStep::new("backwards", "a").with_timing(50, 10),
            AgentStep {
                start_time: Some(5),
                ..AgentStep::new("unfinished", "a")
            },
        ];
        let samples = collect_latencies(&steps);

        assert_eq!(samples.values, vec![40.0]);
        assert_eq!(
            samples.diagnostics,
            vec![
                Diagnostic::IncompleteTelemetry {
                    step_ids: vec!["open".to_string(), "unfinished".to_string()],
                },
                Diagnostic::InvalidTiming {
                    step_id: "backwards".to_string(),
                    start_time: 50,
                    end_time: 10,
                },
            ]
        );
    }
}
