//! Bottleneck classification over critical steps.

use crate::config::AnalysisConfig;
use crate::graph::WorkflowDag;
use crate::interner::StepIndex;
use crate::log_checks;

use super::types::{Bottleneck, BottleneckCause, StepTiming};

/// Flag critical steps that disproportionately constrain total latency.
///
/// A critical step is a bottleneck when either:
/// - its duration is at least `bottleneck_fraction` of total latency
///   (`HighLatencyAgent`), or
/// - it has two or more dependents and all of them are critical
///   (`SequentialDependency`).
///
/// `impact_score` is duration / total latency in both cases. A zero total
/// latency yields no bottlenecks. Results are in topological order.
pub fn classify_bottlenecks(
    dag: &WorkflowDag,
    timings: &[StepTiming],
    durations: &[f64],
    total_latency: f64,
    config: &AnalysisConfig,
) -> Vec<Bottleneck> {
    if total_latency <= 0.0 {
        return Vec::new();
    }

    let mut bottlenecks = Vec::new();
    for &step in dag.topological_order() {
        if !timings[step as usize].is_critical() {
            continue;
        }

        let duration = durations[step as usize];
        let impact_score = duration / total_latency;

        let cause = if impact_score >= config.bottleneck_fraction {
            Some(BottleneckCause::HighLatencyAgent)
        } else if gates_critical_dependents(dag, timings, step) {
            Some(BottleneckCause::SequentialDependency)
        } else {
            None
        };

        if let Some(cause) = cause {
            log_checks!(
                config.verbosity,
                step = dag.step_id(step).unwrap_or_default(),
                impact_score,
                cause = cause.as_str(),
                "bottleneck"
            );
            bottlenecks.push(Bottleneck {
                step,
                duration,
                impact_score,
                cause,
            });
        }
    }
    bottlenecks
}

fn gates_critical_dependents(dag: &WorkflowDag, timings: &[StepTiming], step: StepIndex) -> bool {
    let dependents = dag.dependents(step);
    dependents.len() >= 2
        && dependents
            .iter()
            .all(|&d| timings[d as usize].is_critical())
}
