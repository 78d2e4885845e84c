//! Critical path calculation using forward and backward passes.

use thiserror::Error;

use tokio_util::sync::CancellationToken;
use crate::config::AnalysisConfig;
use crate::graph::WorkflowDag;
use crate::interner::StepIndex;
use crate::models::AgentStep;
use crate::{log_changes, log_debug};

use super::bottleneck::classify_bottlenecks;
use super::types::{slack_tolerance, CriticalPathAnalysis, StepTiming};

/// Errors that can occur during critical path analysis.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzeError {
    #[error("Expected {expected} durations, got {actual}")]
    DurationCountMismatch { expected: usize, actual: usize },
    #[error("Invalid duration {value} for step {step_id}")]
    InvalidDuration { step_id: String, value: f64 },
    #[error("Analysis cancelled")]
    Cancelled,
}

/// Per-step durations from observed telemetry, indexed like the DAG.
///
/// Steps without a usable start/end window contribute zero; the aggregator
/// reports them separately.
pub fn observed_durations(dag: &WorkflowDag, steps: &[AgentStep]) -> Vec<f64> {
    let mut durations = vec![0.0; dag.len()];
    for step in steps {
        if let Some(idx) = dag.index_of(&step.id) {
            durations[idx as usize] = step.observed_latency().unwrap_or(0.0);
        }
    }
    durations
}

/// Run the critical path analysis.
///
/// This algorithm:
/// 1. Computes earliest start/finish in a forward pass over topological layers
/// 2. Computes latest start/finish in a backward pass from the sinks
/// 3. Marks zero-slack steps critical and traces one critical chain
/// 4. Classifies bottlenecks among the critical steps
///
/// # Arguments
/// * `dag` - Validated workflow graph
/// * `durations` - Duration of each step, indexed by DAG step index
/// * `config` - Bottleneck threshold and verbosity
pub fn analyze(
    dag: &WorkflowDag,
    durations: &[f64],
    config: &AnalysisConfig,
) -> Result<CriticalPathAnalysis, AnalyzeError> {
    analyze_cancellable(dag, durations, config, &CancellationToken::new())
}

/// Same as [`analyze`], checking `cancel` between topological layers.
///
/// A cancelled run returns `Err(AnalyzeError::Cancelled)` and no partial
/// result.
pub fn analyze_cancellable(
    dag: &WorkflowDag,
    durations: &[f64],
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> Result<CriticalPathAnalysis, AnalyzeError> {
    validate_durations(dag, durations)?;

    if dag.is_empty() {
        return Ok(CriticalPathAnalysis::default());
    }

    let mut timings = vec![StepTiming::default(); dag.len()];
    forward_pass(dag, durations, &mut timings, cancel, config.verbosity)?;

    let total_latency = timings
        .iter()
        .map(|t| t.earliest_finish)
        .fold(0.0, f64::max);

    backward_pass(
        dag,
        durations,
        &mut timings,
        total_latency,
        cancel,
        config.verbosity,
    )?;

    let path = trace_critical_chain(dag, &timings, total_latency);
    let bottlenecks = classify_bottlenecks(dag, &timings, durations, total_latency, config);
    let total_work = durations.iter().sum();

    log_changes!(
        config.verbosity,
        steps = dag.len(),
        total_latency,
        path_len = path.len(),
        bottlenecks = bottlenecks.len(),
        "critical path computed"
    );

    Ok(CriticalPathAnalysis {
        timings,
        durations: durations.to_vec(),
        total_latency,
        total_work,
        path,
        bottlenecks,
    })
}

fn validate_durations(dag: &WorkflowDag, durations: &[f64]) -> Result<(), AnalyzeError> {
    if durations.len() != dag.len() {
        return Err(AnalyzeError::DurationCountMismatch {
            expected: dag.len(),
            actual: durations.len(),
        });
    }
    for (idx, &value) in durations.iter().enumerate() {
        if !value.is_finite() || value < 0.0 {
            return Err(AnalyzeError::InvalidDuration {
                step_id: dag.step_id(idx as StepIndex).unwrap_or_default().to_string(),
                value,
            });
        }
    }
    Ok(())
}

/// Earliest start = max of dependency finish times (0 for sources).
fn forward_pass(
    dag: &WorkflowDag,
    durations: &[f64],
    timings: &mut [StepTiming],
    cancel: &CancellationToken,
    verbosity: u8,
) -> Result<(), AnalyzeError> {
    for (depth, layer) in dag.layers().iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(AnalyzeError::Cancelled);
        }
        log_debug!(verbosity, depth, width = layer.len(), "forward pass layer");

        for &step in layer {
            let earliest_start = dag
                .dependencies(step)
                .iter()
                .map(|&dep| timings[dep as usize].earliest_finish)
                .fold(0.0, f64::max);
            let timing = &mut timings[step as usize];
            timing.earliest_start = earliest_start;
            timing.earliest_finish = earliest_start + durations[step as usize];
        }
    }
    Ok(())
}

/// Latest finish = min of dependents' latest start (total latency for sinks).
fn backward_pass(
    dag: &WorkflowDag,
    durations: &[f64],
    timings: &mut [StepTiming],
    total_latency: f64,
    cancel: &CancellationToken,
    verbosity: u8,
) -> Result<(), AnalyzeError> {
    for (depth, layer) in dag.layers().iter().enumerate().rev() {
        if cancel.is_cancelled() {
            return Err(AnalyzeError::Cancelled);
        }
        log_debug!(verbosity, depth, width = layer.len(), "backward pass layer");

        let tolerance = slack_tolerance(total_latency);
        for &step in layer {
            let latest_finish = dag
                .dependents(step)
                .iter()
                .map(|&dependent| timings[dependent as usize].latest_start)
                .fold(total_latency, f64::min);
            let timing = &mut timings[step as usize];
            timing.latest_finish = latest_finish;
            timing.latest_start = latest_finish - durations[step as usize];
            let slack = timing.latest_start - timing.earliest_start;
            timing.slack = if slack < tolerance { 0.0 } else { slack };
        }
    }
    Ok(())
}

/// Walk back from the last-finishing sink along tight critical edges.
///
/// At each step the first qualifying dependency in declared order is taken,
/// so ties between equally long chains resolve deterministically.
fn trace_critical_chain(
    dag: &WorkflowDag,
    timings: &[StepTiming],
    total_latency: f64,
) -> Vec<StepIndex> {
    let tolerance = slack_tolerance(total_latency);
    // The last step in topological order that finishes at total_latency
    // cannot have dependents, so it is a sink.
    let Some(&sink) = dag.topological_order().iter().rev().find(|&&s| {
        let t = &timings[s as usize];
        t.is_critical() && (t.earliest_finish - total_latency).abs() < tolerance
    }) else {
        return Vec::new();
    };

    let mut chain = vec![sink];
    let mut current = sink;
    loop {
        let start = timings[current as usize].earliest_start;
        let prev = dag
            .dependencies(current)
            .iter()
            .copied()
            .filter(|&d| {
                let t = &timings[d as usize];
                t.is_critical() && (t.earliest_finish - start).abs() < tolerance
            })
            .min();
        match prev {
            Some(prev) => {
                chain.push(prev);
                current = prev;
            }
            None => break,
        }
    }

    chain.reverse();
    chain
}
