//! Types for critical path analysis.

use serde::{Deserialize, Serialize};

use crate::interner::StepIndex;

/// Relative tolerance for treating slack as zero.
pub const SLACK_EPSILON: f64 = 1e-9;

/// Absolute slack below which a step counts as critical.
///
/// Pass arithmetic rounds at the scale of the makespan, so the tolerance
/// scales with it (never below `SLACK_EPSILON` itself).
pub fn slack_tolerance(total_latency: f64) -> f64 {
    SLACK_EPSILON * total_latency.abs().max(1.0)
}

/// Per-step timing from the forward and backward passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepTiming {
    /// Earliest possible start time (from forward pass).
    pub earliest_start: f64,
    /// Earliest possible finish time (from forward pass).
    pub earliest_finish: f64,
    /// Latest allowable start time (from backward pass).
    pub latest_start: f64,
    /// Latest allowable finish time (from backward pass).
    pub latest_finish: f64,
    /// Slack = latest_start - earliest_start, never negative. Rounding
    /// residue within `slack_tolerance` is stored as exactly zero.
    pub slack: f64,
}

impl StepTiming {
    pub fn is_critical(&self) -> bool {
        self.slack < SLACK_EPSILON
    }
}

/// Why a step was classified as a bottleneck.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BottleneckCause {
    /// The step's own duration is a large share of total latency.
    HighLatencyAgent,
    /// The step gates several critical dependents.
    SequentialDependency,
}

impl BottleneckCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            BottleneckCause::HighLatencyAgent => "high-latency-agent",
            BottleneckCause::SequentialDependency => "sequential-dependency",
        }
    }
}

impl std::fmt::Display for BottleneckCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A critical step that disproportionately constrains total latency.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bottleneck {
    pub step: StepIndex,
    pub duration: f64,
    /// duration / total_latency.
    pub impact_score: f64,
    pub cause: BottleneckCause,
}

/// Output of the analyzer. Vectors are indexed by DAG step index.
#[derive(Clone, Debug, Default)]
pub struct CriticalPathAnalysis {
    pub timings: Vec<StepTiming>,
    /// Durations the passes ran with.
    pub durations: Vec<f64>,
    /// Makespan: the largest earliest finish.
    pub total_latency: f64,
    /// Sum of all step durations.
    pub total_work: f64,
    /// One source-to-sink chain of critical steps, in dependency order.
    pub path: Vec<StepIndex>,
    pub bottlenecks: Vec<Bottleneck>,
}

impl CriticalPathAnalysis {
    pub fn timing(&self, step: StepIndex) -> Option<&StepTiming> {
        self.timings.get(step as usize)
    }

    pub fn duration(&self, step: StepIndex) -> f64 {
        self.durations.get(step as usize).copied().unwrap_or(0.0)
    }

    pub fn is_critical(&self, step: StepIndex) -> bool {
        self.timing(step).is_some_and(StepTiming::is_critical)
    }

    /// Every zero-slack step, in index order. With tied chains this can be
    /// wider than `path`.
    pub fn critical_steps(&self) -> impl Iterator<Item = StepIndex> + '_ {
        self.timings
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_critical())
            .map(|(i, _)| i as StepIndex)
    }

    pub fn bottleneck(&self, step: StepIndex) -> Option<&Bottleneck> {
        self.bottlenecks.iter().find(|b| b.step == step)
    }

    /// Total duration along `path`; equals `total_latency`.
    pub fn path_duration(&self) -> f64 {
        self.path.iter().map(|&s| self.duration(s)).sum()
    }
}
