//! Output types produced by the aggregator.
//!
//! These mirror the optimizer service's wire schema; the request layer
//! serializes them as-is.

use serde::{Deserialize, Serialize};

use crate::critical_path::BottleneckCause;

/// Distribution of observed step latencies, in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub variance: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub success_rate: f64,
    pub failure_rate: f64,
    pub retry_count: u64,
    /// Share of validated steps that passed; absent when no step was validated.
    pub validation_pass_rate: Option<f64>,
}

/// Resource usage averaged over steps that reported samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub cpu_utilization: f64,
    pub memory_utilization: f64,
    pub gpu_utilization: Option<f64>,
    pub peak_memory_mb: Option<f64>,
    pub avg_memory_mb: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub step_id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub input_cost: f64,
    pub output_cost: f64,
    pub fixed_cost: f64,
    pub total_cost: f64,
    /// Share of workflow total cost, in percent.
    pub percentage: f64,
}

/// Kind of advisory transformation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    Parallelization,
    Elimination,
    Caching,
}

impl OpportunityKind {
    /// Fixed rubric used when nothing suggests otherwise.
    pub fn default_complexity(&self) -> Complexity {
        match self {
            OpportunityKind::Parallelization => Complexity::Medium,
            OpportunityKind::Elimination => Complexity::Low,
            OpportunityKind::Caching => Complexity::High,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Suggested change to the workflow. Never applied by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOpportunity {
    #[serde(rename = "type")]
    pub kind: OpportunityKind,
    pub steps: Vec<String>,
    pub estimated_latency_reduction: f64,
    pub estimated_cost_reduction: f64,
    pub implementation_complexity: Complexity,
}

impl OptimizationOpportunity {
    pub fn new(
        kind: OpportunityKind,
        steps: Vec<String>,
        estimated_latency_reduction: f64,
        estimated_cost_reduction: f64,
    ) -> Self {
        Self {
            kind,
            steps,
            estimated_latency_reduction,
            estimated_cost_reduction,
            implementation_complexity: kind.default_complexity(),
        }
    }
}

/// Per-step advice attached to a `StepAnalysis`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Recommendation {
    /// Run concurrently with the listed independent steps.
    Parallelize {
        with_steps: Vec<String>,
        estimated_latency_reduction: f64,
    },
    /// Low-value step off the critical path; review whether it is needed.
    Eliminate { estimated_cost_reduction: f64 },
    /// Same agent and input seen before; serve from cache.
    Cache {
        estimated_latency_reduction: f64,
        estimated_cost_reduction: f64,
    },
    /// Dominates total latency; consider a faster model or smaller prompt.
    ReduceAgentLatency { impact_score: f64 },
    /// Gates several critical dependents.
    RelieveSequentialDependency { dependents: usize },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepAnalysis {
    pub step_id: String,
    pub agent_id: String,
    pub agent_name: String,
    /// Observed latency in milliseconds (0 when untimed).
    pub latency: f64,
    /// latency / total_latency, in percent.
    pub percentage_of_total: f64,
    pub is_bottleneck: bool,
    pub cost: f64,
    pub success_rate: f64,
    pub optimization_recommendations: Vec<Recommendation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAnalysis {
    pub workflow_id: String,
    pub total_latency: f64,
    pub latency_metrics: LatencyMetrics,
    pub total_cost: f64,
    pub cost_breakdown: Vec<CostBreakdown>,
    pub quality_metrics: QualityMetrics,
    pub resource_metrics: ResourceMetrics,
    pub step_analysis: Vec<StepAnalysis>,
    /// Epoch milliseconds at computation time.
    pub timestamp: i64,
}

/// A step on the reported critical chain with its computed schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CriticalPathStep {
    pub step_id: String,
    pub agent_id: String,
    pub agent_name: String,
    /// Earliest start offset from workflow start.
    pub start_time: f64,
    /// Earliest finish offset from workflow start.
    pub end_time: f64,
    pub duration: f64,
    pub dependencies: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BottleneckStep {
    pub step_id: String,
    pub agent_name: String,
    pub latency: f64,
    pub impact_score: f64,
    pub cause: BottleneckCause,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CriticalPath {
    pub workflow_id: String,
    pub steps: Vec<CriticalPathStep>,
    pub total_latency: f64,
    pub bottleneck_steps: Vec<BottleneckStep>,
    pub optimization_opportunities: Vec<OptimizationOpportunity>,
}

/// Data-quality findings. Affected steps are left out of the specific
/// metric; the analysis itself still completes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Steps missing a start or end timestamp; excluded from latency metrics.
    IncompleteTelemetry { step_ids: Vec<String> },
    /// End precedes start; excluded from latency metrics.
    InvalidTiming {
        step_id: String,
        start_time: i64,
        end_time: i64,
    },
    /// No pricing for the step's agent; the step is costed at zero.
    MissingCostModel { step_id: String, agent_id: String },
}

/// Derived workflow totals, recomputed on every analysis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub total_latency: f64,
    pub total_cost: f64,
    pub success_rate: f64,
}

/// Everything one analysis run produces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub performance: PerformanceAnalysis,
    pub critical_path: CriticalPath,
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisReport {
    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            total_latency: self.performance.total_latency,
            total_cost: self.performance.total_cost,
            success_rate: self.performance.quality_metrics.success_rate,
        }
    }

    pub fn has_warnings(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_rubric() {
        assert_eq!(
            OpportunityKind::Parallelization.default_complexity(),
            Complexity::Medium
        );
        assert_eq!(
            OpportunityKind::Elimination.default_complexity(),
            Complexity::Low
        );
        assert_eq!(OpportunityKind::Caching.default_complexity(), Complexity::High);
    }

    #[test]
    fn test_opportunity_wire_shape() {
        let opp = OptimizationOpportunity::new(
            OpportunityKind::Parallelization,
            vec!["a".to_string(), "b".to_string()],
            10.0,
            0.0,
        );
        let value = serde_json::to_value(&opp).unwrap();
        assert_eq!(value["type"], "parallelization");
        assert_eq!(value["implementation_complexity"], "medium");
    }

    #[test]
    fn test_tagged_diagnostic() {
        let diag = Diagnostic::MissingCostModel {
            step_id: "s".to_string(),
            agent_id: "a".to_string(),
        };
        let value = serde_json::to_value(&diag).unwrap();
        assert_eq!(value["kind"], "missing_cost_model");
        assert_eq!(value["agent_id"], "a");
    }
}
