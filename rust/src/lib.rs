//! Critical path and optimization analysis for multi-agent workflows.
//!
//! A workflow is a DAG of agent steps with execution telemetry. The engine
//! exposes three composable stages:
//! - [`build`] validates the steps and produces a [`WorkflowDag`]
//! - [`analyze`] runs the forward/backward passes for slack, the critical
//!   chain and bottlenecks
//! - [`aggregate`] rolls telemetry and pricing into latency, cost, quality
//!   and resource metrics plus advisory optimization opportunities
//!
//! [`analyze_workflow`] runs all three with durations taken from telemetry.

pub mod aggregate;
pub mod config;
pub mod critical_path;
pub mod graph;
mod interner;
pub mod logging;
mod models;
#[cfg(feature = "python")]
mod python;

use thiserror::Error;

pub use tokio_util::sync::CancellationToken;

pub use aggregate::{
    aggregate, aggregate_cancellable, AggregateError, AnalysisReport, BottleneckStep, Complexity,
    CostBreakdown, CriticalPath, CriticalPathStep, Diagnostic, LatencyMetrics, OpportunityKind,
    OptimizationOpportunity, PerformanceAnalysis, QualityMetrics, Recommendation,
    ResourceMetrics, StepAnalysis, WorkflowSummary,
};
pub use config::{AnalysisConfig, ConfigError};
pub use critical_path::{
    analyze, analyze_cancellable, observed_durations, AnalyzeError, Bottleneck, BottleneckCause,
    CriticalPathAnalysis, StepTiming,
};
pub use graph::{build, GraphError, Reachability, WorkflowDag};
pub use interner::StepIndex;
pub use models::{
    calculate_cost, Agent, AgentStep, CostModel, ExecutionHistory, HistoricalStep, StepMetadata,
    StepStatus, TokenPricing, Workflow, DEFAULT_INPUT_COST_PER_1K, DEFAULT_OUTPUT_COST_PER_1K,
};

/// Any failure from the analysis pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Analyze(#[from] AnalyzeError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Run build, analyze and aggregate over a workflow's recorded telemetry.
///
/// Durations come from each step's observed latency; untimed steps count as
/// zero in the critical path and are reported in the diagnostics.
pub fn analyze_workflow(
    workflow: &Workflow,
    cost_model: &CostModel,
    history: Option<&ExecutionHistory>,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, Error> {
    analyze_workflow_cancellable(
        workflow,
        cost_model,
        history,
        config,
        &CancellationToken::new(),
    )
}

/// Same as [`analyze_workflow`], abandoning the run once `cancel` is set.
pub fn analyze_workflow_cancellable(
    workflow: &Workflow,
    cost_model: &CostModel,
    history: Option<&ExecutionHistory>,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> Result<AnalysisReport, Error> {
    config.validate()?;
    let dag = build(&workflow.steps)?;
    let durations = observed_durations(&dag, &workflow.steps);
    let analysis = analyze_cancellable(&dag, &durations, config, cancel)?;
    let report = aggregate_cancellable(
        workflow, &dag, &analysis, cost_model, history, config, cancel,
    )?;
    Ok(report)
}
