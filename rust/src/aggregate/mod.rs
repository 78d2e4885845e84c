//! Performance and optimization aggregation.
//!
//! Combines the critical path analysis with step telemetry and pricing into
//! the `PerformanceAnalysis` and `CriticalPath` results, plus diagnostics
//! for any data that had to be left out.

mod cost;
mod latency;
mod opportunities;
mod quality;
mod types;

pub use cost::{step_cost, StepCost};
pub use latency::{collect_latencies, percentile};
pub use opportunities::{derive_opportunities, OpportunityContext};
pub use quality::{quality_metrics, resource_metrics, step_success_rate};
pub use types::{
    AnalysisReport, BottleneckStep, Complexity, CostBreakdown, CriticalPath, CriticalPathStep,
    Diagnostic, LatencyMetrics, OpportunityKind, OptimizationOpportunity, PerformanceAnalysis,
    QualityMetrics, Recommendation, ResourceMetrics, StepAnalysis, WorkflowSummary,
};

use thiserror::Error;

use tokio_util::sync::CancellationToken;
use crate::config::AnalysisConfig;
use crate::critical_path::{BottleneckCause, CriticalPathAnalysis};
use crate::graph::WorkflowDag;
use crate::interner::StepIndex;
use crate::log_changes;
use crate::models::{AgentStep, CostModel, ExecutionHistory, Workflow};

/// Errors that can occur during aggregation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    #[error("Workflow has {actual} steps but the graph has {expected}")]
    StepMismatch { expected: usize, actual: usize },
    #[error("Step not present in the graph: {0}")]
    UnknownStep(String),
    #[error("No step has usable timing data ({steps} steps)")]
    InsufficientData { steps: usize },
    #[error("Aggregation cancelled")]
    Cancelled,
}

/// Produce the full analysis report for a workflow.
///
/// # Arguments
/// * `workflow` - The workflow whose steps were used to build `dag`
/// * `dag` - Graph from [`crate::graph::build`]
/// * `analysis` - Result of [`crate::critical_path::analyze`] on `dag`
/// * `cost_model` - Per-agent pricing
/// * `history` - Earlier runs for the caching rule; `None` skips it
/// * `config` - Thresholds and verbosity
///
/// # Returns
/// * `Err(AggregateError::InsufficientData)` if the workflow has steps but
///   none has usable timing
/// * Otherwise the report; partial telemetry and missing pricing show up in
///   `diagnostics`
pub fn aggregate(
    workflow: &Workflow,
    dag: &WorkflowDag,
    analysis: &CriticalPathAnalysis,
    cost_model: &CostModel,
    history: Option<&ExecutionHistory>,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, AggregateError> {
    aggregate_cancellable(
        workflow,
        dag,
        analysis,
        cost_model,
        history,
        config,
        &CancellationToken::new(),
    )
}

/// Same as [`aggregate`], checking `cancel` between topological layers.
#[allow(clippy::too_many_arguments)]
pub fn aggregate_cancellable(
    workflow: &Workflow,
    dag: &WorkflowDag,
    analysis: &CriticalPathAnalysis,
    cost_model: &CostModel,
    history: Option<&ExecutionHistory>,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> Result<AnalysisReport, AggregateError> {
    let steps = index_steps(workflow, dag)?;
    if analysis.timings.len() != dag.len() {
        return Err(AggregateError::StepMismatch {
            expected: dag.len(),
            actual: analysis.timings.len(),
        });
    }

    // Latency distribution
    let samples = collect_latencies(steps.iter().copied());
    let latency_metrics = match LatencyMetrics::from_samples(&samples.values) {
        Some(metrics) => metrics,
        None if steps.is_empty() => LatencyMetrics::default(),
        None => return Err(AggregateError::InsufficientData { steps: steps.len() }),
    };
    let mut diagnostics = samples.diagnostics;

    // Costs
    let costs = cost::compute_step_costs(
        dag,
        &steps,
        cost_model,
        config.parallel_layer_threshold,
        cancel,
    )?;
    let (cost_breakdown, total_cost, cost_diagnostics) = cost::build_breakdown(&steps, &costs);
    diagnostics.extend(cost_diagnostics);
    let step_costs: Vec<f64> = costs.iter().map(StepCost::total).collect();

    if cancel.is_cancelled() {
        return Err(AggregateError::Cancelled);
    }

    let ctx = OpportunityContext {
        dag,
        steps: &steps,
        analysis,
        step_costs: &step_costs,
        total_cost,
        config,
    };
    let optimization_opportunities = derive_opportunities(&ctx, history);

    let step_analysis = build_step_analysis(&ctx, &optimization_opportunities);
    let critical_steps = build_critical_path_steps(dag, &steps, analysis);
    let bottleneck_steps = analysis
        .bottlenecks
        .iter()
        .map(|b| BottleneckStep {
            step_id: steps[b.step as usize].id.clone(),
            agent_name: steps[b.step as usize].agent_name.clone(),
            latency: b.duration,
            impact_score: b.impact_score,
            cause: b.cause,
        })
        .collect();

    log_changes!(
        config.verbosity,
        workflow = %workflow.id,
        total_latency = analysis.total_latency,
        total_cost,
        opportunities = optimization_opportunities.len(),
        diagnostics = diagnostics.len(),
        "workflow aggregated"
    );

    Ok(AnalysisReport {
        performance: PerformanceAnalysis {
            workflow_id: workflow.id.clone(),
            total_latency: analysis.total_latency,
            latency_metrics,
            total_cost,
            cost_breakdown,
            quality_metrics: quality_metrics(&steps),
            resource_metrics: resource_metrics(&steps),
            step_analysis,
            timestamp: chrono::Utc::now().timestamp_millis(),
        },
        critical_path: CriticalPath {
            workflow_id: workflow.id.clone(),
            steps: critical_steps,
            total_latency: analysis.total_latency,
            bottleneck_steps,
            optimization_opportunities,
        },
        diagnostics,
    })
}

/// Order the workflow's steps by DAG index, checking both describe the
/// same step set.
fn index_steps<'a>(
    workflow: &'a Workflow,
    dag: &WorkflowDag,
) -> Result<Vec<&'a AgentStep>, AggregateError> {
    if workflow.steps.len() != dag.len() {
        return Err(AggregateError::StepMismatch {
            expected: dag.len(),
            actual: workflow.steps.len(),
        });
    }

    let mut slots: Vec<Option<&AgentStep>> = vec![None; dag.len()];
    for step in &workflow.steps {
        let idx = dag
            .index_of(&step.id)
            .ok_or_else(|| AggregateError::UnknownStep(step.id.clone()))?;
        slots[idx as usize] = Some(step);
    }
    // Equal lengths plus every id resolving means each slot is filled once,
    // unless the workflow repeats an id.
    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.ok_or_else(|| {
                AggregateError::UnknownStep(
                    dag.step_id(idx as StepIndex).unwrap_or_default().to_string(),
                )
            })
        })
        .collect()
}

fn build_step_analysis(
    ctx: &OpportunityContext<'_>,
    opportunities: &[OptimizationOpportunity],
) -> Vec<StepAnalysis> {
    let total_latency = ctx.analysis.total_latency;

    ctx.steps
        .iter()
        .enumerate()
        .map(|(idx, step)| {
            let index = idx as StepIndex;
            let latency = ctx.analysis.duration(index);
            let bottleneck = ctx.analysis.bottleneck(index);

            let mut recommendations: Vec<Recommendation> = opportunities
                .iter()
                .filter(|o| o.steps.contains(&step.id))
                .map(|o| recommendation_for(o, &step.id))
                .collect();
            if let Some(b) = bottleneck {
                recommendations.push(match b.cause {
                    BottleneckCause::HighLatencyAgent => Recommendation::ReduceAgentLatency {
                        impact_score: b.impact_score,
                    },
                    BottleneckCause::SequentialDependency => {
                        Recommendation::RelieveSequentialDependency {
                            dependents: ctx.dag.dependents(index).len(),
                        }
                    }
                });
            }

            StepAnalysis {
                step_id: step.id.clone(),
                agent_id: step.agent_id.clone(),
                agent_name: step.agent_name.clone(),
                latency,
                percentage_of_total: if total_latency > 0.0 {
                    latency / total_latency * 100.0
                } else {
                    0.0
                },
                is_bottleneck: bottleneck.is_some(),
                cost: ctx.step_costs[idx],
                success_rate: step_success_rate(step),
                optimization_recommendations: recommendations,
            }
        })
        .collect()
}

fn recommendation_for(opportunity: &OptimizationOpportunity, step_id: &str) -> Recommendation {
    match opportunity.kind {
        OpportunityKind::Parallelization => Recommendation::Parallelize {
            with_steps: opportunity
                .steps
                .iter()
                .filter(|s| s.as_str() != step_id)
                .cloned()
                .collect(),
            estimated_latency_reduction: opportunity.estimated_latency_reduction,
        },
        OpportunityKind::Elimination => Recommendation::Eliminate {
            estimated_cost_reduction: opportunity.estimated_cost_reduction,
        },
        OpportunityKind::Caching => Recommendation::Cache {
            estimated_latency_reduction: opportunity.estimated_latency_reduction,
            estimated_cost_reduction: opportunity.estimated_cost_reduction,
        },
    }
}

fn build_critical_path_steps(
    dag: &WorkflowDag,
    steps: &[&AgentStep],
    analysis: &CriticalPathAnalysis,
) -> Vec<CriticalPathStep> {
    analysis
        .path
        .iter()
        .filter_map(|&s| {
            let step = steps[s as usize];
            let timing = analysis.timing(s)?;
            Some(CriticalPathStep {
                step_id: step.id.clone(),
                agent_id: step.agent_id.clone(),
                agent_name: step.agent_name.clone(),
                start_time: timing.earliest_start,
                end_time: timing.earliest_finish,
                duration: analysis.duration(s),
                dependencies: dag
                    .dependencies(s)
                    .iter()
                    .filter_map(|&d| dag.step_id(d))
                    .map(str::to_string)
                    .collect(),
            })
        })
        .collect()
}
