//! Per-step cost breakdown.
//!
//! Costs are independent per step, so each topological layer is costed in
//! one go, on scoped worker threads once the layer is large enough.

use tokio_util::sync::CancellationToken;
use crate::graph::WorkflowDag;
use crate::interner::StepIndex;
use crate::models::{AgentStep, CostModel};

use super::types::{CostBreakdown, Diagnostic};
use super::AggregateError;

/// Cost components of one step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepCost {
    pub input: f64,
    pub output: f64,
    pub fixed: f64,
    /// False when no pricing was found for the step's agent.
    pub priced: bool,
}

impl StepCost {
    pub fn total(&self) -> f64 {
        self.input + self.output + self.fixed
    }
}

pub fn step_cost(step: &AgentStep, cost_model: &CostModel) -> StepCost {
    match cost_model.pricing_for(&step.agent_id) {
        Some(pricing) => StepCost {
            input: pricing.input_cost(step.input_tokens),
            output: pricing.output_cost(step.output_tokens),
            fixed: pricing.fixed_cost(),
            priced: true,
        },
        None => StepCost::default(),
    }
}

/// Cost every step, indexed like the DAG.
///
/// `steps` is indexed by DAG step index.
pub fn compute_step_costs(
    dag: &WorkflowDag,
    steps: &[&AgentStep],
    cost_model: &CostModel,
    parallel_threshold: usize,
    cancel: &CancellationToken,
) -> Result<Vec<StepCost>, AggregateError> {
    let mut costs = vec![StepCost::default(); dag.len()];
    for layer in dag.layers() {
        if cancel.is_cancelled() {
            return Err(AggregateError::Cancelled);
        }
        let layer_costs = cost_layer(layer, steps, cost_model, parallel_threshold);
        for (&step, cost) in layer.iter().zip(layer_costs) {
            costs[step as usize] = cost;
        }
    }
    Ok(costs)
}

fn cost_layer(
    layer: &[StepIndex],
    steps: &[&AgentStep],
    cost_model: &CostModel,
    parallel_threshold: usize,
) -> Vec<StepCost> {
    let workers = std::thread::available_parallelism().map_or(1, |n| n.get());
    if layer.len() < parallel_threshold || workers < 2 {
        return layer
            .iter()
            .map(|&s| step_cost(steps[s as usize], cost_model))
            .collect();
    }

    let chunk_size = layer.len().div_ceil(workers);
    std::thread::scope(|scope| {
        let handles: Vec<_> = layer
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|&s| step_cost(steps[s as usize], cost_model))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    })
}

/// Breakdown rows in declared order, workflow total, and a
/// `MissingCostModel` diagnostic per unpriced step.
pub fn build_breakdown(
    steps: &[&AgentStep],
    costs: &[StepCost],
) -> (Vec<CostBreakdown>, f64, Vec<Diagnostic>) {
    let total_cost: f64 = costs.iter().map(StepCost::total).sum();
    let mut diagnostics = Vec::new();

    let rows = steps
        .iter()
        .zip(costs)
        .map(|(step, cost)| {
            if !cost.priced {
                diagnostics.push(Diagnostic::MissingCostModel {
                    step_id: step.id.clone(),
                    agent_id: step.agent_id.clone(),
                });
            }
            let total = cost.total();
            CostBreakdown {
                step_id: step.id.clone(),
                agent_id: step.agent_id.clone(),
                agent_name: step.agent_name.clone(),
                input_cost: cost.input,
                output_cost: cost.output,
                fixed_cost: cost.fixed,
                total_cost: total,
                percentage: if total_cost > 0.0 {
                    total / total_cost * 100.0
                } else {
                    0.0
                },
            }
        })
        .collect();

    (rows, total_cost, diagnostics)
}
