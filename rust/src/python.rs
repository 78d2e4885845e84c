//! Python bindings.
//!
//! The SDK hands over JSON documents; results come back as a JSON report so
//! the Python side never depends on Rust-side classes.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::{
    Agent, AnalysisConfig, CostModel, ExecutionHistory, TokenPricing, Workflow,
    DEFAULT_INPUT_COST_PER_1K, DEFAULT_OUTPUT_COST_PER_1K,
};

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Analyze a workflow and return the report as JSON.
///
/// # Arguments
/// * `workflow_json` - Workflow with its steps and telemetry
/// * `agents_json` - List of agents; those with `cost_per_token` are priced,
///   everyone else uses the default token rates
/// * `history_json` - Optional execution history enabling the caching rule
/// * `config_toml` - Optional analysis config overrides
///
/// # Raises
/// * ValueError on malformed input, invalid graph or missing telemetry
#[pyfunction]
#[pyo3(signature = (workflow_json, agents_json, history_json=None, config_toml=None))]
fn analyze_workflow(
    py: Python<'_>,
    workflow_json: &str,
    agents_json: &str,
    history_json: Option<&str>,
    config_toml: Option<&str>,
) -> PyResult<String> {
    let workflow: Workflow = serde_json::from_str(workflow_json).map_err(value_error)?;
    let agents: Vec<Agent> = serde_json::from_str(agents_json).map_err(value_error)?;
    let history: Option<ExecutionHistory> = history_json
        .map(serde_json::from_str::<ExecutionHistory>)
        .transpose()
        .map_err(value_error)?;
    let config = match config_toml {
        Some(contents) => AnalysisConfig::from_toml_str(contents).map_err(value_error)?,
        None => AnalysisConfig::default(),
    };
    let cost_model = CostModel::from_agents(&agents).with_fallback(TokenPricing::default());

    let report = py
        .allow_threads(|| {
            crate::analyze_workflow(&workflow, &cost_model, history.as_ref(), &config)
        })
        .map_err(value_error)?;
    serde_json::to_string(&report).map_err(value_error)
}

/// Cost of one execution at per-1k token prices.
#[pyfunction]
#[pyo3(signature = (
    input_tokens,
    output_tokens,
    input_cost_per_1k=DEFAULT_INPUT_COST_PER_1K,
    output_cost_per_1k=DEFAULT_OUTPUT_COST_PER_1K
))]
fn calculate_cost(
    input_tokens: u64,
    output_tokens: u64,
    input_cost_per_1k: f64,
    output_cost_per_1k: f64,
) -> f64 {
    crate::calculate_cost(
        input_tokens,
        output_tokens,
        input_cost_per_1k,
        output_cost_per_1k,
    )
}

#[pymodule]
fn agent_chain_optimizer(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(analyze_workflow, m)?)?;
    m.add_function(wrap_pyfunction!(calculate_cost, m)?)?;
    Ok(())
}
