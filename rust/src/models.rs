//! Core input data types: agents, steps, workflows and pricing.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Default price per 1000 input tokens when the caller supplies none.
pub const DEFAULT_INPUT_COST_PER_1K: f64 = 0.001;
/// Default price per 1000 output tokens when the caller supplies none.
pub const DEFAULT_OUTPUT_COST_PER_1K: f64 = 0.002;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn unknown_agent_name() -> String {
    "Unknown".to_string()
}

/// Token pricing for an agent, in currency units per 1000 tokens.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenPricing {
    pub input: f64,
    pub output: f64,
    /// Flat fee charged per step execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<f64>,
}

impl TokenPricing {
    pub fn new(input: f64, output: f64) -> Self {
        Self {
            input,
            output,
            fixed: None,
        }
    }

    pub fn with_fixed(mut self, fixed: f64) -> Self {
        self.fixed = Some(fixed);
        self
    }

    pub fn input_cost(&self, input_tokens: u64) -> f64 {
        (input_tokens as f64 / 1000.0) * self.input
    }

    pub fn output_cost(&self, output_tokens: u64) -> f64 {
        (output_tokens as f64 / 1000.0) * self.output
    }

    pub fn fixed_cost(&self) -> f64 {
        self.fixed.unwrap_or(0.0)
    }

    /// Total cost of one execution with the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        self.input_cost(input_tokens) + self.output_cost(output_tokens) + self.fixed_cost()
    }
}

impl Default for TokenPricing {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_COST_PER_1K, DEFAULT_OUTPUT_COST_PER_1K)
    }
}

/// Cost of token usage at explicit per-1k prices.
pub fn calculate_cost(
    input_tokens: u64,
    output_tokens: u64,
    input_cost_per_1k: f64,
    output_cost_per_1k: f64,
) -> f64 {
    TokenPricing::new(input_cost_per_1k, output_cost_per_1k).cost(input_tokens, output_tokens)
}

/// An agent that steps can be assigned to. Reference data only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub capabilities: Vec<String>,
    #[serde(
        default,
        alias = "costPerToken",
        skip_serializing_if = "Option::is_none"
    )]
    pub cost_per_token: Option<TokenPricing>,
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            model: None,
            capabilities: Vec::new(),
            cost_per_token: None,
        }
    }

    pub fn with_pricing(mut self, pricing: TokenPricing) -> Self {
        self.cost_per_token = Some(pricing);
        self
    }
}

/// Per-agent pricing used by the cost breakdown.
#[derive(Clone, Debug, Default)]
pub struct CostModel {
    pricing: FxHashMap<String, TokenPricing>,
    /// Pricing for agents without their own entry. When absent, such steps
    /// are costed at zero and flagged.
    pub fallback: Option<TokenPricing>,
}

impl CostModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect pricing from every agent that declares one.
    pub fn from_agents<'a>(agents: impl IntoIterator<Item = &'a Agent>) -> Self {
        let pricing = agents
            .into_iter()
            .filter_map(|agent| agent.cost_per_token.map(|p| (agent.id.clone(), p)))
            .collect();
        Self {
            pricing,
            fallback: None,
        }
    }

    pub fn insert(&mut self, agent_id: impl Into<String>, pricing: TokenPricing) {
        self.pricing.insert(agent_id.into(), pricing);
    }

    pub fn with_fallback(mut self, pricing: TokenPricing) -> Self {
        self.fallback = Some(pricing);
        self
    }

    /// Pricing for an agent, falling back to the model-wide default.
    pub fn pricing_for(&self, agent_id: &str) -> Option<&TokenPricing> {
        self.pricing.get(agent_id).or(self.fallback.as_ref())
    }

    pub fn len(&self) -> usize {
        self.pricing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pricing.is_empty()
    }
}

/// Execution status of a step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// Recognized step metadata keys, plus an open bag for everything else.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepMetadata {
    /// Number of retried attempts before the recorded outcome.
    #[serde(default, alias = "retryCount")]
    pub retry_count: u32,
    /// Fingerprint of the step's input; identical agent + signature pairs
    /// are caching candidates.
    #[serde(
        default,
        alias = "inputSignature",
        skip_serializing_if = "Option::is_none"
    )]
    pub input_signature: Option<String>,
    /// Outcome of output validation, if the step was validated at all.
    #[serde(
        default,
        alias = "validationPassed",
        skip_serializing_if = "Option::is_none"
    )]
    pub validation_passed: Option<bool>,
    /// CPU utilization sample in `[0, 1]`.
    #[serde(
        default,
        alias = "cpuUtilization",
        skip_serializing_if = "Option::is_none"
    )]
    pub cpu_utilization: Option<f64>,
    /// Memory utilization sample in `[0, 1]`.
    #[serde(
        default,
        alias = "memoryUtilization",
        skip_serializing_if = "Option::is_none"
    )]
    pub memory_utilization: Option<f64>,
    #[serde(
        default,
        alias = "gpuUtilization",
        skip_serializing_if = "Option::is_none"
    )]
    pub gpu_utilization: Option<f64>,
    /// Resident memory in megabytes while the step ran.
    #[serde(default, alias = "memoryMb", skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A node in the workflow DAG.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    pub id: String,
    #[serde(alias = "agentId")]
    pub agent_id: String,
    #[serde(default = "unknown_agent_name", alias = "agentName")]
    pub agent_name: String,
    /// Ids of steps that must finish before this one starts.
    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: Vec<String>,
    #[serde(default, alias = "inputTokens")]
    pub input_tokens: u64,
    #[serde(default, alias = "outputTokens")]
    pub output_tokens: u64,
    /// Epoch milliseconds. Absent means the step never started.
    #[serde(default, alias = "startTime")]
    pub start_time: Option<i64>,
    /// Epoch milliseconds. Absent means "not yet completed", not zero duration.
    #[serde(default, alias = "endTime")]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: StepMetadata,
}

impl AgentStep {
    pub fn new(id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            agent_name: unknown_agent_name(),
            dependencies: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            start_time: None,
            end_time: None,
            status: StepStatus::Pending,
            error: None,
            metadata: StepMetadata::default(),
        }
    }

    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tokens(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self
    }

    /// Record a finished execution window.
    pub fn with_timing(mut self, start_time: i64, end_time: i64) -> Self {
        self.start_time = Some(start_time);
        self.end_time = Some(end_time);
        self
    }

    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_metadata(mut self, metadata: StepMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Observed latency in milliseconds.
    ///
    /// `None` when either timestamp is missing, the window is inverted or
    /// its length does not fit in an `i64`.
    pub fn observed_latency(&self) -> Option<f64> {
        let elapsed = self.end_time?.checked_sub(self.start_time?)?;
        (elapsed >= 0).then_some(elapsed as f64)
    }

    /// True when the execution windows of two timed steps intersect.
    ///
    /// Untimed steps never overlap anything.
    pub fn overlaps(&self, other: &AgentStep) -> bool {
        match (
            self.start_time,
            self.end_time,
            other.start_time,
            other.end_time,
        ) {
            (Some(s1), Some(e1), Some(s2), Some(e2)) => s1 < e2 && s2 < e1,
            _ => false,
        }
    }
}

/// A workflow: an id, a display name and its steps in declared order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<AgentStep>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<AgentStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn step(&self, id: &str) -> Option<&AgentStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// One step invocation recorded in a previous run.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoricalStep {
    #[serde(alias = "agentId")]
    pub agent_id: String,
    #[serde(alias = "inputSignature")]
    pub input_signature: String,
}

/// Caller-supplied record of earlier runs, used only by the caching rule.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHistory {
    #[serde(default)]
    pub runs: Vec<Vec<HistoricalStep>>,
}

/// Recorded invocation counts keyed by (agent_id, input_signature).
pub type OccurrenceCounts<'a> = FxHashMap<(&'a str, &'a str), usize>;

impl ExecutionHistory {
    /// Count every recorded invocation in one pass over all runs.
    pub fn occurrence_counts(&self) -> OccurrenceCounts<'_> {
        let mut counts = OccurrenceCounts::default();
        for step in self.runs.iter().flatten() {
            *counts
                .entry((step.agent_id.as_str(), step.input_signature.as_str()))
                .or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_cost_default_rates() {
        let cost = calculate_cost(
            2000,
            1000,
            DEFAULT_INPUT_COST_PER_1K,
            DEFAULT_OUTPUT_COST_PER_1K,
        );
        // 2 * 0.001 + 1 * 0.002
        assert!((cost - 0.004).abs() < 1e-12);
    }

    #[test]
    fn test_pricing_fixed_fee() {
        let pricing = TokenPricing::new(0.01, 0.03).with_fixed(0.5);
        assert!((pricing.cost(1000, 1000) - 0.54).abs() < 1e-12);
        assert!((TokenPricing::new(0.01, 0.03).fixed_cost()).abs() < 1e-12);
    }

    #[test]
    fn test_cost_model_fallback() {
        let agents = vec![
            Agent::new("a1", "Planner").with_pricing(TokenPricing::new(0.01, 0.02)),
            Agent::new("a2", "Writer"),
        ];
        let model = CostModel::from_agents(&agents);
        assert_eq!(model.len(), 1);
        assert!(model.pricing_for("a2").is_none());

        let model = model.with_fallback(TokenPricing::default());
        assert_eq!(model.pricing_for("a2"), Some(&TokenPricing::default()));
        assert!((model.pricing_for("a1").unwrap().input - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_observed_latency() {
        let step = AgentStep::new("s", "a").with_timing(1_000, 1_250);
        assert_eq!(step.observed_latency(), Some(250.0));

        let open = AgentStep {
            start_time: Some(1_000),
            ..AgentStep::new("s", "a")
        };
        assert_eq!(open.observed_latency(), None);

        let inverted = AgentStep::new("s", "a").with_timing(2_000, 1_000);
        assert_eq!(inverted.observed_latency(), None);

        let extreme = AgentStep::new("s", "a").with_timing(i64::MIN, i64::MAX);
        assert_eq!(extreme.observed_latency(), None);
    }

    #[test]
    fn test_overlaps() {
        let a = AgentStep::new("a", "x").with_timing(0, 10);
        let b = AgentStep::new("b", "x").with_timing(10, 20);
        let c = AgentStep::new("c", "x").with_timing(5, 15);
        let untimed = AgentStep::new("d", "x");

        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
        assert!(!a.overlaps(&untimed));
    }

    #[test]
    fn test_step_deserializes_camel_case_and_nulls() {
        let json = r#"{
            "id": "s1",
            "agentId": "a1",
            "dependencies": null,
            "inputTokens": 120,
            "outputTokens": 40,
            "startTime": 100,
            "endTime": 180,
            "status": "completed",
            "metadata": {"retry_count": 2, "input_signature": "abc", "region": "eu"}
        }"#;
        let step: AgentStep = serde_json::from_str(json).unwrap();

        assert_eq!(step.agent_id, "a1");
        assert_eq!(step.agent_name, "Unknown");
        assert!(step.dependencies.is_empty());
        assert_eq!(step.input_tokens, 120);
        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.metadata.retry_count, 2);
        assert_eq!(step.metadata.input_signature.as_deref(), Some("abc"));
        assert_eq!(
            step.metadata.extra.get("region"),
            Some(&serde_json::Value::from("eu"))
        );
    }

    #[test]
    fn test_history_occurrences() {
        let history = ExecutionHistory {
            runs: vec![
                vec![HistoricalStep {
                    agent_id: "a1".to_string(),
                    input_signature: "q".to_string(),
                }],
                vec![
                    HistoricalStep {
                        agent_id: "a1".to_string(),
                        input_signature: "q".to_string(),
                    },
                    HistoricalStep {
                        agent_id: "a2".to_string(),
                        input_signature: "q".to_string(),
                    },
                ],
            ],
        };
        let counts = history.occurrence_counts();
        assert_eq!(counts.get(&("a1", "q")), Some(&2));
        assert_eq!(counts.get(&("a2", "q")), Some(&1));
        assert_eq!(counts.get(&("a3", "q")), None);
        assert_eq!(counts.len(), 2);
    }
}
