//! Rule-based optimization opportunity derivation.
//!
//! Three rules, applied in this order:
//! - Parallelization: consecutive declared steps that are mutually
//!   independent yet ran one after another
//! - Elimination: cheap, fast steps off the critical path
//! - Caching: agent + input signature pairs seen more than once (needs
//!   caller-supplied history)

use rustc_hash::FxHashMap;

use crate::config::AnalysisConfig;
use crate::critical_path::CriticalPathAnalysis;
use crate::graph::{Reachability, WorkflowDag};
use crate::interner::StepIndex;
use crate::log_checks;
use crate::models::{AgentStep, ExecutionHistory};

use super::types::{OpportunityKind, OptimizationOpportunity};

/// Shared inputs for the opportunity rules. Slices are indexed by DAG step
/// index.
pub struct OpportunityContext<'a> {
    pub dag: &'a WorkflowDag,
    pub steps: &'a [&'a AgentStep],
    pub analysis: &'a CriticalPathAnalysis,
    pub step_costs: &'a [f64],
    pub total_cost: f64,
    pub config: &'a AnalysisConfig,
}

impl OpportunityContext<'_> {
    fn ids(&self, members: &[StepIndex]) -> Vec<String> {
        members
            .iter()
            .map(|&s| self.steps[s as usize].id.clone())
            .collect()
    }
}

pub fn derive_opportunities(
    ctx: &OpportunityContext<'_>,
    history: Option<&ExecutionHistory>,
) -> Vec<OptimizationOpportunity> {
    let mut opportunities = parallelization_candidates(ctx);
    opportunities.extend(elimination_candidates(ctx));
    if let Some(history) = history {
        opportunities.extend(caching_candidates(ctx, history));
    }
    opportunities
}

/// Group maximal runs of consecutive declared steps where every member is
/// independent of every other and no two execution windows overlap.
///
/// Untimed steps count as sequential, since that is how they were declared.
/// Estimated reduction is sum(durations) - max(durations) of the run.
pub fn parallelization_candidates(ctx: &OpportunityContext<'_>) -> Vec<OptimizationOpportunity> {
    let reach = Reachability::new(ctx.dag);
    let mut opportunities = Vec::new();
    let mut run: Vec<StepIndex> = Vec::new();

    for step in 0..ctx.dag.len() as StepIndex {
        let joins = !run.is_empty()
            && run
                .iter()
                .all(|&member| !ctx.steps[member as usize].overlaps(ctx.steps[step as usize]))
            && reach.independent_of_all(step, &run);
        if !joins {
            flush_run(ctx, &run, &mut opportunities);
            run.clear();
        }
        run.push(step);
    }
    flush_run(ctx, &run, &mut opportunities);

    opportunities
}

fn flush_run(
    ctx: &OpportunityContext<'_>,
    run: &[StepIndex],
    opportunities: &mut Vec<OptimizationOpportunity>,
) {
    if run.len() < 2 {
        return;
    }
    let durations: Vec<f64> = run.iter().map(|&s| ctx.analysis.duration(s)).collect();
    let sum: f64 = durations.iter().sum();
    let max = durations.iter().copied().fold(0.0, f64::max);
    let reduction = sum - max;
    if reduction <= 0.0 {
        return;
    }

    log_checks!(
        ctx.config.verbosity,
        steps = run.len(),
        reduction,
        "parallelization candidate"
    );
    opportunities.push(OptimizationOpportunity::new(
        OpportunityKind::Parallelization,
        ctx.ids(run),
        reduction,
        0.0,
    ));
}

/// Non-critical steps below `elimination_fraction` of both total cost and
/// total latency.
///
/// Dropping a step with slack does not shorten the workflow, so only the
/// cost reduction is estimated.
pub fn elimination_candidates(ctx: &OpportunityContext<'_>) -> Vec<OptimizationOpportunity> {
    let total_latency = ctx.analysis.total_latency;
    let share = |value: f64, total: f64| if total > 0.0 { value / total } else { 0.0 };

    (0..ctx.dag.len() as StepIndex)
        .filter(|&step| !ctx.analysis.is_critical(step))
        .filter(|&step| {
            let cost = ctx.step_costs[step as usize];
            share(cost, ctx.total_cost) < ctx.config.elimination_fraction
                && share(ctx.analysis.duration(step), total_latency)
                    < ctx.config.elimination_fraction
        })
        .map(|step| {
            OptimizationOpportunity::new(
                OpportunityKind::Elimination,
                ctx.ids(&[step]),
                0.0,
                ctx.step_costs[step as usize],
            )
        })
        .collect()
}

/// Steps whose (agent, input signature) pair occurs more than once across
/// history plus this run.
///
/// With a prior occurrence in history every member can hit the cache;
/// otherwise the first member must still execute. Latency reduction counts
/// only cacheable members on the critical path.
pub fn caching_candidates(
    ctx: &OpportunityContext<'_>,
    history: &ExecutionHistory,
) -> Vec<OptimizationOpportunity> {
    // Groups keep first-appearance order; the map points into `groups`
    let mut groups: Vec<((&str, &str), Vec<StepIndex>)> = Vec::new();
    let mut group_of: FxHashMap<(&str, &str), usize> = FxHashMap::default();
    for (idx, step) in ctx.steps.iter().enumerate() {
        let Some(signature) = step.metadata.input_signature.as_deref() else {
            continue;
        };
        let key = (step.agent_id.as_str(), signature);
        let slot = *group_of.entry(key).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(idx as StepIndex);
    }

    let counts = history.occurrence_counts();
    let mut opportunities = Vec::new();
    for ((agent_id, signature), members) in groups {
        let prior = counts.get(&(agent_id, signature)).copied().unwrap_or(0);
        if prior + members.len() < 2 {
            continue;
        }
        let cacheable = if prior > 0 { &members[..] } else { &members[1..] };

        let latency_reduction: f64 = cacheable
            .iter()
            .filter(|&&s| ctx.analysis.is_critical(s))
            .map(|&s| ctx.analysis.duration(s))
            .sum();
        let cost_reduction: f64 = cacheable
            .iter()
            .map(|&s| ctx.step_costs[s as usize])
            .sum();

        log_checks!(
            ctx.config.verbosity,
            agent_id,
            prior,
            current = members.len(),
            "caching candidate"
        );
        opportunities.push(OptimizationOpportunity::new(
            OpportunityKind::Caching,
            ctx.ids(&members),
            latency_reduction,
            cost_reduction,
        ));
    }
    opportunities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::types::Complexity;
    use crate::critical_path::{analyze, observed_durations};
    use crate::graph::build;
    use crate::models::{HistoricalStep, StepMetadata};

    struct Fixture {
        steps: Vec<AgentStep>,
        dag: WorkflowDag,
        analysis: CriticalPathAnalysis,
        config: AnalysisConfig,
    }

    impl Fixture {
        fn new(steps: Vec<AgentStep>) -> Self {
            let dag = build(&steps).unwrap();
            let config = AnalysisConfig::default();
            let analysis = analyze(&dag, &observed_durations(&dag, &steps), &config).unwrap();
            Self {
                steps,
                dag,
                analysis,
                config,
            }
        }

        fn with_context<R>(
            &self,
            costs: &[f64],
            f: impl FnOnce(&OpportunityContext<'_>) -> R,
        ) -> R {
            let refs: Vec<&AgentStep> = self.steps.iter().collect();
            let ctx = OpportunityContext {
                dag: &self.dag,
                steps: &refs,
                analysis: &self.analysis,
                step_costs: costs,
                total_cost: costs.iter().sum(),
                config: &self.config,
            };
            f(&ctx)
        }
    }

    fn timed(id: &str, deps: &[&str], start: i64, end: i64) -> AgentStep {
        AgentStep::new(id, "agent")
            .with_dependencies(deps.iter().copied())
            .with_timing(start, end)
    }

    #[test]
    fn test_sequential_independent_steps() {
        let fixture = Fixture::new(vec![
            timed("a", &[], 0, 10),
            timed("b", &[], 10, 20),
            timed("c", &["a", "b"], 20, 25),
        ]);
        let opps = fixture.with_context(&[0.0; 3], parallelization_candidates);

        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].steps, vec!["a", "b"]);
        assert!((opps[0].estimated_latency_reduction - 10.0).abs() < 1e-9);
        assert_eq!(opps[0].implementation_complexity, Complexity::Medium);
    }

    #[test]
    fn test_overlapping_steps_already_parallel() {
        let fixture = Fixture::new(vec![
            timed("a", &[], 0, 10),
            timed("b", &[], 2, 12),
            timed("c", &["a", "b"], 12, 15),
        ]);
        let opps = fixture.with_context(&[0.0; 3], parallelization_candidates);
        assert!(opps.is_empty());
    }

    #[test]
    fn test_dependent_steps_break_run() {
        let fixture = Fixture::new(vec![
            timed("a", &[], 0, 10),
            timed("b", &["a"], 10, 30),
            timed("c", &[], 30, 35),
            timed("d", &[], 35, 45),
        ]);
        let opps = fixture.with_context(&[0.0; 4], parallelization_candidates);

        // a and b are dependent; b, c, d are mutually independent
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].steps, vec!["b", "c", "d"]);
        assert!((opps[0].estimated_latency_reduction - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_elimination_of_tiny_side_step() {
        let fixture = Fixture::new(vec![
            timed("main", &[], 0, 1000),
            timed("log", &[], 0, 5),
            timed("end", &["main", "log"], 1000, 1100),
        ]);
        let opps = fixture.with_context(&[10.0, 0.01, 5.0], elimination_candidates);

        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].steps, vec!["log"]);
        assert_eq!(opps[0].estimated_latency_reduction, 0.0);
        assert!((opps[0].estimated_cost_reduction - 0.01).abs() < 1e-12);
        assert_eq!(opps[0].implementation_complexity, Complexity::Low);
    }

    #[test]
    fn test_expensive_side_step_not_eliminated() {
        let fixture = Fixture::new(vec![
            timed("main", &[], 0, 1000),
            timed("side", &[], 0, 5),
            timed("end", &["main", "side"], 1000, 1100),
        ]);
        let opps = fixture.with_context(&[1.0, 1.0, 1.0], elimination_candidates);
        assert!(opps.is_empty());
    }

    fn signed(id: &str, agent: &str, signature: &str, start: i64, end: i64) -> AgentStep {
        AgentStep {
            agent_id: agent.to_string(),
            ..timed(id, &[], start, end)
        }
        .with_metadata(StepMetadata {
            input_signature: Some(signature.to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_caching_with_history() {
        let fixture = Fixture::new(vec![
            signed("lookup", "search", "q1", 0, 40),
            signed("other", "search", "q2", 0, 10),
        ]);
        let history = ExecutionHistory {
            runs: vec![vec![HistoricalStep {
                agent_id: "search".to_string(),
                input_signature: "q1".to_string(),
            }]],
        };
        let opps = fixture.with_context(&[0.3, 0.1], |ctx| caching_candidates(ctx, &history));

        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].steps, vec!["lookup"]);
        assert!((opps[0].estimated_latency_reduction - 40.0).abs() < 1e-9);
        assert!((opps[0].estimated_cost_reduction - 0.3).abs() < 1e-12);
        assert_eq!(opps[0].implementation_complexity, Complexity::High);
    }

    #[test]
    fn test_caching_repeat_within_run() {
        let fixture = Fixture::new(vec![
            signed("first", "search", "q", 0, 10),
            signed("second", "search", "q", 10, 20),
        ]);
        let opps = fixture.with_context(&[0.2, 0.2], |ctx| {
            caching_candidates(ctx, &ExecutionHistory::default())
        });

        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].steps, vec!["first", "second"]);
        // Only the second execution can be served from cache
        assert!((opps[0].estimated_cost_reduction - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_caching_groups_keep_first_appearance_order() {
        let fixture = Fixture::new(vec![
            signed("a", "search", "q1", 0, 10),
            signed("b", "search", "q2", 10, 20),
            signed("c", "search", "q1", 20, 30),
            signed("d", "search", "q2", 30, 40),
            signed("e", "rank", "q1", 40, 50),
        ]);
        let history = ExecutionHistory {
            runs: vec![
                vec![HistoricalStep {
                    agent_id: "rank".to_string(),
                    input_signature: "q1".to_string(),
                }],
                vec![HistoricalStep {
                    agent_id: "search".to_string(),
                    input_signature: "q2".to_string(),
                }],
            ],
        };
        let opps = fixture.with_context(&[1.0, 2.0, 3.0, 4.0, 5.0], |ctx| {
            caching_candidates(ctx, &history)
        });

        let groups: Vec<Vec<String>> = opps.iter().map(|o| o.steps.clone()).collect();
        assert_eq!(groups, vec![vec!["a", "c"], vec!["b", "d"], vec!["e"]]);
        // q1 has no history, so its first run still executes
        assert!((opps[0].estimated_cost_reduction - 3.0).abs() < 1e-12);
        assert!((opps[1].estimated_cost_reduction - 6.0).abs() < 1e-12);
        assert!((opps[2].estimated_cost_reduction - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_long_chain_has_no_parallel_runs() {
        let steps: Vec<AgentStep> = (0..20_000i64)
            .map(|i| {
                let id = format!("s{i}");
                match i {
                    0 => timed(&id, &[], 0, 10),
                    _ => timed(&id, &[format!("s{}", i - 1).as_str()], i * 10, i * 10 + 10),
                }
            })
            .collect();
        let fixture = Fixture::new(steps);
        let costs = vec![1.0; 20_000];
        let opps = fixture.with_context(&costs, parallelization_candidates);
        assert!(opps.is_empty());
    }

    #[test]
    fn test_caching_skipped_without_history() {
        let fixture = Fixture::new(vec![
            signed("first", "search", "q", 0, 10),
            signed("second", "search", "q", 10, 20),
        ]);
        let opps = fixture.with_context(&[0.2, 0.2], |ctx| derive_opportunities(ctx, None));
        assert!(opps.iter().all(|o| o.kind != OpportunityKind::Caching));
    }
}
