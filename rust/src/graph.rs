//! Workflow graph construction and validation.
//!
//! Turns a flat list of steps into an indexed DAG with forward and reverse
//! edges, a deterministic topological order and topological layers.

use rustc_hash::FxHashSet;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use thiserror::Error;

use crate::interner::{StepIdInterner, StepIndex};
use crate::models::AgentStep;

/// Structural problems that make a step list unusable as a DAG.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate step id: {0}")]
    DuplicateStepId(String),
    #[error("Step {step_id} depends on unknown step {dependency_id}")]
    UnknownDependency {
        step_id: String,
        dependency_id: String,
    },
    #[error("Cyclic dependency detected: {}", format_cycle(.cycle_path))]
    CyclicDependency { cycle_path: Vec<String> },
}

impl GraphError {
    /// True for input validation failures (as opposed to a cycle).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GraphError::DuplicateStepId(_) | GraphError::UnknownDependency { .. }
        )
    }
}

fn format_cycle(path: &[String]) -> String {
    match path.first() {
        Some(first) => format!("{} -> {}", path.join(" -> "), first),
        None => String::new(),
    }
}

/// Validated, indexed workflow graph.
///
/// Step indices follow declared order, so index comparisons double as the
/// insertion-order tiebreak.
#[derive(Debug, Clone, Default)]
pub struct WorkflowDag {
    index: StepIdInterner,
    /// Dependencies of each step (edges step -> prerequisite).
    deps: Vec<Vec<StepIndex>>,
    /// Dependents of each step (edges prerequisite -> step).
    dependents: Vec<Vec<StepIndex>>,
    topo_order: Vec<StepIndex>,
    layers: Vec<Vec<StepIndex>>,
}

impl WorkflowDag {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index_of(&self, id: &str) -> Option<StepIndex> {
        self.index.get(id)
    }

    pub fn step_id(&self, step: StepIndex) -> Option<&str> {
        self.index.resolve(step)
    }

    /// Step ids in declared order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.index.ids()
    }

    pub fn dependencies(&self, step: StepIndex) -> &[StepIndex] {
        self.deps.get(step as usize).map_or(&[], |v| v.as_slice())
    }

    pub fn dependents(&self, step: StepIndex) -> &[StepIndex] {
        self.dependents
            .get(step as usize)
            .map_or(&[], |v| v.as_slice())
    }

    /// Dependencies before dependents; ties resolved by declared order.
    pub fn topological_order(&self) -> &[StepIndex] {
        &self.topo_order
    }

    /// Steps grouped by depth (longest dependency chain leading to them).
    ///
    /// No two steps in a layer depend on each other, and every dependency of
    /// a step lives in an earlier layer.
    pub fn layers(&self) -> &[Vec<StepIndex>] {
        &self.layers
    }

    pub fn is_source(&self, step: StepIndex) -> bool {
        self.dependencies(step).is_empty()
    }

    pub fn is_sink(&self, step: StepIndex) -> bool {
        self.dependents(step).is_empty()
    }
}

/// Build and validate a DAG from a list of steps.
///
/// Checks run in order: duplicate ids, unknown dependencies, cycles. Any
/// failure aborts without returning a partial graph.
pub fn build(steps: &[AgentStep]) -> Result<WorkflowDag, GraphError> {
    let mut index = StepIdInterner::with_capacity(steps.len());
    for step in steps {
        if index.insert_unique(&step.id).is_err() {
            return Err(GraphError::DuplicateStepId(step.id.clone()));
        }
    }

    let n = steps.len();
    let mut deps: Vec<Vec<StepIndex>> = vec![Vec::new(); n];
    let mut dependents: Vec<Vec<StepIndex>> = vec![Vec::new(); n];

    for (idx, step) in steps.iter().enumerate() {
        let mut seen: FxHashSet<StepIndex> = FxHashSet::default();
        for dep_id in &step.dependencies {
            let dep = index
                .get(dep_id)
                .ok_or_else(|| GraphError::UnknownDependency {
                    step_id: step.id.clone(),
                    dependency_id: dep_id.clone(),
                })?;
            // Repeated entries in one step's list are a single edge
            if seen.insert(dep) {
                deps[idx].push(dep);
                dependents[dep as usize].push(idx as StepIndex);
            }
        }
    }

    if let Some(cycle_path) = find_cycle(&index, &deps) {
        return Err(GraphError::CyclicDependency { cycle_path });
    }

    let topo_order = topological_sort(&deps, &dependents);
    let layers = build_layers(&deps, &topo_order);

    Ok(WorkflowDag {
        index,
        deps,
        dependents,
        topo_order,
        layers,
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Three-color depth-first search over dependency edges.
///
/// Returns the ids on the first cycle found, in the order the traversal
/// entered them.
fn find_cycle(index: &StepIdInterner, deps: &[Vec<StepIndex>]) -> Option<Vec<String>> {
    let mut marks = vec![Mark::Unvisited; deps.len()];
    // (step, position of the next dependency to visit)
    let mut stack: Vec<(StepIndex, usize)> = Vec::new();

    for root in 0..deps.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::InProgress;
        stack.push((root as StepIndex, 0));

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let Some(&dep) = deps[node as usize].get(frame.1) else {
                marks[node as usize] = Mark::Done;
                stack.pop();
                continue;
            };
            frame.1 += 1;

            match marks[dep as usize] {
                Mark::Unvisited => {
                    marks[dep as usize] = Mark::InProgress;
                    stack.push((dep, 0));
                }
                Mark::InProgress => {
                    let start = stack.iter().position(|&(s, _)| s == dep).unwrap_or(0);
                    return Some(
                        stack[start..]
                            .iter()
                            .filter_map(|&(s, _)| index.resolve(s))
                            .map(str::to_string)
                            .collect(),
                    );
                }
                Mark::Done => {}
            }
        }
    }

    None
}

/// Kahn's algorithm with a min-heap so ready steps leave in declared order.
///
/// Only called on acyclic input.
fn topological_sort(deps: &[Vec<StepIndex>], dependents: &[Vec<StepIndex>]) -> Vec<StepIndex> {
    let mut in_degree: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<StepIndex>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &degree)| degree == 0)
        .map(|(idx, _)| Reverse(idx as StepIndex))
        .collect();

    let mut order = Vec::with_capacity(deps.len());
    while let Some(Reverse(step)) = ready.pop() {
        order.push(step);
        for &dependent in &dependents[step as usize] {
            let degree = &mut in_degree[dependent as usize];
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }
    order
}

fn build_layers(deps: &[Vec<StepIndex>], topo_order: &[StepIndex]) -> Vec<Vec<StepIndex>> {
    let mut depth = vec![0usize; deps.len()];
    let mut layers: Vec<Vec<StepIndex>> = Vec::new();

    for &step in topo_order {
        let d = deps[step as usize]
            .iter()
            .map(|&dep| depth[dep as usize] + 1)
            .max()
            .unwrap_or(0);
        depth[step as usize] = d;
        if layers.len() <= d {
            layers.resize_with(d + 1, Vec::new);
        }
        layers[d].push(step);
    }

    for layer in &mut layers {
        layer.sort_unstable();
    }
    layers
}

/// On-demand "is either step reachable from the other" queries.
///
/// Searches walk the edges lazily and stop at the topological position of
/// the targets, so memory stays linear in the number of steps.
#[derive(Debug, Clone)]
pub struct Reachability<'a> {
    dag: &'a WorkflowDag,
    /// Position of each step in `dag.topological_order()`.
    position: Vec<usize>,
}

impl<'a> Reachability<'a> {
    pub fn new(dag: &'a WorkflowDag) -> Self {
        let mut position = vec![0; dag.len()];
        for (pos, &step) in dag.topological_order().iter().enumerate() {
            position[step as usize] = pos;
        }
        Self { dag, position }
    }

    /// True when `step` transitively depends on `other`.
    pub fn depends_on(&self, step: StepIndex, other: StepIndex) -> bool {
        self.reaches_any(step, &[other], true)
    }

    /// True when neither step is reachable from the other.
    pub fn independent(&self, a: StepIndex, b: StepIndex) -> bool {
        a != b && self.independent_of_all(a, &[b])
    }

    /// True when `step` neither depends on nor is depended on by any of
    /// `others`. `step` itself must not be among them.
    pub fn independent_of_all(&self, step: StepIndex, others: &[StepIndex]) -> bool {
        !self.reaches_any(step, others, true) && !self.reaches_any(step, others, false)
    }

    /// Walk dependencies (`upstream`) or dependents from `from`, looking for
    /// any of `targets`.
    fn reaches_any(&self, from: StepIndex, targets: &[StepIndex], upstream: bool) -> bool {
        let origin = self.position[from as usize];
        let targets: FxHashSet<StepIndex> = targets
            .iter()
            .copied()
            .filter(|&t| {
                let pos = self.position[t as usize];
                if upstream {
                    pos < origin
                } else {
                    pos > origin
                }
            })
            .collect();
        // Upstream steps only ever sit earlier in topological order, so
        // nothing past the furthest target can lead to one.
        let bound = if upstream {
            targets.iter().map(|&t| self.position[t as usize]).min()
        } else {
            targets.iter().map(|&t| self.position[t as usize]).max()
        };
        let Some(bound) = bound else {
            return false;
        };

        let mut seen: FxHashSet<StepIndex> = FxHashSet::default();
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            let next = if upstream {
                self.dag.dependencies(node)
            } else {
                self.dag.dependents(node)
            };
            for &n in next {
                if targets.contains(&n) {
                    return true;
                }
                let pos = self.position[n as usize];
                let in_range = if upstream { pos > bound } else { pos < bound };
                if in_range && seen.insert(n) {
                    stack.push(n);
                }
            }
        }
        false
    }
}
