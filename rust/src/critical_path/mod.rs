//! Critical path analysis.
//!
//! Standard forward/backward scheduling passes over the workflow DAG:
//! earliest and latest start/finish per step, slack, one critical chain,
//! and bottleneck classification.

mod bottleneck;
mod calculation;
mod types;

pub use bottleneck::classify_bottlenecks;
pub use calculation::{analyze, analyze_cancellable, observed_durations, AnalyzeError};
pub use types::{
    slack_tolerance, Bottleneck, BottleneckCause, CriticalPathAnalysis, StepTiming,
    SLACK_EPSILON,
};
