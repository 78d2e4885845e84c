//! Quality and resource rollups.

use crate::models::{AgentStep, StepStatus};

use super::types::{QualityMetrics, ResourceMetrics};

pub fn quality_metrics(steps: &[&AgentStep]) -> QualityMetrics {
    let total = steps.len();
    if total == 0 {
        return QualityMetrics::default();
    }

    let completed = steps
        .iter()
        .filter(|s| s.status == StepStatus::Completed)
        .count();
    let failed = steps
        .iter()
        .filter(|s| s.status == StepStatus::Failed)
        .count();
    let retry_count = steps
        .iter()
        .map(|s| u64::from(s.metadata.retry_count))
        .sum();

    let validated: Vec<bool> = steps
        .iter()
        .filter_map(|s| s.metadata.validation_passed)
        .collect();
    let validation_pass_rate = (!validated.is_empty())
        .then(|| validated.iter().filter(|&&p| p).count() as f64 / validated.len() as f64);

    QualityMetrics {
        success_rate: completed as f64 / total as f64,
        failure_rate: failed as f64 / total as f64,
        retry_count,
        validation_pass_rate,
    }
}

/// Success rate of a single step across its attempts.
///
/// A completed step succeeded once out of `retry_count + 1` attempts;
/// anything not completed has no success yet.
pub fn step_success_rate(step: &AgentStep) -> f64 {
    match step.status {
        StepStatus::Completed => 1.0 / f64::from(step.metadata.retry_count.saturating_add(1)),
        StepStatus::Failed | StepStatus::Pending | StepStatus::Running => 0.0,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

pub fn resource_metrics(steps: &[&AgentStep]) -> ResourceMetrics {
    let samples = |f: fn(&AgentStep) -> Option<f64>| -> Vec<f64> {
        steps.iter().filter_map(|s| f(s)).collect()
    };

    let cpu = samples(|s| s.metadata.cpu_utilization);
    let memory = samples(|s| s.metadata.memory_utilization);
    let gpu = samples(|s| s.metadata.gpu_utilization);
    let memory_mb = samples(|s| s.metadata.memory_mb);

    ResourceMetrics {
        cpu_utilization: mean(&cpu).unwrap_or(0.0),
        memory_utilization: mean(&memory).unwrap_or(0.0),
        gpu_utilization: mean(&gpu),
        peak_memory_mb: memory_mb.iter().copied().reduce(f64::max),
        avg_memory_mb: mean(&memory_mb),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepMetadata;

    fn make_step(id: &str, status: StepStatus, metadata: StepMetadata) -> AgentStep {
        AgentStep::new(id, "agent")
            .with_status(status)
            .with_metadata(metadata)
    }

    #[test]
    fn test_quality_rates() {
        let steps = vec![
            make_step(
                "a",
                StepStatus::Completed,
                StepMetadata {
                    retry_count: 2,
                    validation_passed: Some(true),
                    ..Default::default()
                },
            ),
            make_step(
                "b",
                StepStatus::Failed,
                StepMetadata {
                    retry_count: 1,
                    validation_passed: Some(false),
                    ..Default::default()
                },
            ),
            make_step("c", StepStatus::Completed, StepMetadata::default()),
            make_step("d", StepStatus::Running, StepMetadata::default()),
        ];
        let refs: Vec<&AgentStep> = steps.iter().collect();
        let quality = quality_metrics(&refs);

        assert!((quality.success_rate - 0.5).abs() < 1e-9);
        assert!((quality.failure_rate - 0.25).abs() < 1e-9);
        assert_eq!(quality.retry_count, 3);
        assert_eq!(quality.validation_pass_rate, Some(0.5));
    }

    #[test]
    fn test_quality_empty() {
        let quality = quality_metrics(&[]);
        assert_eq!(quality.success_rate, 0.0);
        assert_eq!(quality.validation_pass_rate, None);
    }

    #[test]
    fn test_step_success_rate_counts_retries() {
        let retried = make_step(
            "a",
            StepStatus::Completed,
            StepMetadata {
                retry_count: 3,
                ..Default::default()
            },
        );
        assert!((step_success_rate(&retried) - 0.25).abs() < 1e-9);
        assert_eq!(
            step_success_rate(&make_step("b", StepStatus::Failed, StepMetadata::default())),
            0.0
        );
    }

    #[test]
    fn test_resource_rollup() {
        let steps = vec![
            make_step(
                "a",
                StepStatus::Completed,
                StepMetadata {
                    cpu_utilization: Some(0.4),
                    memory_mb: Some(512.0),
                    ..Default::default()
                },
            ),
            make_step(
                "b",
                StepStatus::Completed,
                StepMetadata {
                    cpu_utilization: Some(0.8),
                    memory_utilization: Some(0.5),
                    memory_mb: Some(1024.0),
                    ..Default::default()
                },
            ),
        ];
        let refs: Vec<&AgentStep> = steps.iter().collect();
        let resources = resource_metrics(&refs);

        assert!((resources.cpu_utilization - 0.6).abs() < 1e-9);
        assert!((resources.memory_utilization - 0.5).abs() < 1e-9);
        assert_eq!(resources.gpu_utilization, None);
        assert_eq!(resources.peak_memory_mb, Some(1024.0));
        assert_eq!(resources.avg_memory_mb, Some(768.0));
    }
}
