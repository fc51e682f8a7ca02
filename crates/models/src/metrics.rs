use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Passed,
    Failed(String),
    Skipped,
}

impl StepStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Passed => "PASS",
            StepStatus::Failed(_) => "FAIL",
            StepStatus::Skipped => "SKIP",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepStatus::Failed(_))
    }
}

/// Outcome of one step in one job run. Recorded once, in step order, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMetric {
    pub step_name: String,
    pub duration: Duration,
    pub status: StepStatus,
}

impl StepMetric {
    pub fn passed(step_name: impl Into<String>, duration: Duration) -> Self {
        StepMetric {
            step_name: step_name.into(),
            duration,
            status: StepStatus::Passed,
        }
    }

    pub fn failed(
        step_name: impl Into<String>,
        duration: Duration,
        cause: impl Into<String>,
    ) -> Self {
        StepMetric {
            step_name: step_name.into(),
            duration,
            status: StepStatus::Failed(cause.into()),
        }
    }

    pub fn skipped(step_name: impl Into<String>) -> Self {
        StepMetric {
            step_name: step_name.into(),
            duration: Duration::ZERO,
            status: StepStatus::Skipped,
        }
    }
}
