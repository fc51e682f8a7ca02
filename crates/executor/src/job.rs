use crate::error::{ExecutionError, StepError};
use crate::step::{Step, StepContext};
use futures::future::BoxFuture;
use logging::Reporter;
use models::{DataContext, StepMetric};
use runtime::RuntimeClient;
use std::time::Instant;

/// Ordered steps sharing one environment.
#[derive(Debug)]
pub struct Job {
    name: String,
    image: String,
    env: Vec<(String, String)>,
    steps: Vec<Step>,
    metrics: Vec<StepMetric>,
}

impl Job {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Job {
            name: name.into(),
            image: image.into(),
            env: Vec::new(),
            steps: Vec::new(),
            metrics: Vec::new(),
        }
    }

    /// Variable bound on the job's environment before the first step runs.
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }

    pub fn with_step<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: for<'a> Fn(StepContext<'a>) -> BoxFuture<'a, Result<DataContext, StepError>>
            + Send
            + Sync
            + 'static,
    {
        self.steps.push(Step::new(name, action));
        self
    }

    pub fn add_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Metrics of the last run, one per step in step order.
    pub fn metrics(&self) -> &[StepMetric] {
        &self.metrics
    }

    /// True once a run has recorded metrics and none of them failed.
    pub fn passed(&self) -> bool {
        !self.metrics.is_empty() && self.metrics.iter().all(|m| !m.status.is_failed())
    }

    /// Provisions the job's environment and runs every step against it.
    ///
    /// The first failing step fails the job; the steps after it are recorded as skipped and
    /// never run. On success the output of the last step is returned.
    pub async fn run(
        &mut self,
        client: &RuntimeClient,
        inputs: DataContext,
    ) -> Result<DataContext, ExecutionError> {
        let reporter = client.reporter();
        self.metrics.clear();
        reporter.info(&format!("Starting job: {} ({})", self.name, self.image));

        let mut container = client
            .create_environment(&self.image)
            .await
            .map_err(|source| ExecutionError::Environment {
                job: self.name.clone(),
                source,
            })?;
        for (name, value) in &self.env {
            container.add_variable(name, value.as_str());
        }

        let mut context = inputs;
        let mut failure: Option<(String, StepError)> = None;

        for step in &self.steps {
            if failure.is_some() {
                reporter.debug(&format!("Skipping step: {}", step.name()));
                self.metrics.push(StepMetric::skipped(step.name()));
                continue;
            }

            let started = Instant::now();
            let result = step.run(client, &mut container, &context).await;
            let duration = started.elapsed();

            match result {
                Ok(output) => {
                    self.metrics.push(StepMetric::passed(step.name(), duration));
                    context = output;
                }
                Err(e) => {
                    reporter.error(&format!("Step '{}' failed: {}", step.name(), e));
                    self.metrics
                        .push(StepMetric::failed(step.name(), duration, e.to_string()));
                    failure = Some((step.name().to_string(), e));
                }
            }
        }

        match failure {
            Some((step, source)) => Err(ExecutionError::StepFailed {
                job: self.name.clone(),
                step,
                source,
            }),
            None => {
                reporter.info(&format!("Job succeeded: {}", self.name));
                Ok(context)
            }
        }
    }

    pub fn display_summary(&self, reporter: &dyn Reporter) {
        reporter.render_summary(&format!("Job: {}", self.name), &self.metrics);
    }
}
