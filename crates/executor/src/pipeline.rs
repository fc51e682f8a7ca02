use crate::docker::DockerSubstrate;
use crate::error::ExecutionError;
use crate::job::Job;
use logging::Reporter;
use models::DataContext;
use runtime::{EmulationSubstrate, RuntimeClient, RuntimeConfig, RuntimeError, Substrate};
use std::future::{self, Future};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeType {
    Docker,
    Emulation,
}

enum SubstrateSource {
    Runtime(RuntimeType),
    Provided(Arc<dyn Substrate>),
}

/// Ordered jobs sharing one runtime client.
pub struct Pipeline {
    name: String,
    jobs: Vec<Job>,
    reporter: Arc<dyn Reporter>,
    source: SubstrateSource,
    config: RuntimeConfig,
    summaries: bool,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, reporter: Arc<dyn Reporter>) -> Self {
        Pipeline {
            name: name.into(),
            jobs: Vec::new(),
            reporter,
            source: SubstrateSource::Runtime(RuntimeType::Docker),
            config: RuntimeConfig::default(),
            summaries: true,
        }
    }

    pub fn with_runtime(mut self, runtime_type: RuntimeType) -> Self {
        self.source = SubstrateSource::Runtime(runtime_type);
        self
    }

    /// Runs against an already connected substrate instead of opening one.
    pub fn with_substrate(mut self, substrate: Arc<dyn Substrate>) -> Self {
        self.source = SubstrateSource::Provided(substrate);
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether each job's summary table is rendered after it runs.
    pub fn with_summaries(mut self, enabled: bool) -> Self {
        self.summaries = enabled;
        self
    }

    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    /// Jobs run in the order they were added.
    pub fn add_job(&mut self, job: Job) {
        self.jobs.push(job);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Runs every job in order, handing each the context produced by the previous one.
    ///
    /// Stops at the first failing job. The runtime client is closed on every path once it
    /// has been opened, which removes all environments the run created. Dropping the returned
    /// future early still removes them, from a background task.
    pub async fn run(&mut self, inputs: DataContext) -> Result<DataContext, ExecutionError> {
        self.run_until(inputs, future::pending()).await
    }

    /// Like [`Pipeline::run`], but abandons the remaining work with
    /// [`ExecutionError::Interrupted`] once `shutdown` completes. The client is closed before
    /// this returns.
    pub async fn run_until<S>(
        &mut self,
        inputs: DataContext,
        shutdown: S,
    ) -> Result<DataContext, ExecutionError>
    where
        S: Future<Output = ()>,
    {
        self.reporter
            .info(&format!("Starting pipeline: {}", self.name));

        let substrate = self.connect().map_err(|e| {
            self.reporter.error(&e.to_string());
            ExecutionError::Runtime(e)
        })?;
        let client =
            RuntimeClient::with_config(substrate, self.reporter.clone(), self.config.clone());

        let reporter = self.reporter.clone();
        let result = tokio::select! {
            result = self.run_jobs(&client, inputs) => result,
            _ = shutdown => {
                reporter.warning("Interrupted, cleaning up environments");
                Err(ExecutionError::Interrupted)
            }
        };

        match client.close().await {
            Ok(()) => result,
            Err(e) => {
                self.reporter
                    .error(&format!("Failed to close runtime client: {}", e));
                match result {
                    Ok(_) => Err(ExecutionError::Runtime(e)),
                    Err(job_error) => Err(job_error),
                }
            }
        }
    }

    async fn run_jobs(
        &mut self,
        client: &RuntimeClient,
        inputs: DataContext,
    ) -> Result<DataContext, ExecutionError> {
        let mut context = inputs;

        for job in &mut self.jobs {
            let result = job.run(client, context).await;
            if self.summaries {
                job.display_summary(self.reporter.as_ref());
            }

            match result {
                Ok(output) => context = output,
                Err(e) => {
                    self.reporter.error(&e.to_string());
                    return Err(e);
                }
            }
        }

        self.reporter
            .info(&format!("Pipeline completed: {}", self.name));
        Ok(context)
    }

    fn connect(&self) -> Result<Arc<dyn Substrate>, RuntimeError> {
        match &self.source {
            SubstrateSource::Provided(substrate) => Ok(substrate.clone()),
            SubstrateSource::Runtime(RuntimeType::Docker) => {
                Ok(Arc::new(DockerSubstrate::connect()?))
            }
            SubstrateSource::Runtime(RuntimeType::Emulation) => {
                Ok(Arc::new(EmulationSubstrate::new()))
            }
        }
    }
}
