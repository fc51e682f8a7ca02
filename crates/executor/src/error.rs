use runtime::RuntimeError;
use thiserror::Error;

/// Error returned by a step implementation.
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("`{command}` exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i64,
        stderr: String,
    },

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("{0}")]
    Message(String),
}

impl StepError {
    pub fn msg(message: impl Into<String>) -> Self {
        StepError::Message(message.into())
    }
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Job '{job}' could not provision its environment: {source}")]
    Environment {
        job: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Job '{job}' failed at step '{step}': {source}")]
    StepFailed {
        job: String,
        step: String,
        #[source]
        source: StepError,
    },

    #[error("Invalid pipeline definition: {0}")]
    Definition(String),

    #[error("Pipeline interrupted")]
    Interrupted,
}

impl ExecutionError {
    /// Name of the failing job, if the error came from one.
    pub fn job(&self) -> Option<&str> {
        match self {
            ExecutionError::Environment { job, .. } | ExecutionError::StepFailed { job, .. } => {
                Some(job)
            }
            _ => None,
        }
    }
}
