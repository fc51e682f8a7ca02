// executor crate

pub mod definition;
pub mod docker;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod step;
pub mod substitution;


// Re-export public items
pub use definition::{build_job, build_pipeline};
pub use docker::DockerSubstrate;
pub use error::{ExecutionError, StepError};
pub use job::Job;
pub use pipeline::{Pipeline, RuntimeType};
pub use step::{check_exit, Step, StepContext};
