use crate::error::StepError;
use futures::future::BoxFuture;
use models::{Container, DataContext};
use runtime::{ExecOutput, RuntimeClient};
use std::fmt;
use std::path::Path;

/// What a step implementation gets to work with: the runtime client, the job's environment
/// and the context produced by the previous step.
pub struct StepContext<'a> {
    pub client: &'a RuntimeClient,
    pub container: &'a mut Container,
    pub inputs: &'a DataContext,
}

impl<'a> StepContext<'a> {
    /// Runs `command` and returns its output whatever the exit code.
    pub async fn exec(&self, command: &str) -> Result<ExecOutput, StepError> {
        Ok(self.client.exec(&*self.container, command).await?)
    }

    /// Runs `command`, treating a non-zero exit code as a step failure.
    pub async fn run(&self, command: &str) -> Result<ExecOutput, StepError> {
        check_exit(command, self.exec(command).await?)
    }

    pub async fn copy_to(&self, src: &Path, dst: &str) -> Result<(), StepError> {
        Ok(self.client.copy_to(&*self.container, src, dst).await?)
    }

    pub async fn copy_from(&self, src: &str, dst: &Path) -> Result<(), StepError> {
        Ok(self.client.copy_from(&*self.container, src, dst).await?)
    }

    /// String value of an input, or [`StepError::MissingInput`].
    pub fn input(&self, key: &str) -> Result<String, StepError> {
        self.inputs
            .get_str(key)
            .ok_or_else(|| StepError::MissingInput(key.to_string()))
    }

    /// A copy of the inputs to build this step's output from.
    pub fn outputs(&self) -> DataContext {
        self.inputs.clone()
    }
}

/// Converts a non-zero exit code into [`StepError::CommandFailed`].
pub fn check_exit(command: &str, output: ExecOutput) -> Result<ExecOutput, StepError> {
    if output.success() {
        Ok(output)
    } else {
        Err(StepError::CommandFailed {
            command: command.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr_str().trim().to_string(),
        })
    }
}

type StepAction = Box<
    dyn for<'a> Fn(StepContext<'a>) -> BoxFuture<'a, Result<DataContext, StepError>> + Send + Sync,
>;

/// A named unit of work run against a job's environment.
pub struct Step {
    name: String,
    action: StepAction,
}

impl Step {
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: for<'a> Fn(StepContext<'a>) -> BoxFuture<'a, Result<DataContext, StepError>>
            + Send
            + Sync
            + 'static,
    {
        Step {
            name: name.into(),
            action: Box::new(action),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the implementation and returns its result untouched.
    pub async fn run(
        &self,
        client: &RuntimeClient,
        container: &mut Container,
        inputs: &DataContext,
    ) -> Result<DataContext, StepError> {
        client.reporter().info(&format!("Running step: {}", self.name));
        (self.action)(StepContext {
            client,
            container,
            inputs,
        })
        .await
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use logging::MemoryReporter;
    use runtime::MemorySubstrate;
    use std::sync::Arc;

    fn client() -> RuntimeClient {
        RuntimeClient::new(
            Arc::new(MemorySubstrate::new()),
            Arc::new(MemoryReporter::new()),
        )
    }

    #[tokio::test]
    async fn test_step_returns_implementation_output() {
        let client = client();
        let mut container = client.create_environment("alpine").await.unwrap();
        let step = Step::new("set", |ctx| {
            async move { Ok(ctx.outputs().with("out", "X")) }.boxed()
        });

        let inputs = DataContext::new().with("in", 1);
        let output = step.run(&client, &mut container, &inputs).await.unwrap();

        assert_eq!(output.get_str("out").as_deref(), Some("X"));
        assert_eq!(output.get("in"), Some(&serde_json::json!(1)));
        assert!(inputs.get("out").is_none());
    }

    #[tokio::test]
    async fn test_step_error_passes_through() {
        let client = client();
        let mut container = client.create_environment("alpine").await.unwrap();
        let step = Step::new("boom", |_ctx| {
            async move { Err(StepError::msg("boom")) }.boxed()
        });

        let result = step.run(&client, &mut container, &DataContext::new()).await;
        assert!(matches!(result, Err(StepError::Message(m)) if m == "boom"));
    }

    #[tokio::test]
    async fn test_step_can_mutate_environment_variables() {
        let client = client();
        let mut container = client.create_environment("alpine").await.unwrap();
        let step = Step::new("export", |ctx| {
            async move {
                ctx.container.add_variable("MODE", "release");
                Ok(ctx.outputs())
            }
            .boxed()
        });

        step.run(&client, &mut container, &DataContext::new())
            .await
            .unwrap();
        assert_eq!(container.variable("MODE"), Some("release"));
    }

    #[test]
    fn test_check_exit() {
        assert!(check_exit("true", ExecOutput::new("", "", 0)).is_ok());

        match check_exit("false", ExecOutput::new("", "bad thing\n", 3)) {
            Err(StepError::CommandFailed {
                command,
                exit_code,
                stderr,
            }) => {
                assert_eq!(command, "false");
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "bad thing");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_input() {
        let client = client();
        let mut container = client.create_environment("alpine").await.unwrap();
        let step = Step::new("read", |ctx| {
            async move {
                let value = ctx.input("absent")?;
                Ok(ctx.outputs().with("copy", value))
            }
            .boxed()
        });

        let result = step.run(&client, &mut container, &DataContext::new()).await;
        assert!(matches!(result, Err(StepError::MissingInput(key)) if key == "absent"));
    }
}
