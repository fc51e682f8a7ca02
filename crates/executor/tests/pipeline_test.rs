use std::sync::Arc;

use executor::{Job, Pipeline, StepError};
use futures::FutureExt;
use logging::MemoryReporter;
use models::{DataContext, StepStatus};
use runtime::{EmulationSubstrate, MemorySubstrate, Substrate};

fn set_then_check_job() -> Job {
    Job::new("handoff", "alpine:latest")
        .with_step("set", |ctx| {
            async move {
                let output = ctx.run("printf X").await?;
                Ok(ctx.outputs().with("out", output.stdout_str()))
            }
            .boxed()
        })
        .with_step("check", |ctx| {
            async move {
                let out = ctx.input("out")?;
                if out != "X" {
                    return Err(StepError::msg(format!("expected X, got {:?}", out)));
                }
                Ok(ctx.outputs())
            }
            .boxed()
        })
}

async fn run_handoff(substrate: Arc<dyn Substrate>) {
    let reporter = Arc::new(MemoryReporter::new());
    let mut pipeline = Pipeline::new("e2e", reporter.clone())
        .with_substrate(substrate)
        .with_job(set_then_check_job());

    let output = pipeline.run(DataContext::new()).await.unwrap();

    assert_eq!(output.get_str("out").as_deref(), Some("X"));
    let metrics = pipeline.jobs()[0].metrics();
    assert_eq!(metrics.len(), 2);
    assert!(metrics.iter().all(|m| m.status == StepStatus::Passed));
    assert_eq!(reporter.summaries().len(), 1);
}

#[tokio::test]
async fn test_end_to_end_with_emulation() {
    run_handoff(Arc::new(EmulationSubstrate::new())).await;
}

#[tokio::test]
async fn test_end_to_end_with_memory_substrate() {
    let substrate = MemorySubstrate::new()
        .with_exec_handler(|_| runtime::ExecOutput::new("X", "", 0));
    let substrate = Arc::new(substrate);

    run_handoff(substrate.clone()).await;

    assert!(substrate.live_environments().is_empty());
}
