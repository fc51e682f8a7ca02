use crate::error::ExecutionError;
use crate::job::Job;
use crate::pipeline::Pipeline;
use crate::step::Step;
use crate::substitution::substitute_vars;
use futures::FutureExt;
use logging::Reporter;
use parser::{
    validate_pipeline, CopySpec, JobDefinition, PipelineDefinition, StepAction, StepDefinition,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Builds an executable pipeline from a parsed definition.
///
/// Relative host paths in `copy-to` / `copy-from` steps are resolved against `base_dir`,
/// normally the directory holding the definition file.
pub fn build_pipeline(
    definition: &PipelineDefinition,
    base_dir: &Path,
    reporter: Arc<dyn Reporter>,
) -> Result<Pipeline, ExecutionError> {
    let validation = validate_pipeline(definition);
    if !validation.is_valid {
        return Err(ExecutionError::Definition(validation.issues.join("; ")));
    }

    let mut pipeline = Pipeline::new(definition.name.clone(), reporter);
    for job in &definition.jobs {
        pipeline.add_job(build_job(job, base_dir)?);
    }
    Ok(pipeline)
}

pub fn build_job(definition: &JobDefinition, base_dir: &Path) -> Result<Job, ExecutionError> {
    let mut job = Job::new(definition.name.clone(), definition.image.clone());
    for (name, value) in &definition.env {
        job = job.with_env(name.clone(), value.clone());
    }
    for step in &definition.steps {
        job.add_step(build_step(step, base_dir)?);
    }
    Ok(job)
}

fn build_step(definition: &StepDefinition, base_dir: &Path) -> Result<Step, ExecutionError> {
    let action = definition.action().ok_or_else(|| {
        ExecutionError::Definition(format!(
            "step '{}' must have exactly one of 'run', 'copy-to' or 'copy-from'",
            definition.name
        ))
    })?;

    Ok(match action {
        StepAction::Run {
            command,
            capture,
            allow_failure,
        } => run_step(
            &definition.name,
            command.to_string(),
            capture.map(str::to_string),
            allow_failure,
        ),
        StepAction::CopyTo(copy) => copy_to_step(&definition.name, copy, base_dir),
        StepAction::CopyFrom(copy) => copy_from_step(&definition.name, copy, base_dir),
    })
}

fn run_step(name: &str, command: String, capture: Option<String>, allow_failure: bool) -> Step {
    Step::new(name, move |mut ctx| {
        let command = command.clone();
        let capture = capture.clone();
        async move {
            let substituted = substitute_vars(&command, ctx.inputs);
            for (name, value) in &substituted.bindings {
                ctx.container.add_variable(name, value.as_str());
            }
            let output = if allow_failure {
                ctx.exec(&substituted.script).await
            } else {
                ctx.run(&substituted.script).await
            };
            for (name, _) in &substituted.bindings {
                ctx.container.remove_variable(name);
            }
            let output = output?;

            let reporter = ctx.client.reporter();
            let stdout = output.stdout_str();
            if !stdout.trim().is_empty() {
                reporter.info(stdout.trim_end());
            }
            if !output.success() {
                reporter.warning(&format!(
                    "Command exited with code {} (allowed to fail)",
                    output.exit_code
                ));
            }

            let mut outputs = ctx.outputs();
            if let Some(key) = capture {
                outputs.insert(key, stdout.trim().to_string());
            }
            Ok(outputs)
        }
        .boxed()
    })
}

fn copy_to_step(name: &str, copy: &CopySpec, base_dir: &Path) -> Step {
    let src = host_path(base_dir, &copy.from);
    let dst = copy.to.clone();
    Step::new(name, move |ctx| {
        let src = src.clone();
        let dst = dst.clone();
        async move {
            ctx.copy_to(&src, &dst).await?;
            Ok(ctx.outputs())
        }
        .boxed()
    })
}

fn copy_from_step(name: &str, copy: &CopySpec, base_dir: &Path) -> Step {
    let src = copy.from.clone();
    let dst = host_path(base_dir, &copy.to);
    Step::new(name, move |ctx| {
        let src = src.clone();
        let dst = dst.clone();
        async move {
            ctx.copy_from(&src, &dst).await?;
            Ok(ctx.outputs())
        }
        .boxed()
    })
}

fn host_path(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
