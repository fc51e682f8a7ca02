use indexmap::IndexMap;
use models::ValidationResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid pipeline structure:\n{}", .0.join("\n"))]
    InvalidStructure(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobDefinition {
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub env: IndexMap<String, String>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepDefinition {
    pub name: String,
    #[serde(default)]
    pub run: Option<String>,
    /// Context key that receives the trimmed stdout of `run`.
    #[serde(default)]
    pub capture: Option<String>,
    /// A non-zero exit code of `run` does not fail the step.
    #[serde(default)]
    pub allow_failure: bool,
    #[serde(default)]
    pub copy_to: Option<CopySpec>,
    #[serde(default)]
    pub copy_from: Option<CopySpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CopySpec {
    pub from: String,
    pub to: String,
}

/// The single action a step definition declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction<'a> {
    Run {
        command: &'a str,
        capture: Option<&'a str>,
        allow_failure: bool,
    },
    CopyTo(&'a CopySpec),
    CopyFrom(&'a CopySpec),
}

impl StepDefinition {
    /// `None` unless exactly one of `run`, `copy-to` and `copy-from` is set.
    pub fn action(&self) -> Option<StepAction<'_>> {
        match (&self.run, &self.copy_to, &self.copy_from) {
            (Some(command), None, None) => Some(StepAction::Run {
                command,
                capture: self.capture.as_deref(),
                allow_failure: self.allow_failure,
            }),
            (None, Some(copy), None) => Some(StepAction::CopyTo(copy)),
            (None, None, Some(copy)) => Some(StepAction::CopyFrom(copy)),
            _ => None,
        }
    }
}

/// Parse and validate a pipeline definition file
pub fn parse_pipeline(path: &Path) -> Result<PipelineDefinition, ParseError> {
    let content = fs::read_to_string(path)?;
    parse_pipeline_str(&content)
}

pub fn parse_pipeline_str(content: &str) -> Result<PipelineDefinition, ParseError> {
    let pipeline: PipelineDefinition = serde_yaml::from_str(content)?;

    let validation = validate_pipeline(&pipeline);
    if !validation.is_valid {
        return Err(ParseError::InvalidStructure(validation.issues));
    }

    Ok(pipeline)
}

/// Checks the structure serde cannot express.
pub fn validate_pipeline(pipeline: &PipelineDefinition) -> ValidationResult {
    let mut result = ValidationResult::new();

    if pipeline.name.trim().is_empty() {
        result.add_issue("Pipeline name must not be empty".to_string());
    }

    if pipeline.jobs.is_empty() {
        result.add_issue("Pipeline must contain at least one job".to_string());
    }

    let mut job_names = HashSet::new();
    for job in &pipeline.jobs {
        if !job_names.insert(job.name.as_str()) {
            result.add_issue(format!("Duplicate job name '{}'", job.name));
        }

        if job.image.trim().is_empty() {
            result.add_issue(format!("Job '{}' must specify an image", job.name));
        }

        let mut step_names = HashSet::new();
        for step in &job.steps {
            if !step_names.insert(step.name.as_str()) {
                result.add_issue(format!(
                    "Duplicate step name '{}' in job '{}'",
                    step.name, job.name
                ));
            }

            if step.action().is_none() {
                result.add_issue(format!(
                    "Step '{}' in job '{}' must have exactly one of 'run', 'copy-to' or 'copy-from'",
                    step.name, job.name
                ));
            }

            if step.run.is_none() && (step.capture.is_some() || step.allow_failure) {
                result.add_issue(format!(
                    "Step '{}' in job '{}' uses 'capture' or 'allow-failure' without 'run'",
                    step.name, job.name
                ));
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const DEMO: &str = r#"
name: demo
jobs:
  - name: build
    image: alpine:latest
    env:
      GREETING: hello
      TARGET: release
    steps:
      - name: write
        run: echo "${{ vars.greeting }}" > out.txt
        capture: written
      - name: check
        run: cat out.txt
        allow-failure: true
      - name: upload
        copy-to: { from: ./src, to: /home/src }
      - name: download
        copy-from:
          from: /home/out.txt
          to: ./artifacts
"#;

    #[test]
    fn test_parse_pipeline_file() {
        let file = NamedTempFile::new().unwrap();
        fs::write(&file, DEMO).unwrap();

        let pipeline = parse_pipeline(file.path()).unwrap();
        assert_eq!(pipeline.name, "demo");
        assert_eq!(pipeline.jobs.len(), 1);

        let job = &pipeline.jobs[0];
        assert_eq!(job.image, "alpine:latest");
        let env: Vec<&str> = job.env.keys().map(String::as_str).collect();
        assert_eq!(env, vec!["GREETING", "TARGET"]);

        let actions: Vec<StepAction> = job.steps.iter().filter_map(|s| s.action()).collect();
        assert_eq!(
            actions[0],
            StepAction::Run {
                command: "echo \"${{ vars.greeting }}\" > out.txt",
                capture: Some("written"),
                allow_failure: false,
            }
        );
        assert!(matches!(
            actions[1],
            StepAction::Run {
                allow_failure: true,
                ..
            }
        ));
        assert!(matches!(actions[2], StepAction::CopyTo(copy) if copy.to == "/home/src"));
        assert!(matches!(actions[3], StepAction::CopyFrom(copy) if copy.from == "/home/out.txt"));
    }

    #[test]
    fn test_missing_file() {
        let result = parse_pipeline(Path::new("/definitely/not/here.yml"));
        assert!(matches!(result, Err(ParseError::IoError(_))));
    }

    #[test]
    fn test_malformed_yaml() {
        let result = parse_pipeline_str("name: [unclosed");
        assert!(matches!(result, Err(ParseError::YamlError(_))));
    }

    #[test]
    fn test_structure_issues_are_collected() {
        let content = r#"
name: ""
jobs:
  - name: a
    image: ""
    steps:
      - name: both
        run: "true"
        copy-to: { from: x, to: y }
      - name: both
        capture: out
        copy-from: { from: x, to: y }
  - name: a
    image: alpine
"#;
        let pipeline: PipelineDefinition = serde_yaml::from_str(content).unwrap();
        let result = validate_pipeline(&pipeline);

        assert!(!result.is_valid);
        let issues = result.issues.join("\n");
        assert!(issues.contains("Pipeline name must not be empty"));
        assert!(issues.contains("Duplicate job name 'a'"));
        assert!(issues.contains("Job 'a' must specify an image"));
        assert!(issues.contains("Duplicate step name 'both'"));
        assert!(issues.contains("exactly one of"));
        assert!(issues.contains("without 'run'"));

        assert!(matches!(
            parse_pipeline_str(content),
            Err(ParseError::InvalidStructure(issues)) if issues.len() == result.issues.len()
        ));
    }

    #[test]
    fn test_empty_pipeline_is_invalid() {
        let pipeline = PipelineDefinition {
            name: "empty".to_string(),
            jobs: Vec::new(),
        };
        let result = validate_pipeline(&pipeline);
        assert_eq!(result.issues, vec!["Pipeline must contain at least one job"]);
    }
}
