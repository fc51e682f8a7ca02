// parser crate

pub mod pipeline;

pub use pipeline::{
    parse_pipeline, parse_pipeline_str, validate_pipeline, CopySpec, JobDefinition, ParseError,
    PipelineDefinition, StepAction, StepDefinition,
};
