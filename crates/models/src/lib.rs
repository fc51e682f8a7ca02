// models crate

pub mod container;
pub mod context;
pub mod metrics;

pub use container::{sanitize_variable_name, Container};
pub use context::DataContext;
pub use metrics::{StepMetric, StepStatus};

pub struct ValidationResult {
    pub is_valid: bool,
    pub issues: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        ValidationResult {
            is_valid: true,
            issues: Vec::new(),
        }
    }

    pub fn add_issue(&mut self, issue: String) {
        self.is_valid = false;
        self.issues.push(issue);
    }
}
