use models::StepMetric;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tabled::{settings::style::Style, Table, Tabled};

#[derive(Debug, Tabled)]
struct SummaryRow {
    #[tabled(rename = "Result")]
    result: &'static str,
    #[tabled(rename = "Step")]
    step: String,
    #[tabled(rename = "Duration")]
    duration: String,
}

fn rows(metrics: &[StepMetric]) -> Vec<SummaryRow> {
    metrics
        .iter()
        .map(|metric| SummaryRow {
            result: metric.status.label(),
            step: metric.step_name.clone(),
            duration: format!("{:.2?}", metric.duration),
        })
        .collect()
}

/// Console table, one row per step in execution order.
pub fn render_table(title: &str, metrics: &[StepMetric]) -> String {
    let mut table = Table::new(rows(metrics));
    table.with(Style::rounded());
    format!("{}\n{}", title, table)
}

/// Same rows as [`render_table`], as a markdown table for CI summaries.
pub fn render_markdown(title: &str, metrics: &[StepMetric]) -> String {
    let mut table = Table::new(rows(metrics));
    table.with(Style::markdown());
    format!("### {}\n\n{}\n\n", title, table)
}

/// Step summary file exposed by a CI environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiSummary {
    path: PathBuf,
}

impl CiSummary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CiSummary { path: path.into() }
    }

    /// Picks up the GitHub Actions step summary file from the process environment.
    pub fn detect() -> Option<Self> {
        Self::from_vars(
            std::env::var("GITHUB_ACTIONS").ok(),
            std::env::var("GITHUB_STEP_SUMMARY").ok(),
        )
    }

    pub fn from_vars(actions: Option<String>, summary_path: Option<String>) -> Option<Self> {
        match (actions, summary_path) {
            (Some(actions), Some(path)) if !actions.is_empty() && !path.is_empty() => {
                Some(CiSummary::new(path))
            }
            _ => None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends to the summary file, creating it if needed. Existing content is kept.
    pub fn append(&self, content: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        file.write_all(content.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample() -> Vec<StepMetric> {
        vec![
            StepMetric::passed("checkout", Duration::from_millis(12)),
            StepMetric::failed("test", Duration::from_millis(40), "exit code 1"),
            StepMetric::skipped("publish"),
        ]
    }

    #[test]
    fn test_table_rows_follow_execution_order() {
        let table = render_table("build", &sample());

        assert!(table.starts_with("build\n"));
        let checkout = table.find("checkout").unwrap();
        let test = table.find("test").unwrap();
        let publish = table.find("publish").unwrap();
        assert!(checkout < test && test < publish);
        assert!(table.contains("PASS"));
        assert!(table.contains("FAIL"));
        assert!(table.contains("SKIP"));
    }

    #[test]
    fn test_markdown_has_header_row() {
        let markdown = render_markdown("build", &sample());
        assert!(markdown.starts_with("### build"));
        assert!(markdown.contains("| Result"));
    }

    #[test]
    fn test_detect_requires_both_vars() {
        assert_eq!(CiSummary::from_vars(None, Some("/tmp/x".into())), None);
        assert_eq!(CiSummary::from_vars(Some("".into()), Some("/tmp/x".into())), None);
        assert_eq!(CiSummary::from_vars(Some("true".into()), None), None);
        assert_eq!(
            CiSummary::from_vars(Some("true".into()), Some("/tmp/x".into())),
            Some(CiSummary::new("/tmp/x"))
        );
    }

    #[test]
    fn test_append_keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.md");
        std::fs::write(&path, "previous\n").unwrap();

        let ci = CiSummary::new(&path);
        ci.append("first\n").unwrap();
        ci.append("second\n").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "previous\nfirst\nsecond\n"
        );
    }
}
