// logging crate

pub mod summary;

use chrono::Local;
use models::StepMetric;
use std::sync::Mutex;

pub use summary::{render_markdown, render_table, CiSummary};

// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Debug => "🔍",
            LogLevel::Info => "ℹ️",
            LogLevel::Warning => "⚠️",
            LogLevel::Error => "❌",
        }
    }
}

/// Formats a line as `[HH:MM:SS] <prefix> message`.
pub fn format_line(level: LogLevel, message: &str) -> String {
    let timestamp = Local::now().format("%H:%M:%S").to_string();
    format!("[{}] {} {}", timestamp, level.prefix(), message)
}

/// Reporting collaborator injected into the runtime client and the executors.
pub trait Reporter: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    /// Renders the per-step outcome table of a job.
    fn render_summary(&self, title: &str, metrics: &[StepMetric]);

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Prints to the console and keeps every formatted line.
pub struct ConsoleReporter {
    level: LogLevel,
    logs: Mutex<Vec<String>>,
    ci_summary: Option<CiSummary>,
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl ConsoleReporter {
    pub fn new(level: LogLevel) -> Self {
        ConsoleReporter {
            level,
            logs: Mutex::new(Vec::new()),
            ci_summary: CiSummary::detect(),
        }
    }

    /// Overrides the CI summary target picked up from the environment.
    pub fn with_ci_summary(mut self, ci_summary: Option<CiSummary>) -> Self {
        self.ci_summary = ci_summary;
        self
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    // Get all logs
    pub fn logs(&self) -> Vec<String> {
        if let Ok(logs) = self.logs.lock() {
            logs.clone()
        } else {
            vec![format_line(LogLevel::Error, "Error accessing logs")]
        }
    }
}

impl Reporter for ConsoleReporter {
    fn log(&self, level: LogLevel, message: &str) {
        let formatted = format_line(level, message);

        if let Ok(mut logs) = self.logs.lock() {
            logs.push(formatted.clone());
        }

        if level >= self.level {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", formatted),
                _ => println!("{}", formatted),
            }
        }
    }

    fn render_summary(&self, title: &str, metrics: &[StepMetric]) {
        println!("{}", render_table(title, metrics));

        if let Some(ci) = &self.ci_summary {
            if let Err(e) = ci.append(&render_markdown(title, metrics)) {
                self.warning(&format!(
                    "Failed to write CI summary to {}: {}",
                    ci.path().display(),
                    e
                ));
            }
        }
    }
}

/// Records log lines and rendered summaries without printing anything.
#[derive(Default)]
pub struct MemoryReporter {
    entries: Mutex<Vec<(LogLevel, String)>>,
    summaries: Mutex<Vec<String>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Messages logged at exactly `level`.
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message)
            .collect()
    }

    pub fn summaries(&self) -> Vec<String> {
        self.summaries
            .lock()
            .map(|summaries| summaries.clone())
            .unwrap_or_default()
    }
}

impl Reporter for MemoryReporter {
    fn log(&self, level: LogLevel, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, message.to_string()));
        }
    }

    fn render_summary(&self, title: &str, metrics: &[StepMetric]) {
        if let Ok(mut summaries) = self.summaries.lock() {
            summaries.push(render_table(title, metrics));
        }
    }
}
