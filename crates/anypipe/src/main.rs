use clap::{Parser, Subcommand};
use colored::*;
use executor::RuntimeType;
use logging::{ConsoleReporter, LogLevel, Reporter};
use models::DataContext;
use runtime::RuntimeConfig;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

// Cleanup after Ctrl+C gets this long before the process is forced to exit
const HARD_EXIT_AFTER: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(
    name = "anypipe",
    about = "Container pipeline runner",
    version,
    long_about = "Runs pipelines of jobs and steps inside disposable containers.\n\nExamples:\n  anypipe validate pipeline.yml                 # Check a pipeline definition\n  anypipe run pipeline.yml                      # Run it against the local Docker daemon\n  anypipe run --emulate pipeline.yml            # Run it in host directories instead of containers\n  anypipe run pipeline.yml --var version=1.2.0  # Seed the data context\n  anypipe --debug run pipeline.yml              # Run with detailed debug information"
)]
struct Anypipe {
    #[command(subcommand)]
    command: Commands,

    /// Run in verbose mode with detailed output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Run in debug mode with extensive execution details
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate a pipeline definition
    Validate {
        /// Path to the pipeline file
        path: PathBuf,
    },

    /// Execute a pipeline
    Run {
        /// Path to the pipeline file
        path: PathBuf,

        /// Use emulation mode instead of Docker
        #[arg(short, long)]
        emulate: bool,

        /// Initial data context entries in format key=value
        #[arg(long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,

        /// Do not render per-job summary tables
        #[arg(long)]
        no_summary: bool,
    },
}

// Parser function for key-value pairs
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{}`", s))?;

    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn validate(path: &Path) {
    match parser::parse_pipeline(path) {
        Ok(pipeline) => println!(
            "{} {} is valid ({} job(s))",
            "✓".green(),
            path.display(),
            pipeline.jobs.len()
        ),
        Err(e) => {
            eprintln!("{} {}: {}", "✗".red(), path.display(), e);
            process::exit(1);
        }
    }
}

/// Resolves on Ctrl+C. A watchdog thread forces the exit if cleanup afterwards hangs.
async fn interrupted(reporter: Arc<ConsoleReporter>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        reporter.warning(&format!("Failed to listen for Ctrl+C: {}", e));
        std::future::pending::<()>().await;
    }

    println!("Received Ctrl+C, shutting down and cleaning up...");
    std::thread::spawn(|| {
        std::thread::sleep(HARD_EXIT_AFTER);
        eprintln!(
            "Cleanup taking too long (over {} seconds), forcing exit...",
            HARD_EXIT_AFTER.as_secs()
        );
        process::exit(1);
    });
}

async fn run(
    path: &Path,
    runtime_type: RuntimeType,
    vars: &[(String, String)],
    summaries: bool,
    reporter: Arc<ConsoleReporter>,
) -> bool {
    let definition = match parser::parse_pipeline(path) {
        Ok(definition) => definition,
        Err(e) => {
            reporter.error(&format!("Pipeline validation failed: {}", e));
            return false;
        }
    };

    if runtime_type == RuntimeType::Docker && !executor::docker::is_available().await {
        reporter.error("Docker is not available. Start the daemon or rerun with --emulate.");
        return false;
    }

    let base_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut pipeline = match executor::build_pipeline(&definition, base_dir, reporter.clone()) {
        Ok(pipeline) => pipeline
            .with_runtime(runtime_type)
            .with_config(RuntimeConfig::from_env())
            .with_summaries(summaries),
        Err(e) => {
            reporter.error(&e.to_string());
            return false;
        }
    };

    let inputs: DataContext = vars
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    match pipeline.run_until(inputs, interrupted(reporter.clone())).await {
        Ok(_) => {
            println!("\n{} Pipeline {} completed successfully!", "✅".green(), definition.name);
            true
        }
        Err(e) => {
            println!("\n{} Pipeline {} failed: {}", "❌".red(), definition.name, e);
            false
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Anypipe::parse();

    // Set log level based on command line flags
    let level = if cli.debug {
        LogLevel::Debug
    } else if cli.verbose {
        LogLevel::Info
    } else {
        LogLevel::Warning
    };
    let reporter = Arc::new(ConsoleReporter::new(level));
    reporter.debug("Debug mode enabled - showing detailed logs");

    match &cli.command {
        Commands::Validate { path } => validate(path),

        Commands::Run {
            path,
            emulate,
            vars,
            no_summary,
        } => {
            let runtime_type = if *emulate {
                RuntimeType::Emulation
            } else {
                RuntimeType::Docker
            };

            if !run(path, runtime_type, vars, !no_summary, reporter).await {
                process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("version=1.2=3").unwrap(),
            ("version".to_string(), "1.2=3".to_string())
        );
        assert_eq!(
            parse_key_val("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
        assert!(parse_key_val("novalue").is_err());
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Anypipe::parse_from([
            "anypipe", "--debug", "run", "p.yml", "--emulate", "--var", "a=1", "--var", "b=2",
            "--no-summary",
        ]);
        assert!(cli.debug);
        match cli.command {
            Commands::Run {
                path,
                emulate,
                vars,
                no_summary,
            } => {
                assert_eq!(path, PathBuf::from("p.yml"));
                assert!(emulate);
                assert!(no_summary);
                assert_eq!(vars.len(), 2);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
