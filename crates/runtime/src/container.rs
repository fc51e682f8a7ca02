use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use utils::ArchiveError;

/// Capabilities the runtime client needs from a container engine.
///
/// Environments are addressed by the id the substrate hands out from [`Substrate::create`].
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Makes the image available locally, pulling it when missing.
    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Creates an environment that keeps running until removed. Returns its id.
    async fn create(&self, image: &str) -> Result<String, RuntimeError>;

    async fn start(&self, id: &str) -> Result<(), RuntimeError>;

    /// Forced removal.
    async fn remove(&self, id: &str) -> Result<(), RuntimeError>;

    /// Runs a process inside the environment and waits for it to exit. A non-zero exit code
    /// is reported through [`ExecOutput::exit_code`], not as an error.
    async fn exec(&self, id: &str, request: &ExecRequest) -> Result<ExecOutput, RuntimeError>;

    /// Extracts a tar archive into `dst` inside the environment.
    async fn upload(&self, id: &str, dst: &str, archive: Vec<u8>) -> Result<(), RuntimeError>;

    /// Exports `src` from the environment as a tar archive.
    async fn download(&self, id: &str, src: &str) -> Result<Vec<u8>, RuntimeError>;

    /// Releases the engine connection.
    async fn close(&self) -> Result<(), RuntimeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub command: Vec<String>,
    pub env: Vec<String>,
    pub working_dir: String,
}

impl ExecRequest {
    /// `sh -c <script>`
    pub fn shell(script: &str, env: Vec<String>, working_dir: &str) -> Self {
        ExecRequest {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            env,
            working_dir: working_dir.to_string(),
        }
    }

    /// The script passed to `sh -c`, or the joined argv for other commands.
    pub fn script(&self) -> String {
        match self.command.as_slice() {
            [shell, flag, script] if shell == "sh" && flag == "-c" => script.clone(),
            other => other.join(" "),
        }
    }
}

/// Captured output of an exec. Standard output and standard error are kept apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i64,
}

impl ExecOutput {
    pub fn new(stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>, exit_code: i64) -> Self {
        ExecOutput {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to connect to container engine: {0}")]
    Connection(String),

    #[error("Failed to pull image {image}: {message}")]
    ImagePull { image: String, message: String },

    #[error("Failed to create environment from {image}: {message}")]
    Create { image: String, message: String },

    #[error("Failed to start environment {id}: {message}")]
    Start { id: String, message: String },

    #[error("Exec failed on environment {id}: {message}")]
    Exec { id: String, message: String },

    #[error("Exec on environment {id} timed out after {timeout:?}")]
    ExecTimeout { id: String, timeout: Duration },

    #[error("Failed to inspect exec on environment {id}: {message}")]
    Inspect { id: String, message: String },

    #[error("Failed to copy {path} for environment {id}: {message}")]
    Copy {
        id: String,
        path: String,
        message: String,
    },

    #[error("Failed to remove environment {id}: {message}")]
    Remove { id: String, message: String },

    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("Failed to close engine connection: {0}")]
    Close(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_request() {
        let request = ExecRequest::shell("echo hi", vec!["A=1".to_string()], "/home");
        assert_eq!(request.command, vec!["sh", "-c", "echo hi"]);
        assert_eq!(request.script(), "echo hi");
        assert_eq!(request.working_dir, "/home");
    }

    #[test]
    fn test_output_accessors() {
        let output = ExecOutput::new("OUT", "ERR", 7);
        assert_eq!(output.stdout_str(), "OUT");
        assert_eq!(output.stderr_str(), "ERR");
        assert!(!output.success());
    }
}
