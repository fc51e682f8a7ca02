use crate::container::{ExecOutput, ExecRequest, RuntimeError, Substrate};
use logging::Reporter;
use models::Container;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const DEFAULT_WORKING_DIR: &str = "/home";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Working directory of every exec.
    pub working_dir: String,
    /// Upper bound on a single exec. `None` waits for the command to exit.
    pub exec_timeout: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            working_dir: DEFAULT_WORKING_DIR.to_string(),
            exec_timeout: None,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `ANYPIPE_WORKDIR` and `ANYPIPE_EXEC_TIMEOUT` (seconds).
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("ANYPIPE_WORKDIR").ok(),
            std::env::var("ANYPIPE_EXEC_TIMEOUT").ok(),
        )
    }

    pub fn from_vars(working_dir: Option<String>, exec_timeout: Option<String>) -> Self {
        let mut config = RuntimeConfig::default();
        if let Some(dir) = working_dir.filter(|d| !d.trim().is_empty()) {
            config.working_dir = dir;
        }
        config.exec_timeout = exec_timeout
            .and_then(|secs| secs.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        config
    }
}

/// Ledger entry for an environment created through the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnedEnvironment {
    pub id: String,
    pub image: String,
    pub started: bool,
}

/// Result of provisioning an environment.
#[derive(Debug)]
pub enum Provisioned {
    Ready(Container),
    /// The environment exists (and will be removed on close) but did not start.
    NotStarted {
        container: Container,
        error: RuntimeError,
    },
}

/// Sole gateway to the substrate. Tracks every environment it creates and removes all of
/// them on [`RuntimeClient::close`].
///
/// A client dropped before `close` finished (a cancelled run, for instance) hands the
/// environments still in its ledger to a cleanup task on the current tokio runtime.
pub struct RuntimeClient {
    substrate: Arc<dyn Substrate>,
    reporter: Arc<dyn Reporter>,
    config: RuntimeConfig,
    spawned: Mutex<Vec<SpawnedEnvironment>>,
    released: bool,
}

impl RuntimeClient {
    pub fn new(substrate: Arc<dyn Substrate>, reporter: Arc<dyn Reporter>) -> Self {
        Self::with_config(substrate, reporter, RuntimeConfig::default())
    }

    pub fn with_config(
        substrate: Arc<dyn Substrate>,
        reporter: Arc<dyn Reporter>,
        config: RuntimeConfig,
    ) -> Self {
        RuntimeClient {
            substrate,
            reporter,
            config,
            spawned: Mutex::new(Vec::new()),
            released: false,
        }
    }

    pub fn reporter(&self) -> &dyn Reporter {
        self.reporter.as_ref()
    }

    /// Snapshot of the spawn ledger, in spawn order.
    pub fn spawned(&self) -> Vec<SpawnedEnvironment> {
        self.ledger().clone()
    }

    /// Pulls the image if needed, creates an environment from it and starts it.
    ///
    /// The environment is recorded in the ledger before it is started, so a start failure
    /// still leaves it scheduled for removal.
    pub async fn provision(&self, image: &str) -> Result<Provisioned, RuntimeError> {
        self.reporter
            .debug(&format!("Ensuring image {} is available", image));
        self.substrate.ensure_image(image).await.map_err(|e| {
            self.reporter.error(&e.to_string());
            e
        })?;

        let id = self.substrate.create(image).await.map_err(|e| {
            self.reporter.error(&e.to_string());
            e
        })?;
        self.track(&id, image);

        self.reporter.debug(&format!(
            "Starting environment {} created from image {}",
            id, image
        ));
        let container = Container::new(id.clone());
        match self.substrate.start(&id).await {
            Ok(()) => {
                self.mark_started(&id);
                self.reporter.debug(&format!("Started environment {}", id));
                Ok(Provisioned::Ready(container))
            }
            Err(error) => {
                self.reporter.error(&error.to_string());
                Ok(Provisioned::NotStarted { container, error })
            }
        }
    }

    /// Like [`RuntimeClient::provision`], but a start failure is an error.
    pub async fn create_environment(&self, image: &str) -> Result<Container, RuntimeError> {
        match self.provision(image).await? {
            Provisioned::Ready(container) => Ok(container),
            Provisioned::NotStarted { error, .. } => Err(error),
        }
    }

    /// Runs `command` with `sh -c` inside the environment, using its variables as the process
    /// environment. Inspect [`ExecOutput::exit_code`] for the command's own outcome.
    pub async fn exec(
        &self,
        container: &Container,
        command: &str,
    ) -> Result<ExecOutput, RuntimeError> {
        self.reporter.debug(&format!(
            "Executing `{}` on environment {}",
            command,
            container.id()
        ));
        let exported = container.exported_variables();
        if !exported.is_empty() {
            self.reporter
                .debug(&format!("Environment variables: {}", exported.join(" ")));
        }

        let request =
            ExecRequest::shell(command, container.env_bindings(), &self.config.working_dir);
        let exec = self.substrate.exec(container.id(), &request);

        let result = match self.config.exec_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, exec).await {
                Ok(result) => result,
                Err(_) => Err(RuntimeError::ExecTimeout {
                    id: container.id().to_string(),
                    timeout,
                }),
            },
            None => exec.await,
        };

        result.map_err(|e| {
            self.reporter.error(&e.to_string());
            e
        })
    }

    /// Copies a host file or directory tree into the environment at `dst`.
    pub async fn copy_to(
        &self,
        container: &Container,
        src: &Path,
        dst: &str,
    ) -> Result<(), RuntimeError> {
        let archive = utils::pack(src).map_err(|e| {
            self.reporter
                .error(&format!("Failed to pack {}: {}", src.display(), e));
            e
        })?;

        self.substrate
            .upload(container.id(), dst, archive)
            .await
            .map_err(|e| {
                self.reporter.error(&e.to_string());
                e
            })
    }

    /// Copies `src` out of the environment into the host directory `dst`, creating it when
    /// missing and overwriting files already there.
    pub async fn copy_from(
        &self,
        container: &Container,
        src: &str,
        dst: &Path,
    ) -> Result<(), RuntimeError> {
        let archive = self
            .substrate
            .download(container.id(), src)
            .await
            .map_err(|e| {
                self.reporter.error(&e.to_string());
                e
            })?;

        utils::unpack(&archive, dst).map_err(|e| {
            self.reporter.error(&format!(
                "Failed to unpack {} into {}: {}",
                src,
                dst.display(),
                e
            ));
            RuntimeError::from(e)
        })
    }

    /// Streams `src_path` out of one environment straight into another.
    pub async fn copy_between(
        &self,
        source: &Container,
        destination: &Container,
        src_path: &str,
        dst_path: &str,
    ) -> Result<(), RuntimeError> {
        let archive = self
            .substrate
            .download(source.id(), src_path)
            .await
            .map_err(|e| {
                self.reporter.error(&e.to_string());
                e
            })?;

        self.substrate
            .upload(destination.id(), dst_path, archive)
            .await
            .map_err(|e| {
                self.reporter.error(&e.to_string());
                e
            })
    }

    /// Removes every spawned environment in spawn order, then releases the substrate.
    ///
    /// Removal failures are logged and do not stop the loop; only the final connection
    /// teardown can fail this call.
    pub async fn close(mut self) -> Result<(), RuntimeError> {
        self.reporter.debug("Cleaning up spawned environments");

        for environment in self.spawned() {
            remove_environment(self.substrate.as_ref(), self.reporter.as_ref(), &environment.id)
                .await;
            // Whatever is left in the ledger is removed on drop if this future is cancelled.
            self.ledger().retain(|e| e.id != environment.id);
        }

        self.released = true;
        self.substrate.close().await
    }

    fn ledger(&self) -> MutexGuard<'_, Vec<SpawnedEnvironment>> {
        self.spawned.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, id: &str, image: &str) {
        self.ledger().push(SpawnedEnvironment {
            id: id.to_string(),
            image: image.to_string(),
            started: false,
        });
    }

    fn mark_started(&self, id: &str) {
        if let Some(environment) = self.ledger().iter_mut().find(|e| e.id == id) {
            environment.started = true;
        }
    }
}

impl Drop for RuntimeClient {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let spawned = self.spawned.get_mut().unwrap_or_else(PoisonError::into_inner);
        let pending = std::mem::take(spawned);
        if pending.is_empty() {
            return;
        }

        let substrate = self.substrate.clone();
        let reporter = self.reporter.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                reporter.warning(&format!(
                    "Runtime client dropped before close, removing {} environment(s)",
                    pending.len()
                ));
                handle.spawn(async move {
                    for environment in &pending {
                        remove_environment(substrate.as_ref(), reporter.as_ref(), &environment.id)
                            .await;
                    }
                    if let Err(e) = substrate.close().await {
                        reporter.error(&format!("Failed to close runtime client: {}", e));
                    }
                });
            }
            Err(_) => {
                let ids: Vec<&str> = pending.iter().map(|e| e.id.as_str()).collect();
                reporter.error(&format!(
                    "Runtime client dropped outside a tokio runtime, environments left behind: {}",
                    ids.join(", ")
                ));
            }
        }
    }
}

async fn remove_environment(substrate: &dyn Substrate, reporter: &dyn Reporter, id: &str) {
    reporter.debug(&format!("Removing environment {}", id));
    if let Err(e) = substrate.remove(id).await {
        reporter.error(&format!("Failed to clean up environment {}: {}", id, e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_vars() {
        let config = RuntimeConfig::from_vars(None, None);
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.working_dir, "/home");

        let config = RuntimeConfig::from_vars(Some("/work".into()), Some("30".into()));
        assert_eq!(config.working_dir, "/work");
        assert_eq!(config.exec_timeout, Some(Duration::from_secs(30)));

        let config = RuntimeConfig::from_vars(Some("  ".into()), Some("soon".into()));
        assert_eq!(config.working_dir, "/home");
        assert_eq!(config.exec_timeout, None);
    }
}
