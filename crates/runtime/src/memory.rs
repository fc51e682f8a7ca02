use crate::container::{ExecOutput, ExecRequest, RuntimeError, Substrate};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

type ExecHandler = Arc<dyn Fn(&ExecRequest) -> ExecOutput + Send + Sync>;

/// Operations recorded by [`MemorySubstrate`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstrateCall {
    EnsureImage(String),
    Create(String),
    Start(String),
    Remove(String),
    Exec { id: String, command: String },
    Upload { id: String, path: String },
    Download { id: String, path: String },
    Close,
}

/// Substrate that keeps environments in memory and journals every call.
///
/// Failures can be injected per image or per environment, and exec results come from a
/// handler (exit code 0 with empty output by default).
#[derive(Default)]
pub struct MemorySubstrate {
    state: Mutex<MemoryState>,
    exec_handler: Option<ExecHandler>,
}

#[derive(Default)]
struct MemoryState {
    next_id: usize,
    environments: HashMap<String, MemoryEnvironment>,
    calls: Vec<SubstrateCall>,
    fail_pull: HashSet<String>,
    fail_create: HashSet<String>,
    fail_start: HashSet<String>,
    fail_remove: HashSet<String>,
    fail_exec: bool,
}

struct MemoryEnvironment {
    image: String,
    running: bool,
    files: HashMap<String, Vec<u8>>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_pull(self, image: &str) -> Self {
        self.configure(|state| state.fail_pull.insert(image.to_string()))
    }

    pub fn fail_create(self, image: &str) -> Self {
        self.configure(|state| state.fail_create.insert(image.to_string()))
    }

    pub fn fail_start(self, image: &str) -> Self {
        self.configure(|state| state.fail_start.insert(image.to_string()))
    }

    /// Environment ids are handed out as `env-1`, `env-2`, ...
    pub fn fail_remove(self, id: &str) -> Self {
        self.configure(|state| state.fail_remove.insert(id.to_string()))
    }

    pub fn fail_exec(self) -> Self {
        self.configure(|state| {
            state.fail_exec = true;
            true
        })
    }

    pub fn with_exec_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ExecRequest) -> ExecOutput + Send + Sync + 'static,
    {
        self.exec_handler = Some(Arc::new(handler));
        self
    }

    pub fn calls(&self) -> Vec<SubstrateCall> {
        self.state().calls.clone()
    }

    /// Ids of environments that have been created and not removed.
    pub fn live_environments(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state().environments.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn image_of(&self, id: &str) -> Option<String> {
        self.state()
            .environments
            .get(id)
            .map(|env| env.image.clone())
    }

    fn configure<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut MemoryState) -> bool,
    {
        f(&mut self.state());
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test thread is the only way to poison this lock.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl MemoryState {
    fn running(&self, id: &str) -> Result<&MemoryEnvironment, RuntimeError> {
        match self.environments.get(id) {
            Some(env) if env.running => Ok(env),
            Some(_) => Err(RuntimeError::Exec {
                id: id.to_string(),
                message: "environment is not running".to_string(),
            }),
            None => Err(RuntimeError::UnknownEnvironment(id.to_string())),
        }
    }
}

#[async_trait]
impl Substrate for MemorySubstrate {
    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError> {
        let mut state = self.state();
        state.calls.push(SubstrateCall::EnsureImage(image.to_string()));
        if state.fail_pull.contains(image) {
            return Err(RuntimeError::ImagePull {
                image: image.to_string(),
                message: "manifest unknown".to_string(),
            });
        }
        Ok(())
    }

    async fn create(&self, image: &str) -> Result<String, RuntimeError> {
        let mut state = self.state();
        state.calls.push(SubstrateCall::Create(image.to_string()));
        if state.fail_create.contains(image) {
            return Err(RuntimeError::Create {
                image: image.to_string(),
                message: "create rejected".to_string(),
            });
        }

        state.next_id += 1;
        let id = format!("env-{}", state.next_id);
        state.environments.insert(
            id.clone(),
            MemoryEnvironment {
                image: image.to_string(),
                running: false,
                files: HashMap::new(),
            },
        );
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state();
        state.calls.push(SubstrateCall::Start(id.to_string()));

        let fail = match state.environments.get(id) {
            Some(env) => state.fail_start.contains(&env.image),
            None => return Err(RuntimeError::UnknownEnvironment(id.to_string())),
        };
        if fail {
            return Err(RuntimeError::Start {
                id: id.to_string(),
                message: "start rejected".to_string(),
            });
        }

        if let Some(env) = state.environments.get_mut(id) {
            env.running = true;
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state();
        state.calls.push(SubstrateCall::Remove(id.to_string()));
        if state.fail_remove.contains(id) {
            return Err(RuntimeError::Remove {
                id: id.to_string(),
                message: "removal rejected".to_string(),
            });
        }
        state
            .environments
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::UnknownEnvironment(id.to_string()))
    }

    async fn exec(&self, id: &str, request: &ExecRequest) -> Result<ExecOutput, RuntimeError> {
        {
            let mut state = self.state();
            state.calls.push(SubstrateCall::Exec {
                id: id.to_string(),
                command: request.script(),
            });
            state.running(id)?;
            if state.fail_exec {
                return Err(RuntimeError::Exec {
                    id: id.to_string(),
                    message: "exec rejected".to_string(),
                });
            }
        }

        Ok(match &self.exec_handler {
            Some(handler) => handler(request),
            None => ExecOutput::default(),
        })
    }

    async fn upload(&self, id: &str, dst: &str, archive: Vec<u8>) -> Result<(), RuntimeError> {
        let mut state = self.state();
        state.calls.push(SubstrateCall::Upload {
            id: id.to_string(),
            path: dst.to_string(),
        });
        state.running(id)?;
        if let Some(env) = state.environments.get_mut(id) {
            env.files.insert(dst.to_string(), archive);
        }
        Ok(())
    }

    async fn download(&self, id: &str, src: &str) -> Result<Vec<u8>, RuntimeError> {
        let mut state = self.state();
        state.calls.push(SubstrateCall::Download {
            id: id.to_string(),
            path: src.to_string(),
        });
        state
            .running(id)?
            .files
            .get(src)
            .cloned()
            .ok_or_else(|| RuntimeError::Copy {
                id: id.to_string(),
                path: src.to_string(),
                message: "no such file or directory".to_string(),
            })
    }

    async fn close(&self) -> Result<(), RuntimeError> {
        self.state().calls.push(SubstrateCall::Close);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_are_sequential() {
        let substrate = MemorySubstrate::new();
        assert_eq!(substrate.create("alpine").await.unwrap(), "env-1");
        assert_eq!(substrate.create("busybox").await.unwrap(), "env-2");
        assert_eq!(substrate.image_of("env-2").as_deref(), Some("busybox"));
    }

    #[tokio::test]
    async fn test_exec_requires_running_environment() {
        let substrate = MemorySubstrate::new();
        let id = substrate.create("alpine").await.unwrap();
        let request = ExecRequest::shell("true", Vec::new(), "/home");

        assert!(substrate.exec(&id, &request).await.is_err());
        substrate.start(&id).await.unwrap();
        assert!(substrate.exec(&id, &request).await.unwrap().success());
    }

    #[tokio::test]
    async fn test_upload_then_download_returns_same_bytes() {
        let substrate = MemorySubstrate::new();
        let id = substrate.create("alpine").await.unwrap();
        substrate.start(&id).await.unwrap();

        substrate.upload(&id, "/data", vec![1, 2, 3]).await.unwrap();
        assert_eq!(substrate.download(&id, "/data").await.unwrap(), vec![1, 2, 3]);
        assert!(substrate.download(&id, "/missing").await.is_err());
    }
}
