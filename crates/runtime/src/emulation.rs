use crate::container::{ExecOutput, ExecRequest, RuntimeError, Substrate};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

lazy_static! {
    // An absolute path at the start of a shell word: `/name`, capturing the top-level name.
    static ref ABSOLUTE_PATH: Regex =
        Regex::new(r#"(^|[\s'"=:;&|()<>])/([A-Za-z0-9._-]+)"#).unwrap();
}

/// Runs environments as private directories on the host.
///
/// Each environment gets its own temporary root. Absolute container paths are mapped under
/// that root, both for copies and inside `sh -c` scripts: a script path is rewritten when its
/// top-level directory exists in the environment (the working directory, or anything a copy
/// created), so `/data/x` reads what a copy to `/data` wrote. Paths such as `/dev/null` or
/// `/bin/sh` are left alone. There is no process isolation and images are ignored.
#[derive(Default)]
pub struct EmulationSubstrate {
    environments: Mutex<HashMap<String, EmulatedEnvironment>>,
}

struct EmulatedEnvironment {
    root: TempDir,
    started: bool,
}

impl EmulationSubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host directory backing an environment.
    pub fn root_of(&self, id: &str) -> Option<PathBuf> {
        self.environments
            .lock()
            .ok()?
            .get(id)
            .map(|env| env.root.path().to_path_buf())
    }

    fn started_root(&self, id: &str) -> Result<PathBuf, RuntimeError> {
        let environments = self
            .environments
            .lock()
            .map_err(|_| RuntimeError::UnknownEnvironment(id.to_string()))?;
        match environments.get(id) {
            Some(env) if env.started => Ok(env.root.path().to_path_buf()),
            Some(_) => Err(RuntimeError::Exec {
                id: id.to_string(),
                message: "environment is not running".to_string(),
            }),
            None => Err(RuntimeError::UnknownEnvironment(id.to_string())),
        }
    }
}

/// Maps an absolute or relative container path under `root`, dropping `..` and `.` parts.
fn resolve(root: &Path, path: &str) -> PathBuf {
    let mut resolved = root.to_path_buf();
    for component in Path::new(path).components() {
        if let Component::Normal(part) = component {
            resolved.push(part);
        }
    }
    resolved
}

/// Rewrites absolute paths in a script whose top-level directory exists under `root`.
fn map_script(root: &Path, script: &str) -> String {
    ABSOLUTE_PATH
        .replace_all(script, |caps: &Captures| {
            let top = &caps[2];
            if top != "." && top != ".." && root.join(top).exists() {
                format!("{}{}/{}", &caps[1], root.display(), top)
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

async fn read_all<R>(reader: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

#[async_trait]
impl Substrate for EmulationSubstrate {
    async fn ensure_image(&self, _image: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn create(&self, image: &str) -> Result<String, RuntimeError> {
        let root = tempfile::Builder::new()
            .prefix("anypipe-")
            .tempdir()
            .map_err(|e| RuntimeError::Create {
                image: image.to_string(),
                message: e.to_string(),
            })?;

        let id = format!("emu-{}", uuid::Uuid::new_v4().simple());
        let mut environments = self
            .environments
            .lock()
            .map_err(|_| RuntimeError::Create {
                image: image.to_string(),
                message: "environment table poisoned".to_string(),
            })?;
        environments.insert(
            id.clone(),
            EmulatedEnvironment {
                root,
                started: false,
            },
        );
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        let mut environments = self
            .environments
            .lock()
            .map_err(|_| RuntimeError::UnknownEnvironment(id.to_string()))?;
        let env = environments
            .get_mut(id)
            .ok_or_else(|| RuntimeError::UnknownEnvironment(id.to_string()))?;
        env.started = true;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        let removed = self
            .environments
            .lock()
            .map_err(|_| RuntimeError::UnknownEnvironment(id.to_string()))?
            .remove(id);

        match removed {
            Some(env) => env.root.close().map_err(|e| RuntimeError::Remove {
                id: id.to_string(),
                message: e.to_string(),
            }),
            None => Err(RuntimeError::UnknownEnvironment(id.to_string())),
        }
    }

    async fn exec(&self, id: &str, request: &ExecRequest) -> Result<ExecOutput, RuntimeError> {
        let root = self.started_root(id)?;
        let exec_error = |message: String| RuntimeError::Exec {
            id: id.to_string(),
            message,
        };

        let working_dir = resolve(&root, &request.working_dir);
        std::fs::create_dir_all(&working_dir).map_err(|e| exec_error(e.to_string()))?;

        let argv: Vec<String> = match request.command.as_slice() {
            [shell, flag, script] if shell == "sh" && flag == "-c" => {
                vec![shell.clone(), flag.clone(), map_script(&root, script)]
            }
            other => other.to_vec(),
        };
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| exec_error("no command specified".to_string()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for binding in &request.env {
            if let Some((key, value)) = binding.split_once('=') {
                command.env(key, value);
            }
        }

        let mut child = command.spawn().map_err(|e| exec_error(e.to_string()))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Both pipes are drained while waiting so neither can fill up and stall the child.
        let (stdout, stderr, status) =
            tokio::try_join!(read_all(stdout), read_all(stderr), child.wait())
                .map_err(|e| exec_error(e.to_string()))?;

        let exit_code = status.code().ok_or_else(|| RuntimeError::Inspect {
            id: id.to_string(),
            message: "process terminated by signal".to_string(),
        })?;

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code: i64::from(exit_code),
        })
    }

    async fn upload(&self, id: &str, dst: &str, archive: Vec<u8>) -> Result<(), RuntimeError> {
        let root = self.started_root(id)?;
        utils::unpack(&archive, &resolve(&root, dst)).map_err(|e| RuntimeError::Copy {
            id: id.to_string(),
            path: dst.to_string(),
            message: e.to_string(),
        })
    }

    async fn download(&self, id: &str, src: &str) -> Result<Vec<u8>, RuntimeError> {
        let root = self.started_root(id)?;
        let path = resolve(&root, src);
        let copy_error = |message: String| RuntimeError::Copy {
            id: id.to_string(),
            path: src.to_string(),
            message,
        };

        if path == root || !path.exists() {
            return Err(copy_error("no such file or directory".to_string()));
        }
        utils::pack_entry(&path).map_err(|e| copy_error(e.to_string()))
    }

    async fn close(&self) -> Result<(), RuntimeError> {
        // Anything still registered here was created outside a runtime client.
        if let Ok(mut environments) = self.environments.lock() {
            environments.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_stays_under_root() {
        let root = Path::new("/tmp/root");
        assert_eq!(resolve(root, "/home/a.txt"), root.join("home/a.txt"));
        assert_eq!(resolve(root, "rel/b"), root.join("rel/b"));
        assert_eq!(resolve(root, "/../../etc/passwd"), root.join("etc/passwd"));
        assert_eq!(resolve(root, "/"), root.to_path_buf());
    }

    #[test]
    fn test_map_script_rewrites_known_top_level_dirs() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("data")).unwrap();
        let mapped = root.path().join("data");
        let mapped = mapped.display();

        assert_eq!(
            map_script(root.path(), "cat /data/a.txt > /dev/null"),
            format!("cat {}/a.txt > /dev/null", mapped)
        );
        assert_eq!(
            map_script(root.path(), "cd \"/data\" && ls relative/data"),
            format!("cd \"{}\" && ls relative/data", mapped)
        );
        assert_eq!(
            map_script(root.path(), "curl http://host/data"),
            "curl http://host/data"
        );
        assert_eq!(map_script(root.path(), "/bin/sh -c true"), "/bin/sh -c true");
    }
}
