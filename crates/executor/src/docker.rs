use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, DownloadFromContainerOptions, LogOutput,
        RemoveContainerOptions, UploadToContainerOptions,
    },
    exec::{CreateExecOptions, StartExecResults},
    image::CreateImageOptions,
    Docker,
};
use futures_util::StreamExt;
use runtime::{ExecOutput, ExecRequest, RuntimeError, Substrate};

/// Substrate backed by a local Docker daemon.
pub struct DockerSubstrate {
    docker: Docker,
}

impl DockerSubstrate {
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Connection(e.to_string()))?;
        Ok(DockerSubstrate { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        DockerSubstrate { docker }
    }
}

/// Whether a daemon answers on the local default socket.
pub async fn is_available() -> bool {
    match Docker::connect_with_local_defaults() {
        Ok(docker) => docker.ping().await.is_ok(),
        Err(_) => false,
    }
}

/// Splits an image reference into repository and tag (or digest). An untagged reference means
/// `latest`; the engine would pull every tag of the repository otherwise.
pub fn split_image_ref(image: &str) -> (&str, &str) {
    if let Some((repository, digest)) = image.split_once('@') {
        return (repository, digest);
    }

    // A colon before the last slash belongs to a registry port, not a tag.
    let name_start = image.rfind('/').map_or(0, |slash| slash + 1);
    match image[name_start..].rfind(':') {
        Some(colon) => {
            let colon = name_start + colon;
            (&image[..colon], &image[colon + 1..])
        }
        None => (image, "latest"),
    }
}

#[async_trait]
impl Substrate for DockerSubstrate {
    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        let (repository, tag) = split_image_ref(image);
        let options = CreateImageOptions {
            from_image: repository,
            tag,
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            if let Err(e) = result {
                return Err(RuntimeError::ImagePull {
                    image: image.to_string(),
                    message: e.to_string(),
                });
            }
        }

        Ok(())
    }

    async fn create(&self, image: &str) -> Result<String, RuntimeError> {
        let options = Some(CreateContainerOptions {
            name: format!("anypipe-{}", uuid::Uuid::new_v4()),
            platform: None,
        });

        let config = Config {
            image: Some(image.to_string()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            tty: Some(false),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container(options, config)
            .await
            .map_err(|e| RuntimeError::Create {
                image: image.to_string(),
                message: e.to_string(),
            })?;

        Ok(container.id)
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container::<String>(id, None)
            .await
            .map_err(|e| RuntimeError::Start {
                id: id.to_string(),
                message: e.to_string(),
            })
    }

    async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        let options = Some(RemoveContainerOptions {
            force: true,
            ..Default::default()
        });

        self.docker
            .remove_container(id, options)
            .await
            .map_err(|e| RuntimeError::Remove {
                id: id.to_string(),
                message: e.to_string(),
            })
    }

    async fn exec(&self, id: &str, request: &ExecRequest) -> Result<ExecOutput, RuntimeError> {
        let exec_error = |message: String| RuntimeError::Exec {
            id: id.to_string(),
            message,
        };

        let options = CreateExecOptions {
            cmd: Some(request.command.clone()),
            env: Some(request.env.clone()),
            working_dir: Some(request.working_dir.clone()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(id, options)
            .await
            .map_err(|e| exec_error(e.to_string()))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| exec_error(e.to_string()))?
        {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(message) = output.next().await {
                    match message.map_err(|e| exec_error(e.to_string()))? {
                        LogOutput::StdOut { message } => stdout.extend_from_slice(&message),
                        LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                        _ => {}
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(exec_error("exec started detached".to_string()));
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| RuntimeError::Inspect {
                id: id.to_string(),
                message: e.to_string(),
            })?;

        let exit_code = inspect.exit_code.ok_or_else(|| RuntimeError::Inspect {
            id: id.to_string(),
            message: "exec reported no exit code".to_string(),
        })?;

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    async fn upload(&self, id: &str, dst: &str, archive: Vec<u8>) -> Result<(), RuntimeError> {
        let options = Some(UploadToContainerOptions {
            path: dst.to_string(),
            ..Default::default()
        });

        self.docker
            .upload_to_container(id, options, archive.into())
            .await
            .map_err(|e| RuntimeError::Copy {
                id: id.to_string(),
                path: dst.to_string(),
                message: e.to_string(),
            })
    }

    async fn download(&self, id: &str, src: &str) -> Result<Vec<u8>, RuntimeError> {
        let options = Some(DownloadFromContainerOptions {
            path: src.to_string(),
        });
        let mut stream = self.docker.download_from_container(id, options);

        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RuntimeError::Copy {
                id: id.to_string(),
                path: src.to_string(),
                message: e.to_string(),
            })?;
            archive.extend_from_slice(&chunk);
        }

        Ok(archive)
    }

    async fn close(&self) -> Result<(), RuntimeError> {
        // The HTTP client holds no server-side state; dropping it closes the connection.
        Ok(())
    }
}
