//! Docker daemon access through bollard.

// The option structs in bollard::image and bollard::container are deprecated
// in 0.19 but still convert into the query parameter types.
#![allow(deprecated)]

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::container::{Config, LogOutput};
use bollard::image::{BuildImageOptions, CreateImageOptions, PushImageOptions};
use bollard::query_parameters::{
    CreateContainerOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    WaitContainerOptions,
};
use cheops_core::{
    BuildRequest, ContextStream, Error, ImageDaemon, LogLine, LogStream, ProgressMessage,
    ProgressStream, RegistryCredentials, Result, RunRequest,
};
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, info, warn};

/// [`ImageDaemon`] backed by the local Docker engine.
pub struct BollardDaemon {
    docker: Docker,
}

impl BollardDaemon {
    /// Connect using the platform defaults (`DOCKER_HOST` or the local socket).
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Daemon(format!("connecting to docker: {e}")))?;
        Ok(Self { docker })
    }

    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let (from_image, tag) = split_reference(image);
        info!(image = %image, "Pulling image");

        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(image = %image, status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    return Err(Error::ExecutionFailed(format!("pulling {image}: {e}")));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ImageDaemon for BollardDaemon {
    fn build_image(&self, request: BuildRequest, context: ContextStream) -> ProgressStream<'_> {
        let options = BuildImageOptions {
            dockerfile: request.dockerfile,
            t: request.tag,
            buildargs: request.build_args,
            pull: true,
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        self.docker
            .build_image(options, None, Some(bollard::body_stream(context)))
            .map(|result| match result {
                Ok(info) => Ok(ProgressMessage {
                    stream: info.stream,
                    status: info.status,
                    id: info.id,
                    progress: info.progress,
                    error: info.error,
                    error_detail: info.error_detail.map(|detail| cheops_core::daemon::ErrorDetail {
                        code: detail.code,
                        message: detail.message,
                    }),
                }),
                Err(e) => stream_error(e),
            })
            .boxed()
    }

    fn push_image(&self, image: &str, credentials: RegistryCredentials) -> ProgressStream<'_> {
        let (repository, tag) = split_reference(image);
        let options = PushImageOptions::<String> { tag };
        let credentials = DockerCredentials {
            username: Some(credentials.username),
            password: Some(credentials.password),
            email: Some(credentials.email),
            serveraddress: credentials.serveraddress,
            ..Default::default()
        };

        self.docker
            .push_image(&repository, Some(options), Some(credentials))
            .map(|result| match result {
                Ok(info) => Ok(ProgressMessage {
                    status: info.status,
                    progress: info.progress,
                    error: info.error,
                    ..Default::default()
                }),
                Err(e) => stream_error(e),
            })
            .boxed()
    }

    async fn start_container(&self, request: RunRequest) -> Result<String> {
        self.pull_image(&request.image).await?;

        let config = Config {
            image: Some(request.image.clone()),
            cmd: Some(request.command),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container(None::<CreateContainerOptions>, config)
            .await
            .map_err(|e| Error::ExecutionFailed(format!("creating container for {}: {e}", request.image)))?;

        for warning in &container.warnings {
            warn!(container = %container.id, "{}", warning);
        }

        info!(container = %container.id, image = %request.image, "Starting container");
        if let Err(e) = self
            .docker
            .start_container(&container.id, None::<StartContainerOptions>)
            .await
        {
            if let Err(remove) = self.remove_container(&container.id).await {
                warn!(container = %container.id, error = %remove, "Failed to remove container");
            }
            return Err(Error::ExecutionFailed(format!(
                "starting container for {}: {e}",
                request.image
            )));
        }

        Ok(container.id)
    }

    fn container_logs(&self, id: &str) -> BoxStream<'static, Result<LogLine>> {
        let options = LogsOptions {
            follow: true,
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };

        self.docker
            .logs(id, Some(options))
            .map(|result| {
                let (stream, message) = match result.map_err(|e| Error::Daemon(e.to_string()))? {
                    LogOutput::StdErr { message } => (LogStream::Stderr, message),
                    LogOutput::StdOut { message }
                    | LogOutput::Console { message }
                    | LogOutput::StdIn { message } => (LogStream::Stdout, message),
                };
                Ok(LogLine {
                    stream,
                    content: String::from_utf8_lossy(&message).trim_end().to_string(),
                })
            })
            .boxed()
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        let options = WaitContainerOptions {
            condition: "not-running".to_string(),
        };

        let mut stream = self.docker.wait_container(id, Some(options));
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(Error::Daemon(format!("waiting for container {id}: {e}"))),
            None => Err(Error::Daemon(format!(
                "wait stream for container {id} ended without a status"
            ))),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(Error::Daemon(format!("removing container {id}: {e}"))),
        }
    }
}

/// An error line embedded in the output arrives as a stream error; keep it
/// in-band so the consumer reports it like any other failed step.
fn stream_error(err: bollard::errors::Error) -> Result<ProgressMessage> {
    match err {
        bollard::errors::Error::DockerStreamError { error } => Ok(ProgressMessage::error(error)),
        other => Err(Error::Daemon(other.to_string())),
    }
}

/// Split an image reference into repository and tag, defaulting to `latest`.
/// A digest reference keeps the digest as its tag.
pub fn split_reference(image: &str) -> (String, String) {
    if let Some((repository, digest)) = image.split_once('@') {
        return (repository.to_string(), digest.to_string());
    }

    // A colon before the last slash belongs to a registry port.
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (image[..split].to_string(), image[split + 1..].to_string())
        }
        None => (image.to_string(), "latest".to_string()),
    }
}
