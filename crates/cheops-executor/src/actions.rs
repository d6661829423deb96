//! Post-build action execution.

use cheops_core::{Action, Error, ImageDaemon, ProviderRegistry, Result, RunRequest};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::progress;

/// Runs a manifest's actions sequentially; the first failure aborts the rest.
pub struct ActionExecutor {
    daemon: Arc<dyn ImageDaemon>,
    providers: Arc<ProviderRegistry>,
}

impl ActionExecutor {
    pub fn new(daemon: Arc<dyn ImageDaemon>, providers: Arc<ProviderRegistry>) -> Self {
        Self { daemon, providers }
    }

    pub async fn execute_all(&self, actions: &[Action]) -> Result<()> {
        for (index, action) in actions.iter().enumerate() {
            info!(action = action.kind(), index, image = %action.image(), "Running action");
            self.execute(action).await.inspect_err(|e| {
                warn!(action = action.kind(), index, error = %e, "Action failed");
            })?;
        }
        Ok(())
    }

    pub async fn execute(&self, action: &Action) -> Result<()> {
        match action {
            Action::Push { image, provider } => self.push(image, provider).await,
            Action::Exec { image, commands } => self.exec(image, commands).await,
        }
    }

    async fn push(&self, image: &str, provider: &str) -> Result<()> {
        // Resolved per action: an unknown provider fails only this build.
        let credentials = self
            .providers
            .credentials(provider)?
            .get_credentials()
            .await?;

        info!(image = %image, provider = %provider, "Pushing image");
        progress::consume(
            self.daemon.push_image(image, credentials),
            image,
            Error::PushFailed,
        )
        .await?;
        info!(image = %image, "Image pushed");
        Ok(())
    }

    async fn exec(&self, image: &str, commands: &[String]) -> Result<()> {
        let request = RunRequest {
            image: image.to_string(),
            command: vec!["/bin/sh".to_string(), "-c".to_string(), commands.join(";")],
        };

        let id = self.daemon.start_container(request).await?;
        let container = ContainerGuard::new(self.daemon.clone(), id);

        let status = self.follow(container.id()).await;
        container.remove().await;

        match status? {
            0 => {
                info!(image = %image, "Container exited successfully");
                Ok(())
            }
            code => Err(Error::ExecutionFailed(format!(
                "{image} exited with status {code}"
            ))),
        }
    }

    /// Relay the container's output until it exits, then return its status.
    async fn follow(&self, id: &str) -> Result<i64> {
        let mut logs = self.daemon.container_logs(id);
        while let Some(line) = logs.next().await {
            match line {
                Ok(line) => info!(container = %id, stream = %line.stream, "{}", line.content),
                Err(e) => {
                    warn!(container = %id, error = %e, "Log stream error");
                    break;
                }
            }
        }
        self.daemon.wait_container(id).await
    }
}

/// Removes its container when dropped, so a cancelled build does not leave
/// one behind.
struct ContainerGuard {
    daemon: Arc<dyn ImageDaemon>,
    id: Option<String>,
}

impl ContainerGuard {
    fn new(daemon: Arc<dyn ImageDaemon>, id: String) -> Self {
        Self {
            daemon,
            id: Some(id),
        }
    }

    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    async fn remove(mut self) {
        if let Some(id) = self.id.take() {
            if let Err(e) = self.daemon.remove_container(&id).await {
                warn!(container = %id, error = %e, "Failed to remove container");
            }
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let daemon = self.daemon.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = daemon.remove_container(&id).await {
                    warn!(container = %id, error = %e, "Failed to remove container");
                }
            });
        }
    }
}
