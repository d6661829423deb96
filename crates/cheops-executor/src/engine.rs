//! Image build engine.
//!
//! Each container is built by two concurrent tasks joined over an in-memory
//! pipe: an archiver that tars the build context into the write end, and a
//! builder that streams the read end into the daemon while consuming its
//! progress output. Both tasks are always awaited. A failed archive walk is
//! reported over whatever the daemon made of the truncated context.

use cheops_core::{
    BuildContext, BuildRequest, ContainerSpec, ContextStream, Error, ImageDaemon, Result,
};
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio_util::io::{ReaderStream, SyncIoBridge};
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

use crate::{archive, progress};

const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Builds the images a manifest declares.
pub struct ImageBuildEngine {
    daemon: Arc<dyn ImageDaemon>,
    pipe_capacity: usize,
}

impl ImageBuildEngine {
    pub fn new(daemon: Arc<dyn ImageDaemon>) -> Self {
        Self {
            daemon,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }

    /// Bytes buffered between archiver and builder before the archiver blocks.
    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity.max(1);
        self
    }

    /// Build every container in manifest order, stopping at the first failure.
    pub async fn build_all(&self, ctx: &BuildContext) -> Result<()> {
        for spec in &ctx.manifest.containers {
            info!(container = %spec.tag, context = %spec.context, "Building image");
            self.build_container(ctx.workspace(), spec).await?;
            info!(container = %spec.tag, "Image built");
        }
        Ok(())
    }

    /// Build one container from `workspace/<spec.context>`.
    pub async fn build_container(&self, workspace: &Path, spec: &ContainerSpec) -> Result<()> {
        let context_dir = workspace.join(&spec.context);
        if !context_dir.is_dir() {
            return Err(Error::BuildFailed(format!(
                "{}: build context {} is not a directory",
                spec.tag, spec.context
            )));
        }

        let request = BuildRequest {
            tag: spec.tag.clone(),
            dockerfile: spec.dockerfile.clone(),
            build_args: resolve_build_args(&spec.build_args),
        };

        let (reader, writer) = tokio::io::duplex(self.pipe_capacity);

        let archiver = {
            let tag = spec.tag.clone();
            let bridge = SyncIoBridge::new(writer);
            tokio::task::spawn_blocking(move || {
                let result = archive::write_context(&context_dir, bridge).and_then(|mut bridge| {
                    bridge.flush()?;
                    bridge.shutdown()
                });
                debug!(container = %tag, ok = result.is_ok(), "Archiver finished");
                result
            })
        };

        let builder = {
            let daemon = self.daemon.clone();
            let tag = spec.tag.clone();
            let context: ContextStream = ReaderStream::new(reader)
                .filter_map(|chunk| futures::future::ready(chunk.ok()))
                .boxed();
            AbortOnDropHandle::new(tokio::spawn(async move {
                let result =
                    progress::consume(daemon.build_image(request, context), &tag, Error::BuildFailed)
                        .await;
                debug!(container = %tag, ok = result.is_ok(), "Builder finished");
                result
            }))
        };

        // The archiver finishes once the builder stops reading, so neither
        // await can block the other.
        let archived = archiver.await.map_err(|e| {
            warn!(container = %spec.tag, error = %e, "Archiver did not complete");
            Error::Internal(format!("archiver task failed: {e}"))
        });
        let built = builder.await.map_err(|e| {
            warn!(container = %spec.tag, error = %e, "Builder did not complete");
            Error::Internal(format!("builder task failed: {e}"))
        });

        let archive_error = |e: std::io::Error| {
            Error::BuildFailed(format!("{}: archiving build context: {e}", spec.tag))
        };
        match (archived, built.and_then(|r| r)) {
            (Err(err), _) => Err(err),
            // A closed pipe means the builder stopped reading; its error is the cause.
            (Ok(Err(e)), Err(err)) if e.kind() == std::io::ErrorKind::BrokenPipe => Err(err),
            (Ok(Err(e)), _) => Err(archive_error(e)),
            (Ok(Ok(())), built) => built,
        }
    }
}

/// Value-less build args are taken from the process environment and dropped
/// when unset there.
fn resolve_build_args(args: &BTreeMap<String, Option<String>>) -> HashMap<String, String> {
    args.iter()
        .filter_map(|(name, value)| match value {
            Some(value) => Some((name.clone(), value.clone())),
            None => std::env::var(name).ok().map(|value| (name.clone(), value)),
        })
        .collect()
}
