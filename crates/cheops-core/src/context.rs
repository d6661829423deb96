//! The resolved, ready-to-execute bundle for one build.

use std::path::Path;
use tempfile::TempDir;

use crate::{BuildId, CommitEvent, Manifest};

/// Workspace, manifest and triggering commit of a single build.
///
/// The workspace directory is owned exclusively by this context and is
/// removed when the context is cleaned up or dropped.
#[derive(Debug)]
pub struct BuildContext {
    pub id: BuildId,
    pub manifest: Manifest,
    pub commit: CommitEvent,
    workspace: TempDir,
}

impl BuildContext {
    pub fn new(id: BuildId, workspace: TempDir, manifest: Manifest, commit: CommitEvent) -> Self {
        Self {
            id,
            manifest,
            commit,
            workspace,
        }
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    /// Remove the workspace, reporting any filesystem error.
    pub fn cleanup(self) -> std::io::Result<()> {
        self.workspace.close()
    }
}
