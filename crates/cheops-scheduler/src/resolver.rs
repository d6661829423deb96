//! Build context resolution: workspace, clone, manifest.

use cheops_config::{TemplateContext, render_manifest};
use cheops_core::{BuildContext, BuildId, CommitEvent, Error, Repository, Result, SourceProvider};
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::OrchestratorSettings;

/// Clone `commit` into a fresh workspace and load its manifest.
///
/// On any failure the workspace is removed and no context is returned.
pub async fn resolve(
    id: BuildId,
    source: &dyn SourceProvider,
    repo: &Repository,
    commit: &CommitEvent,
    settings: &OrchestratorSettings,
) -> Result<BuildContext> {
    let workspace = allocate_workspace(settings.workspace_dir.as_deref())?;
    debug!(workspace = %workspace.path().display(), "Allocated workspace");

    source.clone_commit(commit, workspace.path()).await?;
    info!(provider = %repo.provider, "Cloned repository");

    let manifest_path = workspace.path().join(&settings.manifest_path);
    let template = match tokio::fs::read_to_string(&manifest_path).await {
        Ok(template) => template,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::Manifest(format!(
                "no manifest at {} in commit {}",
                settings.manifest_path.display(),
                commit.id
            )));
        }
        Err(e) => {
            return Err(Error::Manifest(format!(
                "reading {}: {e}",
                settings.manifest_path.display()
            )));
        }
    };

    let manifest = render_manifest(&template, &TemplateContext::new(repo, commit))?;
    info!(
        containers = manifest.containers.len(),
        actions = manifest.actions.len(),
        "Loaded manifest"
    );

    Ok(BuildContext::new(id, workspace, manifest, commit.clone()))
}

fn allocate_workspace(root: Option<&Path>) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("cheops-");
    match root {
        Some(root) => {
            std::fs::create_dir_all(root)?;
            Ok(builder.tempdir_in(root)?)
        }
        None => Ok(builder.tempdir()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSource, commit, repository};

    fn settings(root: &Path) -> OrchestratorSettings {
        OrchestratorSettings {
            workspace_dir: Some(root.to_path_buf()),
            ..Default::default()
        }
    }

    fn workspaces(root: &Path) -> usize {
        std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_resolves_rendered_manifest() {
        let root = tempfile::tempdir().unwrap();
        let source = FakeSource::with_manifest(
            "container \"app:{{ .Commit }}\" {\n    arg \"TOKEN\" \"{{ .Secrets.TOKEN }}\"\n}\n",
        );

        let ctx = resolve(BuildId::new(), &source, &repository(), &commit(), &settings(root.path()))
            .await
            .unwrap();

        assert_eq!(source.clones(), vec!["https://example.com/r.git@abc123".to_string()]);
        assert_eq!(ctx.manifest.containers[0].tag, "app:abc123");
        assert_eq!(
            ctx.manifest.containers[0].build_args.get("TOKEN"),
            Some(&Some("s3cret".to_string()))
        );
        assert!(ctx.workspace().starts_with(root.path()));
        assert!(ctx.workspace().join("Dockerfile").exists());
    }

    #[tokio::test]
    async fn test_workspaces_are_unique() {
        let root = tempfile::tempdir().unwrap();
        let source = FakeSource::with_manifest("");
        let settings = settings(root.path());

        let a = resolve(BuildId::new(), &source, &repository(), &commit(), &settings)
            .await
            .unwrap();
        let b = resolve(BuildId::new(), &source, &repository(), &commit(), &settings)
            .await
            .unwrap();

        assert_ne!(a.workspace(), b.workspace());
        assert!(a.manifest.is_empty());
    }

    #[tokio::test]
    async fn test_clone_failure_removes_workspace() {
        let root = tempfile::tempdir().unwrap();
        let source = FakeSource::failing_clone();

        let err = resolve(BuildId::new(), &source, &repository(), &commit(), &settings(root.path()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CloneFailed(_)));
        assert_eq!(workspaces(root.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_manifest_fails() {
        let root = tempfile::tempdir().unwrap();
        let source = FakeSource::without_manifest();

        let err = resolve(BuildId::new(), &source, &repository(), &commit(), &settings(root.path()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Manifest(msg) if msg.contains("no manifest")));
        assert_eq!(workspaces(root.path()), 0);
    }

    #[tokio::test]
    async fn test_unresolved_template_variable_fails() {
        let root = tempfile::tempdir().unwrap();
        let source = FakeSource::with_manifest("container \"app:{{ .Secrets.MISSING }}\"\n");

        let err = resolve(BuildId::new(), &source, &repository(), &commit(), &settings(root.path()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Manifest(msg) if msg.contains("MISSING")));
        assert_eq!(workspaces(root.path()), 0);
    }
}
