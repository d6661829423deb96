//! Foreground build command.

use anyhow::{Context, Result, bail};
use cheops_config::load_system_config;
use cheops_core::CommitEvent;
use cheops_scheduler::Orchestrator;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Build `commit` of a configured repository without waiting for a webhook.
pub async fn run(
    config_path: &Path,
    repository: &str,
    commit: &str,
    branch: Option<String>,
) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_system_config(config_path)
        .with_context(|| format!("Failed to load configuration: {}", config_path.display()))?;

    let Some(repo) = config
        .repositories
        .iter()
        .find(|r| r.url == repository && branch.as_deref().is_none_or(|b| r.branch == b))
        .cloned()
    else {
        bail!("No configured repository matches {repository}");
    };

    let orchestrator = Orchestrator::from_config(&config)
        .await
        .context("Failed to initialize providers")?;

    let commit = CommitEvent {
        id: commit.to_string(),
        branch: branch.unwrap_or_else(|| repo.branch.clone()),
        repository: repo.url.clone(),
    };
    orchestrator
        .run_build(&repo, &commit)
        .await
        .context("Build failed")?;

    Ok(())
}
