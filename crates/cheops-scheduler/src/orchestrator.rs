//! The build orchestrator: the process-wide context every build runs through.

use cheops_config::SystemConfig;
use cheops_config::system::DEFAULT_MANIFEST_PATH;
use cheops_core::{
    BuildContext, BuildId, CommitEvent, Error, FactoryContext, ImageDaemon, ProviderFactories,
    ProviderRegistry, Repository, Result,
};
use cheops_executor::{ActionExecutor, BollardDaemon, ImageBuildEngine};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

use crate::resolver;

/// Per-build settings taken from the `general` configuration block.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Manifest template location, relative to the clone root.
    pub manifest_path: PathBuf,
    /// Parent directory for build workspaces; the system temp dir if unset.
    pub workspace_dir: Option<PathBuf>,
    /// Deadline covering clone, builds and actions.
    pub build_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from(DEFAULT_MANIFEST_PATH),
            workspace_dir: None,
            build_timeout: Duration::from_secs(3600),
        }
    }
}

impl From<&cheops_config::GeneralConfig> for OrchestratorSettings {
    fn from(general: &cheops_config::GeneralConfig) -> Self {
        Self {
            manifest_path: general.manifest_path.clone(),
            workspace_dir: general.workspace_dir.clone(),
            build_timeout: general.build_timeout,
        }
    }
}

/// Configured repositories, constructed providers and the image daemon.
///
/// Built once at startup and shared by reference with every build; nothing
/// in it changes afterwards.
pub struct Orchestrator {
    settings: OrchestratorSettings,
    repositories: Vec<Repository>,
    providers: Arc<ProviderRegistry>,
    engine: ImageBuildEngine,
    actions: ActionExecutor,
}

impl Orchestrator {
    /// Every repository must name a registered source provider.
    pub fn new(
        settings: OrchestratorSettings,
        repositories: Vec<Repository>,
        providers: Arc<ProviderRegistry>,
        daemon: Arc<dyn ImageDaemon>,
    ) -> Result<Self> {
        for repo in &repositories {
            if !providers.has_source(&repo.provider) {
                return Err(Error::InvalidInput(format!(
                    "repository {} uses unknown source provider {:?}",
                    repo.url, repo.provider
                )));
            }
        }

        Ok(Self {
            settings,
            repositories,
            engine: ImageBuildEngine::new(daemon.clone()),
            actions: ActionExecutor::new(daemon, providers.clone()),
            providers,
        })
    }

    /// Construct the built-in providers and connect to the local Docker daemon.
    pub async fn from_config(config: &SystemConfig) -> Result<Self> {
        let daemon = Arc::new(BollardDaemon::new()?);
        Self::with_factories(config, &cheops_providers::default_factories(), daemon).await
    }

    pub async fn with_factories(
        config: &SystemConfig,
        factories: &ProviderFactories,
        daemon: Arc<dyn ImageDaemon>,
    ) -> Result<Self> {
        let ctx = FactoryContext {
            webhook_url: config.general.webhook_url.clone(),
        };
        let providers = factories
            .build(&config.sources, &config.credentials, &ctx)
            .await?;
        info!(
            sources = ?providers.source_names(),
            credentials = ?providers.credential_names(),
            "Providers initialized"
        );

        Self::new(
            OrchestratorSettings::from(&config.general),
            config.repositories.clone(),
            Arc::new(providers),
            daemon,
        )
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// The repository tracked through `provider` whose URL and branch equal
    /// the commit's.
    pub fn match_repository(&self, provider: &str, commit: &CommitEvent) -> Option<&Repository> {
        self.repositories
            .iter()
            .find(|repo| repo.provider == provider && repo.matches(commit))
    }

    /// Ensure every repository's backend delivers push events to us.
    pub async fn register_repositories(&self) -> Result<()> {
        for repo in &self.repositories {
            let source = self.providers.source(&repo.provider)?;
            source.register_repo(repo).await?;
            info!(repository = %repo.url, branch = %repo.branch, provider = %repo.provider, "Repository registered");
        }
        Ok(())
    }

    /// Run one build on a background task.
    pub fn dispatch(self: &Arc<Self>, repo: Repository, commit: CommitEvent) -> JoinHandle<Result<()>> {
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.run_build(&repo, &commit).await })
    }

    /// Run one build to completion inside its own span, logging the outcome.
    pub async fn run_build(&self, repo: &Repository, commit: &CommitEvent) -> Result<()> {
        let id = BuildId::new();
        let span = info_span!(
            "build",
            build_id = %id,
            repository = %commit.repository,
            branch = %commit.branch,
            commit = %commit.short_id(),
        );

        async {
            info!("Build started");
            let result = self.run(id, repo, commit).await;
            match &result {
                Ok(()) => info!("Build succeeded"),
                Err(e) => error!(error = %e, "Build failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Resolve and execute a build under the configured deadline.
    ///
    /// Expiry drops the in-flight work, which cancels daemon calls and
    /// removes the workspace.
    pub async fn run(&self, id: BuildId, repo: &Repository, commit: &CommitEvent) -> Result<()> {
        let timeout = self.settings.build_timeout;
        tokio::time::timeout(timeout, async {
            let ctx = self.resolve(id, repo, commit).await?;
            self.execute(ctx).await
        })
        .await
        .map_err(|_| Error::Timeout(format!("build exceeded {}s", timeout.as_secs())))?
    }

    pub async fn resolve(
        &self,
        id: BuildId,
        repo: &Repository,
        commit: &CommitEvent,
    ) -> Result<BuildContext> {
        let source = self.providers.source(&repo.provider)?;
        resolver::resolve(id, source.as_ref(), repo, commit, &self.settings).await
    }

    /// Build every container, then run every action; the workspace is
    /// removed whatever the outcome.
    pub async fn execute(&self, ctx: BuildContext) -> Result<()> {
        let result = async {
            self.engine.build_all(&ctx).await?;
            self.actions.execute_all(&ctx.manifest.actions).await
        }
        .await;

        let workspace = ctx.workspace().to_path_buf();
        if let Err(e) = ctx.cleanup() {
            warn!(workspace = %workspace.display(), error = %e, "Failed to remove workspace");
        }
        result
    }
}
