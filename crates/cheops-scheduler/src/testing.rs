//! In-memory providers and daemon shared by the scheduler tests.

use async_trait::async_trait;
use bytes::Bytes;
use cheops_core::{
    BuildRequest, CommitEvent, ContextStream, CredentialProvider, Error, ImageDaemon, LogLine,
    ProgressMessage, ProgressStream, RegistryCredentials, Repository, Result, RunRequest,
    SourceProvider, WebhookDelivery, WebhookError,
};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const REPO_URL: &str = "https://example.com/r.git";

pub fn repository() -> Repository {
    Repository {
        provider: "fake".to_string(),
        url: REPO_URL.to_string(),
        branch: "main".to_string(),
        secrets: HashMap::from([("TOKEN".to_string(), "s3cret".to_string())]),
    }
}

pub fn commit() -> CommitEvent {
    CommitEvent {
        id: "abc123".to_string(),
        branch: "main".to_string(),
        repository: REPO_URL.to_string(),
    }
}

/// A push delivery in the fake provider's wire format: `<ref> <sha> <url>`.
pub fn delivery(git_ref: &str, sha: &str, url: &str) -> WebhookDelivery {
    WebhookDelivery::new(format!("{git_ref} {sha} {url}")).with_header("X-Fake-Event", "push")
}

enum CloneBehavior {
    Manifest(String),
    NoManifest,
    Fail,
}

/// Source provider whose "clone" writes a Dockerfile and a fixed manifest.
pub struct FakeSource {
    behavior: CloneBehavior,
    clones: Mutex<Vec<String>>,
    registered: Mutex<Vec<String>>,
}

impl FakeSource {
    fn new(behavior: CloneBehavior) -> Self {
        Self {
            behavior,
            clones: Mutex::new(Vec::new()),
            registered: Mutex::new(Vec::new()),
        }
    }

    pub fn with_manifest(manifest: &str) -> Self {
        Self::new(CloneBehavior::Manifest(manifest.to_string()))
    }

    pub fn without_manifest() -> Self {
        Self::new(CloneBehavior::NoManifest)
    }

    pub fn failing_clone() -> Self {
        Self::new(CloneBehavior::Fail)
    }

    pub fn clones(&self) -> Vec<String> {
        self.clones.lock().unwrap().clone()
    }

    pub fn registered(&self) -> Vec<String> {
        self.registered.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceProvider for FakeSource {
    fn kind(&self) -> &'static str {
        "fake"
    }

    async fn register_repo(&self, repo: &Repository) -> Result<()> {
        self.registered.lock().unwrap().push(repo.url.clone());
        Ok(())
    }

    async fn clone_commit(&self, commit: &CommitEvent, target_dir: &Path) -> Result<()> {
        self.clones
            .lock()
            .unwrap()
            .push(format!("{}@{}", commit.repository, commit.id));

        match &self.behavior {
            CloneBehavior::Fail => Err(Error::CloneFailed("remote hung up".to_string())),
            CloneBehavior::NoManifest => {
                std::fs::write(target_dir.join("Dockerfile"), "FROM alpine\n")?;
                Ok(())
            }
            CloneBehavior::Manifest(manifest) => {
                std::fs::write(target_dir.join("Dockerfile"), "FROM alpine\n")?;
                std::fs::write(target_dir.join(".cheops.kdl"), manifest)?;
                Ok(())
            }
        }
    }

    fn parse_webhook(
        &self,
        delivery: &WebhookDelivery,
    ) -> std::result::Result<CommitEvent, WebhookError> {
        let event = delivery
            .header("x-fake-event")
            .ok_or_else(|| WebhookError::MissingHeader("X-Fake-Event".to_string()))?;
        if event != "push" {
            return Err(WebhookError::UnexpectedEvent {
                expected: "push".to_string(),
                actual: event.to_string(),
            });
        }

        let body = std::str::from_utf8(&delivery.body)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        let parts: Vec<&str> = body.split_whitespace().collect();
        let [git_ref, sha, url] = parts.as_slice() else {
            return Err(WebhookError::MalformedPayload(body.to_string()));
        };
        let branch = git_ref
            .strip_prefix("refs/heads/")
            .ok_or_else(|| WebhookError::NotABranch(git_ref.to_string()))?;

        Ok(CommitEvent {
            id: sha.to_string(),
            branch: branch.to_string(),
            repository: url.to_string(),
        })
    }
}

pub struct StaticCredentials;

#[async_trait]
impl CredentialProvider for StaticCredentials {
    fn kind(&self) -> &'static str {
        "static"
    }

    async fn get_credentials(&self) -> Result<RegistryCredentials> {
        Ok(RegistryCredentials {
            username: "user".to_string(),
            password: "pass".to_string(),
            email: "none".to_string(),
            serveraddress: None,
        })
    }
}

/// Image daemon that drains build contexts and records every call.
#[derive(Default)]
pub struct FakeDaemon {
    pub hang_builds: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeDaemon {
    pub fn hanging() -> Self {
        Self {
            hang_builds: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ImageDaemon for FakeDaemon {
    fn build_image(&self, request: BuildRequest, context: ContextStream) -> ProgressStream<'_> {
        if self.hang_builds {
            return stream::pending().boxed();
        }
        let calls = self.calls.clone();
        stream::once(async move {
            let chunks: Vec<Bytes> = context.collect().await;
            let size: usize = chunks.iter().map(Bytes::len).sum();
            calls.lock().unwrap().push(format!("build {}", request.tag));
            Ok(ProgressMessage::stream(format!("received {size} bytes\n")))
        })
        .boxed()
    }

    fn push_image(&self, image: &str, _credentials: RegistryCredentials) -> ProgressStream<'_> {
        self.record(format!("push {image}"));
        stream::empty().boxed()
    }

    async fn start_container(&self, request: RunRequest) -> Result<String> {
        self.record(format!("exec {}", request.image));
        Ok("c1".to_string())
    }

    fn container_logs(&self, _id: &str) -> BoxStream<'static, Result<LogLine>> {
        stream::empty().boxed()
    }

    async fn wait_container(&self, _id: &str) -> Result<i64> {
        Ok(0)
    }

    async fn remove_container(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}
