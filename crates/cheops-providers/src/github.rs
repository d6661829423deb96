//! GitHub source provider.

use async_trait::async_trait;
use cheops_core::{
    CommitEvent, Error, FactoryContext, ProviderConfig, Repository, Result, SourceProvider,
    WebhookDelivery, WebhookError,
};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use crate::git::{self, GitCloneSpec};

pub const PROVIDER_TYPE: &str = "github";

const DEFAULT_API_URL: &str = "https://api.github.com";
const REPO_URL_PREFIX: &str = "https://github.com/";
const EVENT_HEADER: &str = "X-GitHub-Event";
const HOOK_EXISTS_MESSAGE: &str = "Hook already exists on this repository";

/// GitHub API errors.
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<GitHubError> for Error {
    fn from(err: GitHubError) -> Self {
        Error::Provider(err.to_string())
    }
}

/// Outcome of a webhook registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookRegistration {
    Created,
    AlreadyExists,
}

/// GitHub REST API client.
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    access_token: String,
}

impl GitHubClient {
    pub fn with_api_url(access_token: String, api_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    /// Create a push webhook on `owner/repo`.
    ///
    /// GitHub answers 422 when an identical hook exists; that counts as
    /// registered.
    pub async fn create_push_webhook(
        &self,
        full_name: &str,
        hook_url: &str,
    ) -> std::result::Result<HookRegistration, GitHubError> {
        let url = format!("{}/repos/{}/hooks", self.api_url, full_name);

        let payload = serde_json::json!({
            "name": "web",
            "active": true,
            "events": ["push"],
            "config": {
                "url": hook_url,
                "content_type": "json",
                "insecure_ssl": "0"
            }
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("User-Agent", "Cheops-CI")
            .header("Accept", "application/vnd.github+json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| GitHubError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::CREATED {
            return Ok(HookRegistration::Created);
        }

        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY && hook_already_exists(&body) {
            return Ok(HookRegistration::AlreadyExists);
        }

        Err(GitHubError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ValidationErrors {
    #[serde(default)]
    errors: Vec<ValidationError>,
}

#[derive(Debug, Deserialize)]
struct ValidationError {
    #[serde(default)]
    message: Option<String>,
}

fn hook_already_exists(body: &str) -> bool {
    serde_json::from_str::<ValidationErrors>(body)
        .map(|parsed| {
            parsed
                .errors
                .iter()
                .any(|e| e.message.as_deref() == Some(HOOK_EXISTS_MESSAGE))
        })
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    head_commit: Option<HeadCommit>,
    repository: PayloadRepository,
}

#[derive(Debug, Deserialize)]
struct HeadCommit {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PayloadRepository {
    #[serde(default)]
    clone_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Parse a GitHub push delivery into a commit event.
pub fn parse_push_event(
    delivery: &WebhookDelivery,
) -> std::result::Result<CommitEvent, WebhookError> {
    let event = delivery
        .header(EVENT_HEADER)
        .ok_or_else(|| WebhookError::MissingHeader(EVENT_HEADER.to_string()))?;
    if event != "push" {
        return Err(WebhookError::UnexpectedEvent {
            expected: "push".to_string(),
            actual: event.to_string(),
        });
    }

    let payload: PushPayload = serde_json::from_slice(&delivery.body)
        .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

    let branch = payload
        .git_ref
        .strip_prefix("refs/heads/")
        .filter(|b| !b.is_empty())
        .ok_or_else(|| WebhookError::NotABranch(payload.git_ref.clone()))?;

    if payload.deleted {
        return Err(WebhookError::BranchDeleted(branch.to_string()));
    }

    let id = payload
        .head_commit
        .map(|c| c.id)
        .or(payload.after)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| WebhookError::MalformedPayload("no commit id".to_string()))?;

    let repository = payload
        .repository
        .clone_url
        .or(payload.repository.url)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| WebhookError::MalformedPayload("no repository URL".to_string()))?;

    Ok(CommitEvent {
        id,
        branch: branch.to_string(),
        repository,
    })
}

/// `owner/repo` from `https://github.com/owner/repo.git`.
fn full_name(url: &str) -> Result<&str> {
    let name = url
        .strip_prefix(REPO_URL_PREFIX)
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "repository URL {url:?} must start with {REPO_URL_PREFIX}"
            ))
        })?
        .strip_suffix(".git")
        .ok_or_else(|| Error::InvalidInput(format!("repository URL {url:?} must end with .git")))?;

    if name.split('/').filter(|part| !part.is_empty()).count() != 2 {
        return Err(Error::InvalidInput(format!(
            "repository URL {url:?} must name an owner and a repository"
        )));
    }
    Ok(name)
}

/// Source provider backed by GitHub.
pub struct GitHubProvider {
    name: String,
    token: String,
    hook_url: String,
    client: GitHubClient,
}

impl GitHubProvider {
    pub fn new(name: &str, token: &str, api_url: &str, webhook_url: &str) -> Self {
        Self {
            name: name.to_string(),
            token: token.to_string(),
            hook_url: format!("{}/{}", webhook_url.trim_end_matches('/'), name),
            client: GitHubClient::with_api_url(token.to_string(), api_url),
        }
    }

    pub fn from_config(config: &ProviderConfig, ctx: &FactoryContext) -> Result<Self> {
        debug!(provider = %config.name, "Initializing GitHub source provider");
        let token = config.required("token")?;
        let api_url = config.setting("api-url").unwrap_or(DEFAULT_API_URL);
        Ok(Self::new(&config.name, token, api_url, &ctx.webhook_url))
    }

    /// URL GitHub delivers push events to.
    pub fn hook_url(&self) -> &str {
        &self.hook_url
    }
}

#[async_trait]
impl SourceProvider for GitHubProvider {
    fn kind(&self) -> &'static str {
        PROVIDER_TYPE
    }

    async fn register_repo(&self, repo: &Repository) -> Result<()> {
        let full_name = full_name(&repo.url)?;

        debug!(
            repository = %repo.url,
            provider = %self.name,
            webhook = %self.hook_url,
            "Registering GitHub webhook"
        );

        match self
            .client
            .create_push_webhook(full_name, &self.hook_url)
            .await?
        {
            HookRegistration::Created => {
                info!(repository = %repo.url, provider = %self.name, "Webhook registered")
            }
            HookRegistration::AlreadyExists => {
                info!(repository = %repo.url, provider = %self.name, "Webhook already registered")
            }
        }
        Ok(())
    }

    async fn clone_commit(&self, commit: &CommitEvent, target_dir: &Path) -> Result<()> {
        let spec = GitCloneSpec {
            url: commit.repository.clone(),
            branch: commit.branch.clone(),
            sha: commit.id.clone(),
            access_token: Some(self.token.clone()),
        };
        git::clone_commit(&spec, target_dir).await?;
        Ok(())
    }

    fn parse_webhook(
        &self,
        delivery: &WebhookDelivery,
    ) -> std::result::Result<CommitEvent, WebhookError> {
        parse_push_event(delivery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn push_body(git_ref: &str) -> String {
        serde_json::json!({
            "ref": git_ref,
            "after": "abc123",
            "deleted": false,
            "head_commit": { "id": "abc123" },
            "repository": {
                "url": "https://github.com/org/app",
                "clone_url": "https://github.com/org/app.git"
            }
        })
        .to_string()
    }

    fn delivery(event: &str, body: String) -> WebhookDelivery {
        WebhookDelivery::new(body).with_header("x-github-event", event)
    }

    fn repo(url: &str) -> Repository {
        Repository {
            provider: "github".to_string(),
            url: url.to_string(),
            branch: "main".to_string(),
            secrets: HashMap::new(),
        }
    }

    #[test]
    fn test_parse_branch_push() {
        let event = parse_push_event(&delivery("push", push_body("refs/heads/main"))).unwrap();
        assert_eq!(
            event,
            CommitEvent {
                id: "abc123".to_string(),
                branch: "main".to_string(),
                repository: "https://github.com/org/app.git".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_branch_with_slashes() {
        let event =
            parse_push_event(&delivery("push", push_body("refs/heads/feature/x"))).unwrap();
        assert_eq!(event.branch, "feature/x");
    }

    #[test]
    fn test_tag_push_rejected() {
        let err = parse_push_event(&delivery("push", push_body("refs/tags/v1.0.0"))).unwrap_err();
        assert_eq!(err, WebhookError::NotABranch("refs/tags/v1.0.0".to_string()));
    }

    #[test]
    fn test_missing_event_header() {
        let err = parse_push_event(&WebhookDelivery::new(push_body("refs/heads/main"))).unwrap_err();
        assert!(matches!(err, WebhookError::MissingHeader(_)));
    }

    #[test]
    fn test_non_push_event() {
        let err = parse_push_event(&delivery("ping", "{}".to_string())).unwrap_err();
        assert_eq!(
            err,
            WebhookError::UnexpectedEvent {
                expected: "push".to_string(),
                actual: "ping".to_string(),
            }
        );
    }

    #[test]
    fn test_malformed_payload() {
        let err = parse_push_event(&delivery("push", "not json".to_string())).unwrap_err();
        assert!(matches!(err, WebhookError::MalformedPayload(_)));
    }

    #[test]
    fn test_deleted_branch_rejected() {
        let body = serde_json::json!({
            "ref": "refs/heads/old",
            "after": "0000000000000000000000000000000000000000",
            "deleted": true,
            "head_commit": null,
            "repository": { "clone_url": "https://github.com/org/app.git" }
        })
        .to_string();
        let err = parse_push_event(&delivery("push", body)).unwrap_err();
        assert_eq!(err, WebhookError::BranchDeleted("old".to_string()));
    }

    #[test]
    fn test_falls_back_to_after_and_url() {
        let body = serde_json::json!({
            "ref": "refs/heads/main",
            "after": "def456",
            "repository": { "url": "https://example.com/r.git" }
        })
        .to_string();
        let event = parse_push_event(&delivery("push", body)).unwrap();
        assert_eq!(event.id, "def456");
        assert_eq!(event.repository, "https://example.com/r.git");
    }

    #[test]
    fn test_full_name_validation() {
        assert_eq!(full_name("https://github.com/org/app.git").unwrap(), "org/app");
        assert!(full_name("https://gitlab.com/org/app.git").is_err());
        assert!(full_name("https://github.com/org/app").is_err());
        assert!(full_name("https://github.com/app.git").is_err());
    }

    #[test]
    fn test_hook_url() {
        let provider =
            GitHubProvider::new("gh", "tok", DEFAULT_API_URL, "https://ci.example.com/");
        assert_eq!(provider.hook_url(), "https://ci.example.com/gh");
    }

    #[tokio::test]
    async fn test_register_repo_created() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/org/app/hooks"))
            .and(header("Authorization", "Bearer tok"))
            .and(body_partial_json(serde_json::json!({
                "events": ["push"],
                "config": { "url": "https://ci.example.com/github" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let provider =
            GitHubProvider::new("github", "tok", &server.uri(), "https://ci.example.com");
        provider
            .register_repo(&repo("https://github.com/org/app.git"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_repo_hook_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/org/app/hooks"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "message": "Validation Failed",
                "errors": [{
                    "resource": "Hook",
                    "code": "custom",
                    "message": "Hook already exists on this repository"
                }]
            })))
            .mount(&server)
            .await;

        let provider =
            GitHubProvider::new("github", "tok", &server.uri(), "https://ci.example.com");
        provider
            .register_repo(&repo("https://github.com/org/app.git"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_repo_other_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/org/app/hooks"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "message": "Validation Failed",
                "errors": [{ "message": "Config url is not reachable" }]
            })))
            .mount(&server)
            .await;

        let provider =
            GitHubProvider::new("github", "tok", &server.uri(), "https://ci.example.com");
        let err = provider
            .register_repo(&repo("https://github.com/org/app.git"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(msg) if msg.contains("422")));
    }

    #[tokio::test]
    async fn test_register_repo_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
            .mount(&server)
            .await;

        let provider =
            GitHubProvider::new("github", "tok", &server.uri(), "https://ci.example.com");
        let err = provider
            .register_repo(&repo("https://github.com/org/app.git"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(msg) if msg.contains("Bad credentials")));
    }

    #[tokio::test]
    async fn test_register_repo_rejects_non_github_url() {
        let provider =
            GitHubProvider::new("github", "tok", DEFAULT_API_URL, "https://ci.example.com");
        let err = provider
            .register_repo(&repo("https://example.com/r.git"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_from_config_requires_token() {
        let config = ProviderConfig {
            name: "github".to_string(),
            kind: "github".to_string(),
            settings: HashMap::new(),
        };
        assert!(GitHubProvider::from_config(&config, &FactoryContext::default()).is_err());
    }
}
