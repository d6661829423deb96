//! Source and credential provider traits.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;

use crate::{CommitEvent, RegistryCredentials, Repository, Result, WebhookError};

/// Raw webhook request as received on a provider endpoint.
#[derive(Debug, Clone, Default)]
pub struct WebhookDelivery {
    /// Header values keyed by lowercase header name.
    headers: HashMap<String, Vec<String>>,
    pub body: Bytes,
}

impl WebhookDelivery {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// A source-hosting backend: clones repositories, registers webhooks and
/// parses push notifications.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Provider type, e.g. `"github"`.
    fn kind(&self) -> &'static str;

    /// Ensure the backend delivers push events for `repo` to this process.
    /// Succeeds if the webhook is already registered.
    async fn register_repo(&self, repo: &Repository) -> Result<()>;

    /// Materialize the repository at exactly `commit.id` inside `target_dir`.
    async fn clone_commit(&self, commit: &CommitEvent, target_dir: &Path) -> Result<()>;

    /// Turn a raw delivery into a commit event.
    fn parse_webhook(
        &self,
        delivery: &WebhookDelivery,
    ) -> std::result::Result<CommitEvent, WebhookError>;
}

/// A registry credential backend.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Provider type, e.g. `"aws"`.
    fn kind(&self) -> &'static str;

    /// Fetch credentials suitable for the image daemon's push API.
    async fn get_credentials(&self) -> Result<RegistryCredentials>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let delivery = WebhookDelivery::new("{}").with_header("X-GitHub-Event", "push");
        assert_eq!(delivery.header("x-github-event"), Some("push"));
        assert_eq!(delivery.header("X-GITHUB-EVENT"), Some("push"));
        assert_eq!(delivery.header("X-GitHub-Delivery"), None);
    }

    #[test]
    fn test_header_returns_first_value() {
        let mut delivery = WebhookDelivery::new("");
        delivery.insert_header("Accept", "a");
        delivery.insert_header("accept", "b");
        assert_eq!(delivery.header("Accept"), Some("a"));
    }
}
