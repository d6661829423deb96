//! Tracked repositories and the commit events that trigger their builds.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A repository Cheops builds, as declared in the server configuration.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Repository {
    /// Name of the source provider that hosts this repository.
    pub provider: String,
    /// Clone URL, compared verbatim against incoming commit events.
    pub url: String,
    /// The only branch whose pushes are built.
    pub branch: String,
    /// Values exposed to manifest templates as `.Secrets`.
    pub secrets: HashMap<String, String>,
}

impl Repository {
    /// Whether a commit event targets this repository's tracked branch.
    pub fn matches(&self, commit: &CommitEvent) -> bool {
        self.url == commit.repository && self.branch == commit.branch
    }
}

// Secrets stay out of Debug output so a stray `?repo` never leaks them.
impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut secret_names: Vec<&str> = self.secrets.keys().map(String::as_str).collect();
        secret_names.sort_unstable();
        f.debug_struct("Repository")
            .field("provider", &self.provider)
            .field("url", &self.url)
            .field("branch", &self.branch)
            .field("secrets", &secret_names)
            .finish()
    }
}

/// Normalized push notification produced by a source provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    /// Commit SHA that was pushed.
    pub id: String,
    /// Branch name without the `refs/heads/` prefix.
    pub branch: String,
    /// Canonical clone URL of the repository.
    pub repository: String,
}

impl CommitEvent {
    /// First seven characters of the commit SHA.
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(7)
            .map(|(idx, _)| idx)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}
