//! Error types for Cheops.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("webhook rejected: {0}")]
    Webhook(#[from] WebhookError),

    #[error("clone failed: {0}")]
    CloneFailed(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("image build failed: {0}")]
    BuildFailed(String),

    #[error("image push failed: {0}")]
    PushFailed(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("credentials unavailable: {0}")]
    Credentials(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("image daemon error: {0}")]
    Daemon(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Why a webhook delivery was not turned into a commit event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing header: {0}")]
    MissingHeader(String),

    #[error("unexpected event type {actual:?}, expected {expected:?}")]
    UnexpectedEvent { expected: String, actual: String },

    #[error("not a branch ref: {0}")]
    NotABranch(String),

    #[error("branch {0} was deleted")]
    BranchDeleted(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

pub type Result<T> = std::result::Result<T, Error>;
