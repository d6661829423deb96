//! Image daemon trait and request types.
//!
//! The build engine and the action executor talk to the container runtime
//! only through [`ImageDaemon`], so tests can substitute an in-memory fake.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{RegistryCredentials, Result};

/// Tar-encoded build context, streamed into the daemon as it is produced.
pub type ContextStream = BoxStream<'static, Bytes>;

/// Line-delimited progress output of a build or push.
pub type ProgressStream<'a> = BoxStream<'a, Result<ProgressMessage>>;

/// Parameters of a single image build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    /// Tag applied to the built image.
    pub tag: String,
    /// Dockerfile path, relative to the build context root.
    pub dockerfile: String,
    /// Resolved build arguments.
    pub build_args: HashMap<String, String>,
}

/// Parameters of an ad-hoc container run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub image: String,
    pub command: Vec<String>,
}

/// One JSON line from the daemon's build or push output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        default,
        rename = "errorDetail",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_detail: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressMessage {
    pub fn stream(line: impl Into<String>) -> Self {
        Self {
            stream: Some(line.into()),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// The failure embedded in this line, if any.
    ///
    /// A line carrying `error` or `errorDetail.message` fails the whole
    /// operation even though the HTTP exchange itself succeeded.
    pub fn failure(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.error_detail.as_ref()?.message.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub stream: LogStream,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogStream::Stdout => f.write_str("stdout"),
            LogStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Trait for container image daemons.
#[async_trait]
pub trait ImageDaemon: Send + Sync {
    /// Build an image from a streamed tar context.
    fn build_image(&self, request: BuildRequest, context: ContextStream) -> ProgressStream<'_>;

    /// Push an image to its registry.
    fn push_image(&self, image: &str, credentials: RegistryCredentials) -> ProgressStream<'_>;

    /// Pull the image if needed, then create and start a container.
    /// Returns the container id.
    async fn start_container(&self, request: RunRequest) -> Result<String>;

    /// Follow a container's output until it exits.
    fn container_logs(&self, id: &str) -> BoxStream<'static, Result<LogLine>>;

    /// Wait for a container to exit and return its status code.
    async fn wait_container(&self, id: &str) -> Result<i64>;

    /// Remove a container, stopping it first if it is still running.
    async fn remove_container(&self, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_message_deserializes_daemon_line() {
        let msg: ProgressMessage =
            serde_json::from_str(r#"{"stream":"Step 1/2 : FROM alpine\n"}"#).unwrap();
        assert_eq!(msg.stream.as_deref(), Some("Step 1/2 : FROM alpine\n"));
        assert!(msg.failure().is_none());
    }

    #[test]
    fn test_progress_message_error_detail_is_failure() {
        let msg: ProgressMessage = serde_json::from_str(
            r#"{"errorDetail":{"code":1,"message":"returned a non-zero code: 1"}}"#,
        )
        .unwrap();
        assert_eq!(msg.failure(), Some("returned a non-zero code: 1"));
    }

    #[test]
    fn test_progress_message_error_field_wins() {
        let msg: ProgressMessage = serde_json::from_str(
            r#"{"error":"build failed","errorDetail":{"message":"detail"}}"#,
        )
        .unwrap();
        assert_eq!(msg.failure(), Some("build failed"));
    }

    #[test]
    fn test_log_stream_display() {
        assert_eq!(LogStream::Stdout.to_string(), "stdout");
        assert_eq!(LogStream::Stderr.to_string(), "stderr");
    }
}
