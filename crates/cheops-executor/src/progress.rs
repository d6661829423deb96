//! Consumption of the daemon's line-delimited progress output.

use cheops_core::{Error, ProgressMessage, ProgressStream, Result};
use futures::StreamExt;
use tracing::{debug, info};

/// Drain a build or push progress stream, logging each line.
///
/// A line carrying an error fails the operation through `on_failure`, even
/// though the daemon call itself succeeded. Transport errors are returned
/// unchanged.
pub async fn consume(
    mut stream: ProgressStream<'_>,
    subject: &str,
    on_failure: fn(String) -> Error,
) -> Result<()> {
    while let Some(message) = stream.next().await {
        let message = message?;
        if let Some(failure) = message.failure() {
            return Err(on_failure(format!("{subject}: {}", failure.trim())));
        }
        log_line(subject, &message);
    }
    Ok(())
}

fn log_line(subject: &str, message: &ProgressMessage) {
    if let Some(line) = message.stream.as_deref().map(str::trim_end) {
        if !line.is_empty() {
            info!(image = %subject, "{}", line);
        }
    }

    if let Some(status) = message.status.as_deref() {
        match (message.id.as_deref(), message.progress.as_deref()) {
            // per-layer transfer updates are noisy
            (Some(id), Some(progress)) => debug!(image = %subject, layer = %id, "{} {}", status, progress),
            (Some(id), None) => info!(image = %subject, layer = %id, "{}", status),
            (None, _) => info!(image = %subject, "{}", status),
        }
    }
}
