//! Webhook delivery routing.

use cheops_core::{Error, Result, WebhookDelivery};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::Orchestrator;

/// What became of one webhook delivery.
#[derive(Debug)]
pub enum Trigger {
    /// The delivery could not be turned into a commit event.
    Rejected(Error),
    /// A valid event for a repository or branch that is not tracked.
    Ignored,
    /// A build was started on a background task.
    Dispatched(JoinHandle<Result<()>>),
}

/// Parse a delivery received at `provider`'s endpoint and start a build if it
/// matches a configured repository.
///
/// Never fails: rejections are logged and reported through [`Trigger`].
pub fn handle_delivery(
    orchestrator: &Arc<Orchestrator>,
    provider: &str,
    delivery: &WebhookDelivery,
) -> Trigger {
    let source = match orchestrator.providers().source(provider) {
        Ok(source) => source,
        Err(e) => {
            warn!(endpoint = %provider, error = %e, "Delivery for unknown provider");
            return Trigger::Rejected(e);
        }
    };

    let commit = match source.parse_webhook(delivery) {
        Ok(commit) => commit,
        Err(e) => {
            warn!(endpoint = %provider, error = %e, "Rejected webhook delivery");
            return Trigger::Rejected(e.into());
        }
    };

    let Some(repo) = orchestrator.match_repository(provider, &commit) else {
        debug!(
            endpoint = %provider,
            repository = %commit.repository,
            branch = %commit.branch,
            "No repository tracks this branch"
        );
        return Trigger::Ignored;
    };

    info!(
        endpoint = %provider,
        repository = %commit.repository,
        branch = %commit.branch,
        commit = %commit.id,
        "Dispatching build"
    );
    Trigger::Dispatched(orchestrator.dispatch(repo.clone(), commit))
}
