//! Webhook endpoints, one per source provider.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use cheops_core::WebhookDelivery;
use cheops_scheduler::handle_delivery;
use tracing::{debug, info};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/{provider}", post(receive))
}

/// Acknowledge the delivery, then parse and route it in the background.
async fn receive(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    if !state.orchestrator.providers().has_source(&provider) {
        return Err(ApiError::NotFound(format!("no source provider named {provider:?}")));
    }

    let mut delivery = WebhookDelivery::new(body);
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            delivery.insert_header(name.as_str(), value);
        }
    }
    info!(endpoint = %provider, bytes = delivery.body.len(), "Received webhook");

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let trigger = handle_delivery(&orchestrator, &provider, &delivery);
        debug!(endpoint = %provider, ?trigger, "Delivery handled");
    });

    Ok(StatusCode::OK)
}
