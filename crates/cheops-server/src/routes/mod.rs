//! HTTP routes.

pub mod health;
pub mod webhooks;

use crate::AppState;
use axum::Router;

/// Build the server router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(webhooks::router())
        .with_state(state)
}
