//! Webhook server for Cheops.
//!
//! Exposes one POST endpoint per configured source provider and a health
//! endpoint. Deliveries are acknowledged before they are parsed.

pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
