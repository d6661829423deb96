//! Build orchestration for Cheops.
//!
//! Turns a webhook delivery into a running build: the delivery is parsed by
//! its source provider, matched against the configured repositories, and a
//! matching commit is resolved into a [`BuildContext`](cheops_core::BuildContext)
//! and executed on a background task with a deadline.

pub mod orchestrator;
pub mod resolver;
pub mod trigger;

#[cfg(test)]
mod testing;

pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use trigger::{Trigger, handle_delivery};
