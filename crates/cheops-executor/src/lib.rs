//! Build execution for Cheops.
//!
//! - [`engine`]: streams each container's build context into the image daemon
//! - [`actions`]: runs post-build push and exec actions in order
//! - [`docker`]: the bollard-backed [`ImageDaemon`](cheops_core::ImageDaemon)

pub mod actions;
pub mod archive;
pub mod docker;
pub mod engine;
pub mod progress;

pub use actions::ActionExecutor;
pub use docker::BollardDaemon;
pub use engine::ImageBuildEngine;
