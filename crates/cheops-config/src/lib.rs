//! KDL configuration parsing for Cheops.
//!
//! This crate handles parsing of:
//! - Server configuration (cheops.kdl)
//! - Build manifests (.cheops.kdl inside each repository)
//! - Manifest template rendering

pub mod error;
pub mod manifest;
mod node;
pub mod system;
pub mod template;

pub use error::{ConfigError, ConfigResult, TemplateError};
pub use manifest::{parse_manifest, render_manifest};
pub use system::{GeneralConfig, SystemConfig, load_system_config, parse_system_config};
pub use template::{TemplateContext, render};
