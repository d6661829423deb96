//! Core domain types and traits for the Cheops CI engine.
//!
//! This crate contains:
//! - Build identifiers and the shared error type
//! - Repository configuration and normalized commit events
//! - The build manifest model (containers and actions)
//! - Source and credential provider traits, and the provider registry
//! - The image daemon trait used by the build engine and action executor

pub mod context;
pub mod credentials;
pub mod daemon;
pub mod error;
pub mod id;
pub mod manifest;
pub mod provider;
pub mod registry;
pub mod repository;

pub use context::BuildContext;
pub use credentials::RegistryCredentials;
pub use daemon::{
    BuildRequest, ContextStream, ImageDaemon, LogLine, LogStream, ProgressMessage, ProgressStream,
    RunRequest,
};
pub use error::{Error, Result, WebhookError};
pub use id::BuildId;
pub use manifest::{Action, ContainerSpec, Manifest};
pub use provider::{CredentialProvider, SourceProvider, WebhookDelivery};
pub use registry::{FactoryContext, ProviderConfig, ProviderFactories, ProviderRegistry};
pub use repository::{CommitEvent, Repository};
