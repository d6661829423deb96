//! Concrete providers for Cheops.
//!
//! - [`github`]: GitHub source provider (webhook registration, push parsing, clone)
//! - [`git`]: the git clone primitive used by source providers
//! - [`aws`]: ECR registry credentials via AWS token exchange

pub mod aws;
pub mod git;
pub mod github;

use cheops_core::{CredentialProvider, ProviderFactories, SourceProvider};
use futures::FutureExt;
use std::sync::Arc;

pub use aws::EcrCredentialProvider;
pub use github::GitHubProvider;

/// Factory table with every built-in provider type registered.
pub fn default_factories() -> ProviderFactories {
    let mut factories = ProviderFactories::new();

    factories.register_source(github::PROVIDER_TYPE, |config, ctx| {
        async move {
            let provider = GitHubProvider::from_config(&config, &ctx)?;
            Ok(Arc::new(provider) as Arc<dyn SourceProvider>)
        }
        .boxed()
    });

    factories.register_credentials(aws::PROVIDER_TYPE, |config, _ctx| {
        async move {
            let provider = EcrCredentialProvider::from_config(&config).await?;
            Ok(Arc::new(provider) as Arc<dyn CredentialProvider>)
        }
        .boxed()
    });

    factories
}
