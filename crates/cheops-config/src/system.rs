//! Server configuration parsing.

use cheops_core::{ProviderConfig, Repository};
use kdl::{KdlDocument, KdlNode};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::node::{
    get_all_string_args, get_first_scalar_arg, get_integer_arg, get_string_prop,
    require_string_arg,
};
use crate::{ConfigError, ConfigResult};

/// Environment variable whose contents, when non-empty, replace the
/// configuration file.
pub const CONFIG_ENV: &str = "CHEOPS_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "cheops.kdl";
pub const DEFAULT_MANIFEST_PATH: &str = ".cheops.kdl";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 3600;

/// Server routes a source provider's webhook endpoint would collide with.
pub const RESERVED_ENDPOINTS: &[&str] = &["health"];

/// Server-wide configuration.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub general: GeneralConfig,
    /// Source provider blocks, in declaration order.
    pub sources: Vec<ProviderConfig>,
    /// Credential provider blocks, in declaration order.
    pub credentials: Vec<ProviderConfig>,
    pub repositories: Vec<Repository>,
}

#[derive(Debug, Clone)]
pub struct GeneralConfig {
    pub bind_addr: SocketAddr,
    /// Public base URL, without a trailing slash.
    pub webhook_url: String,
    /// Manifest template location relative to the clone root.
    pub manifest_path: PathBuf,
    /// Parent directory for build workspaces; system temp dir if unset.
    pub workspace_dir: Option<PathBuf>,
    pub build_timeout: Duration,
}

/// Load the server configuration.
///
/// `CHEOPS_CONFIG`, when set and non-empty, is parsed instead of `path`.
pub fn load_system_config(path: &Path) -> ConfigResult<SystemConfig> {
    load_with_override(path, std::env::var(CONFIG_ENV).ok())
}

fn load_with_override(path: &Path, inline: Option<String>) -> ConfigResult<SystemConfig> {
    match inline.filter(|s| !s.trim().is_empty()) {
        Some(text) => {
            debug!("Loading configuration from {}", CONFIG_ENV);
            parse_system_config(&text)
        }
        None => {
            debug!(path = %path.display(), "Loading configuration file");
            let text = std::fs::read_to_string(path)?;
            parse_system_config(&text)
        }
    }
}

/// Parse server configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut general = None;
    let mut sources = Vec::new();
    let mut credentials = Vec::new();
    let mut repositories = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "general" => {
                if general.is_some() {
                    return Err(ConfigError::Duplicate("general block".to_string()));
                }
                general = Some(parse_general(node)?);
            }
            "source" => sources.push(parse_provider(node, "source")?),
            "credentials" => credentials.push(parse_provider(node, "credentials")?),
            "repository" => repositories.push(parse_repository(node)?),
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "configuration".to_string(),
                    message: format!("unknown block '{other}'"),
                });
            }
        }
    }

    let general = general.ok_or_else(|| ConfigError::MissingField("general".to_string()))?;

    check_unique(&sources, "source")?;
    check_unique(&credentials, "credentials")?;
    if let Some(source) = sources
        .iter()
        .find(|s| RESERVED_ENDPOINTS.contains(&s.name.as_str()))
    {
        return Err(ConfigError::InvalidValue {
            field: format!("source '{}'", source.name),
            message: "name is reserved for a server route".to_string(),
        });
    }

    let source_names: HashSet<&str> = sources.iter().map(|s| s.name.as_str()).collect();
    let mut seen = HashSet::new();
    for repo in &repositories {
        if !source_names.contains(repo.provider.as_str()) {
            return Err(ConfigError::InvalidReference(format!(
                "repository '{}' uses unknown source provider '{}'",
                repo.url, repo.provider
            )));
        }
        if !seen.insert((repo.url.as_str(), repo.branch.as_str())) {
            return Err(ConfigError::Duplicate(format!(
                "repository '{}' branch '{}'",
                repo.url, repo.branch
            )));
        }
    }

    Ok(SystemConfig {
        general,
        sources,
        credentials,
        repositories,
    })
}

fn parse_general(node: &KdlNode) -> ConfigResult<GeneralConfig> {
    let mut bind_addr = None;
    let mut webhook_url = None;
    let mut manifest_path = None;
    let mut workspace_dir = None;
    let mut build_timeout_secs = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "bind-addr" => bind_addr = Some(require_string_arg(child, "general.bind-addr")?),
                "webhook-url" => {
                    webhook_url = Some(require_string_arg(child, "general.webhook-url")?)
                }
                "manifest-path" => {
                    manifest_path = Some(require_string_arg(child, "general.manifest-path")?)
                }
                "workspace-dir" => {
                    workspace_dir = Some(require_string_arg(child, "general.workspace-dir")?)
                }
                "build-timeout-secs" => {
                    let secs = get_integer_arg(child, "general.build-timeout-secs")?;
                    let secs = u64::try_from(secs)
                        .ok()
                        .filter(|s| *s > 0)
                        .ok_or_else(|| ConfigError::InvalidValue {
                            field: "general.build-timeout-secs".to_string(),
                            message: "must be a positive number of seconds".to_string(),
                        })?;
                    build_timeout_secs = Some(secs);
                }
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: "general".to_string(),
                        message: format!("unknown setting '{other}'"),
                    });
                }
            }
        }
    }

    let bind_addr = bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let bind_addr = bind_addr
        .parse()
        .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
            field: "general.bind-addr".to_string(),
            message: e.to_string(),
        })?;

    let webhook_url = webhook_url
        .ok_or_else(|| ConfigError::MissingField("general.webhook-url".to_string()))?;
    if !webhook_url.starts_with("http://") && !webhook_url.starts_with("https://") {
        return Err(ConfigError::InvalidValue {
            field: "general.webhook-url".to_string(),
            message: format!("'{webhook_url}' is not an http(s) URL"),
        });
    }

    let manifest_path = PathBuf::from(
        manifest_path.unwrap_or_else(|| DEFAULT_MANIFEST_PATH.to_string()),
    );
    if manifest_path.is_absolute() {
        return Err(ConfigError::InvalidValue {
            field: "general.manifest-path".to_string(),
            message: "must be relative to the repository root".to_string(),
        });
    }

    Ok(GeneralConfig {
        bind_addr,
        webhook_url: webhook_url.trim_end_matches('/').to_string(),
        manifest_path,
        workspace_dir: workspace_dir.map(PathBuf::from),
        build_timeout: Duration::from_secs(
            build_timeout_secs.unwrap_or(DEFAULT_BUILD_TIMEOUT_SECS),
        ),
    })
}

fn parse_provider(node: &KdlNode, block: &str) -> ConfigResult<ProviderConfig> {
    let name = require_string_arg(node, &format!("{block} name"))?;
    let kind = get_string_prop(node, "type")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ConfigError::MissingField(format!("type for {block} '{name}'")))?;

    let mut settings = HashMap::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value().to_string();
            let value = get_first_scalar_arg(child).ok_or_else(|| ConfigError::InvalidValue {
                field: format!("{block} '{name}'"),
                message: format!("setting '{key}' has no value"),
            })?;
            if settings.insert(key.clone(), value).is_some() {
                return Err(ConfigError::Duplicate(format!(
                    "setting '{key}' in {block} '{name}'"
                )));
            }
        }
    }

    Ok(ProviderConfig {
        name,
        kind,
        settings,
    })
}

fn parse_repository(node: &KdlNode) -> ConfigResult<Repository> {
    let url = require_string_arg(node, "repository URL")?;
    let provider = get_string_prop(node, "provider")
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ConfigError::MissingField(format!("provider for repository '{url}'")))?;
    let branch = get_string_prop(node, "branch")
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ConfigError::MissingField(format!("branch for repository '{url}'")))?;

    let mut secrets = HashMap::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "secret" => {
                    let field = format!("repository '{url}'");
                    let args = get_all_string_args(child, &field)?;
                    let [key, value] = args.as_slice() else {
                        return Err(ConfigError::InvalidValue {
                            field,
                            message: "secret takes a name and a value".to_string(),
                        });
                    };
                    if secrets.insert(key.clone(), value.clone()).is_some() {
                        return Err(ConfigError::Duplicate(format!(
                            "secret '{key}' in repository '{url}'"
                        )));
                    }
                }
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: format!("repository '{url}'"),
                        message: format!("unknown setting '{other}'"),
                    });
                }
            }
        }
    }

    Ok(Repository {
        provider,
        url,
        branch,
        secrets,
    })
}

fn check_unique(providers: &[ProviderConfig], block: &str) -> ConfigResult<()> {
    let mut names = HashSet::new();
    for provider in providers {
        if !names.insert(provider.name.as_str()) {
            return Err(ConfigError::Duplicate(format!(
                "{block} provider '{}'",
                provider.name
            )));
        }
    }
    Ok(())
}
