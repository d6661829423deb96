//! Build manifest model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Containers to build and actions to run for one commit, in declared order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub containers: Vec<ContainerSpec>,
    pub actions: Vec<Action>,
}

impl Manifest {
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.actions.is_empty()
    }
}

/// One image to build from a subdirectory of the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Tag applied to the built image.
    pub tag: String,
    /// Build context directory, relative to the workspace root.
    #[serde(default = "default_context")]
    pub context: String,
    /// Dockerfile path, relative to the build context.
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    /// Build arguments. A `None` value is taken from the process
    /// environment at build time.
    #[serde(default)]
    pub build_args: BTreeMap<String, Option<String>>,
}

fn default_context() -> String {
    ".".to_string()
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

impl ContainerSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            context: default_context(),
            dockerfile: default_dockerfile(),
            build_args: BTreeMap::new(),
        }
    }
}

/// A post-build step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Action {
    /// Publish an image using credentials from a named provider.
    Push { image: String, provider: String },
    /// Run a container and execute shell commands in it.
    Exec { image: String, commands: Vec<String> },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Push { .. } => "push",
            Action::Exec { .. } => "exec",
        }
    }

    pub fn image(&self) -> &str {
        match self {
            Action::Push { image, .. } | Action::Exec { image, .. } => image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_spec_defaults() {
        let spec = ContainerSpec::new("app:latest");
        assert_eq!(spec.context, ".");
        assert_eq!(spec.dockerfile, "Dockerfile");
        assert!(spec.build_args.is_empty());
    }

    #[test]
    fn test_action_kind() {
        let push = Action::Push {
            image: "app".to_string(),
            provider: "ecr".to_string(),
        };
        let exec = Action::Exec {
            image: "alpine".to_string(),
            commands: vec!["true".to_string()],
        };
        assert_eq!(push.kind(), "push");
        assert_eq!(exec.kind(), "exec");
        assert_eq!(exec.image(), "alpine");
    }

    #[test]
    fn test_empty_manifest() {
        assert!(Manifest::default().is_empty());
    }
}
