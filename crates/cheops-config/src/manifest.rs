//! Build manifest parsing.

use cheops_core::{Action, ContainerSpec, Manifest};
use kdl::{KdlDocument, KdlNode};
use std::collections::BTreeMap;
use std::path::{Component, Path};

use crate::node::{get_all_string_args, get_string_prop, require_string_arg};
use crate::template::{TemplateContext, render};
use crate::{ConfigError, ConfigResult};

/// Applied to every string value the manifest reads.
type Render<'a> = &'a dyn Fn(String) -> ConfigResult<String>;

/// Parse a manifest template and render each of its string values.
///
/// Rendering happens after parsing, so substituted values are taken
/// verbatim and never reinterpreted as KDL. The rendered values may
/// contain secrets and are never logged.
pub fn render_manifest(template: &str, ctx: &TemplateContext) -> ConfigResult<Manifest> {
    let doc: KdlDocument = template.parse()?;
    build_manifest(&doc, &|value| Ok(render(&value, ctx)?))
}

/// Parse a build manifest from KDL text.
pub fn parse_manifest(kdl: &str) -> ConfigResult<Manifest> {
    let doc: KdlDocument = kdl.parse()?;
    build_manifest(&doc, &|value| Ok(value))
}

fn build_manifest(doc: &KdlDocument, render: Render<'_>) -> ConfigResult<Manifest> {
    let mut containers = Vec::new();
    let mut actions = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "container" => containers.push(parse_container(node, render)?),
            "push" => actions.push(parse_push(node, render)?),
            "exec" => actions.push(parse_exec(node, render)?),
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "manifest".to_string(),
                    message: format!("unknown kind '{other}'"),
                });
            }
        }
    }

    Ok(Manifest {
        containers,
        actions,
    })
}

fn parse_container(node: &KdlNode, render: Render<'_>) -> ConfigResult<ContainerSpec> {
    let tag = render(require_string_arg(node, "container tag")?)?;

    let mut spec = ContainerSpec::new(tag);
    if let Some(context) = get_string_prop(node, "context").map(render).transpose()? {
        validate_context(&spec.tag, &context)?;
        spec.context = context;
    }
    if let Some(dockerfile) = get_string_prop(node, "dockerfile").map(render).transpose()? {
        spec.dockerfile = dockerfile;
    }

    let mut build_args = BTreeMap::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "arg" => {
                    let field = format!("build arg in '{}'", spec.tag);
                    let args = get_all_string_args(child, &field)?;
                    let (name, value) = match args.as_slice() {
                        [name] => (name.clone(), None),
                        [name, value] => (name.clone(), Some(render(value.clone())?)),
                        [] => return Err(ConfigError::MissingField(field)),
                        _ => {
                            return Err(ConfigError::InvalidValue {
                                field,
                                message: "arg takes a name and an optional value".to_string(),
                            });
                        }
                    };
                    if name.is_empty() {
                        return Err(ConfigError::MissingField(field));
                    }
                    if build_args.contains_key(&name) {
                        return Err(ConfigError::Duplicate(format!(
                            "build arg '{}' in '{}'",
                            name, spec.tag
                        )));
                    }
                    build_args.insert(name, value);
                }
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: format!("container '{}'", spec.tag),
                        message: format!("unknown setting '{other}'"),
                    });
                }
            }
        }
    }
    spec.build_args = build_args;

    Ok(spec)
}

fn validate_context(tag: &str, context: &str) -> ConfigResult<()> {
    let path = Path::new(context);
    let escapes = path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));

    if context.is_empty() || escapes {
        return Err(ConfigError::InvalidValue {
            field: format!("context of '{tag}'"),
            message: format!("'{context}' must be a relative path inside the repository"),
        });
    }
    Ok(())
}

fn parse_push(node: &KdlNode, render: Render<'_>) -> ConfigResult<Action> {
    let image = render(require_string_arg(node, "push image")?)?;
    let provider = get_string_prop(node, "provider")
        .map(render)
        .transpose()?
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ConfigError::MissingField(format!("provider for push '{image}'")))?;

    Ok(Action::Push { image, provider })
}

fn parse_exec(node: &KdlNode, render: Render<'_>) -> ConfigResult<Action> {
    let image = render(require_string_arg(node, "exec image")?)?;

    let mut commands = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "run" => {
                    let field = format!("run in exec '{image}'");
                    let args = get_all_string_args(child, &field)?;
                    let [command] = args.as_slice() else {
                        return Err(ConfigError::InvalidValue {
                            field,
                            message: "run takes exactly one command string".to_string(),
                        });
                    };
                    commands.push(render(command.clone())?);
                }
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: format!("exec '{image}'"),
                        message: format!("unknown setting '{other}'"),
                    });
                }
            }
        }
    }

    if commands.is_empty() {
        return Err(ConfigError::MissingField(format!(
            "run commands for exec '{image}'"
        )));
    }

    Ok(Action::Exec { image, commands })
}
