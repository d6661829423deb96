//! Local manifest validation.

use anyhow::{Context, Result};
use cheops_config::{TemplateContext, render_manifest};
use cheops_core::{Action, Manifest};
use std::path::Path;

/// Render the template at `path` with the given values and print its contents.
pub fn run(
    path: &Path,
    commit: String,
    branch: String,
    repository: String,
    secrets: Vec<(String, String)>,
) -> Result<()> {
    let template = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;

    let ctx = TemplateContext {
        commit,
        branch,
        repository,
        secrets: secrets.into_iter().collect(),
    };
    let manifest = render_manifest(&template, &ctx)
        .with_context(|| format!("Invalid manifest: {}", path.display()))?;

    println!("Manifest is valid");
    for line in summarize(&manifest) {
        println!("  {line}");
    }
    Ok(())
}

fn summarize(manifest: &Manifest) -> Vec<String> {
    if manifest.is_empty() {
        return vec!["(nothing to build)".to_string()];
    }

    let containers = manifest.containers.iter().map(|c| {
        let mut line = format!("container {} (context {}, dockerfile {})", c.tag, c.context, c.dockerfile);
        if !c.build_args.is_empty() {
            let names: Vec<&str> = c.build_args.keys().map(String::as_str).collect();
            line.push_str(&format!(", args {}", names.join(" ")));
        }
        line
    });

    let actions = manifest.actions.iter().map(|action| match action {
        Action::Push { image, provider } => format!("push {image} via {provider}"),
        Action::Exec { image, commands } => format!("exec {image}: {}", commands.join("; ")),
    });

    containers.chain(actions).collect()
}
