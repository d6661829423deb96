//! Manifest template rendering.
//!
//! Supports expressions like:
//! - `{{ .Commit }}` - Commit SHA that triggered the build
//! - `{{ .Branch }}` - Branch name
//! - `{{ .Repository }}` - Repository clone URL
//! - `{{ .Secrets.NAME }}` - Secret value from the repository configuration
//! - `{{ index .Secrets "NAME" }}` - Same, for names that are not identifiers
//!
//! Anything that does not resolve is an error; nothing renders as empty.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use cheops_core::{CommitEvent, Repository};

use crate::TemplateError;

/// Values exposed to a manifest template.
#[derive(Clone, Default)]
pub struct TemplateContext {
    pub commit: String,
    pub branch: String,
    pub repository: String,
    pub secrets: HashMap<String, String>,
}

impl std::fmt::Debug for TemplateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateContext")
            .field("commit", &self.commit)
            .field("branch", &self.branch)
            .field("repository", &self.repository)
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

// `{{ ... }}` on a single line
static EXPR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^\n]*?)\}\}").expect("valid regex"));

static FIELD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.([A-Za-z_][A-Za-z0-9_]*)(?:\.([A-Za-z_][A-Za-z0-9_]*))?$").expect("valid regex")
});

static INDEX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^index\s+\.([A-Za-z_][A-Za-z0-9_]*)\s+"([^"]*)"$"#).expect("valid regex")
});

impl TemplateContext {
    pub fn new(repo: &Repository, commit: &CommitEvent) -> Self {
        Self {
            commit: commit.id.clone(),
            branch: commit.branch.clone(),
            repository: commit.repository.clone(),
            secrets: repo.secrets.clone(),
        }
    }

    /// Resolve the inside of one `{{ ... }}` expression.
    fn resolve(&self, expr: &str) -> Result<&str, TemplateError> {
        let expr = expr.trim();

        if let Some(caps) = FIELD_REGEX.captures(expr) {
            let field = &caps[1];
            return match (field, caps.get(2).map(|m| m.as_str())) {
                ("Commit", None) => Ok(self.commit.as_str()),
                ("Branch", None) => Ok(self.branch.as_str()),
                ("Repository", None) => Ok(self.repository.as_str()),
                ("Secrets", Some(name)) => self.secret(name),
                _ => Err(TemplateError::Unresolved(expr.to_string())),
            };
        }

        if let Some(caps) = INDEX_REGEX.captures(expr) {
            return match &caps[1] {
                "Secrets" => self.secret(caps.get(2).map_or("", |m| m.as_str())),
                _ => Err(TemplateError::Unresolved(expr.to_string())),
            };
        }

        Err(TemplateError::Malformed(format!("{{{{{expr}}}}}")))
    }

    fn secret(&self, name: &str) -> Result<&str, TemplateError> {
        self.secrets
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| TemplateError::Unresolved(format!(".Secrets.{name}")))
    }
}

/// Render a template, failing on the first expression that does not resolve.
pub fn render(input: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(input.len());
    let mut last = 0;

    for caps in EXPR_REGEX.captures_iter(input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        push_literal(&mut output, &input[last..whole.start()])?;
        output.push_str(ctx.resolve(&caps[1])?);
        last = whole.end();
    }
    push_literal(&mut output, &input[last..])?;

    Ok(output)
}

fn push_literal(output: &mut String, literal: &str) -> Result<(), TemplateError> {
    if let Some(pos) = literal.find("{{") {
        let snippet: String = literal[pos..].chars().take(40).collect();
        return Err(TemplateError::Malformed(format!("unclosed expression near {snippet:?}")));
    }
    output.push_str(literal);
    Ok(())
}
