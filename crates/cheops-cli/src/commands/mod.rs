//! CLI command implementations.

pub mod build;
pub mod validate;

/// Parse a `KEY=VALUE` argument.
pub fn parse_key_val(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {arg:?}")),
    }
}
