// Helpers for extracting values from KDL nodes.

use kdl::{KdlNode, KdlValue};

use crate::{ConfigError, ConfigResult};

pub(crate) fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Every positional argument; any that is not a string is an error.
pub(crate) fn get_all_string_args(node: &KdlNode, field: &str) -> ConfigResult<Vec<String>> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| {
            e.value()
                .as_string()
                .map(str::to_string)
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!(
                        "'{}' argument {} must be a string",
                        node.name().value(),
                        e.value()
                    ),
                })
        })
        .collect()
}

pub(crate) fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

/// First positional argument rendered as text, whatever its KDL type.
pub(crate) fn get_first_scalar_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| scalar_to_string(e.value()))
}

pub(crate) fn get_integer_arg(node: &KdlNode, field: &str) -> ConfigResult<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected an integer".to_string(),
        })
}

fn scalar_to_string(value: &KdlValue) -> Option<String> {
    value
        .as_string()
        .map(str::to_string)
        .or_else(|| value.as_integer().map(|i| i.to_string()))
        .or_else(|| value.as_bool().map(|b| b.to_string()))
}

pub(crate) fn require_string_arg(node: &KdlNode, what: &str) -> ConfigResult<String> {
    get_first_string_arg(node)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingField(what.to_string()))
}
