//! Configuration parsing errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("duplicate definition: {0}")]
    Duplicate(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Manifest template rendering errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unresolved template variable: {0}")]
    Unresolved(String),

    #[error("malformed template expression: {0}")]
    Malformed(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl From<ConfigError> for cheops_core::Error {
    fn from(err: ConfigError) -> Self {
        cheops_core::Error::Manifest(err.to_string())
    }
}
