use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Shape errors raised by [`PathMap`](crate::PathMap) conversions.
#[derive(Debug, Error)]
pub enum PathMapError {
    #[error("value at '{path}' is not a mapping but a {found}")]
    NotAMapping { path: String, found: &'static str },

    #[error("value at '{path}' is not a sequence but a {found}")]
    NotASequence { path: String, found: &'static str },

    #[error("can not append to '{path}': existing value is a {found}")]
    AppendOntoNonSequence { path: String, found: &'static str },
}

/// Failures while moving values between a [`PathMap`](crate::PathMap) and a
/// typed record.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("can not cast {found} value '{value}' at '{path}' into {expected}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
        value: String,
    },

    #[error("value at '{path}' should be a {expected} but is a {found}")]
    Shape {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("caster could not convert value at '{path}': {reason}")]
    Caster { path: String, reason: String },

    #[error("can not decode value at '{path}': {source}")]
    Decode {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("invalid default '{default}' for field {field}: {source}")]
    InvalidDefault {
        field: String,
        default: String,
        source: Box<BindError>,
    },
}

/// A single violated validation rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub path: String,
    pub rule: String,
    pub value: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the setting {} with value {} does not match its requirement {}",
            self.field, self.value, self.rule
        )
    }
}

/// Every violation found while validating one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s) occurred:", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n\t* {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Coarse classification of a [`ConfigError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    MissingKey,
    TypeMismatch,
    Shape,
    Validation,
    Construction,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("there is no config setting or default for key '{0}'")]
    MissingKey(String),

    #[error("can not cast value of key '{key}' into {expected}: {reason}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        reason: String,
    },

    #[error("can not bind key '{key}': {source}")]
    Bind { key: String, source: BindError },

    #[error(transparent)]
    PathMap(#[from] PathMapError),

    #[error("validation failed for key '{key}': {source}")]
    Validation {
        key: String,
        source: ValidationErrors,
    },

    #[error("can not expand placeholder '{{{placeholder}}}' in '{value}': {source}")]
    Placeholder {
        placeholder: String,
        value: String,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("placeholder '{{{placeholder}}}' in '{value}' nests deeper than {limit} levels")]
    PlaceholderDepth {
        placeholder: String,
        value: String,
        limit: usize,
    },

    #[error("can not convert value into a config node: {0}")]
    Serialize(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("can not tell the config format of {0}; use a .toml or .json file")]
    UnknownFormat(PathBuf),

    #[error("can not apply config option: {0}")]
    Option(String),

    #[error("app identity: {0}")]
    Identity(String),
}

impl ConfigError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ConfigError::MissingKey(_) => ErrorCategory::MissingKey,
            ConfigError::Placeholder { source, .. } => source.category(),
            ConfigError::PlaceholderDepth { .. } => ErrorCategory::Shape,
            ConfigError::TypeMismatch { .. } | ConfigError::Serialize(_) => {
                ErrorCategory::TypeMismatch
            }
            ConfigError::Bind { source, .. } => match source {
                BindError::Shape { .. } => ErrorCategory::Shape,
                _ => ErrorCategory::TypeMismatch,
            },
            ConfigError::PathMap(_) => ErrorCategory::Shape,
            ConfigError::Validation { .. } => ErrorCategory::Validation,
            ConfigError::Io { .. }
            | ConfigError::Parse { .. }
            | ConfigError::UnknownFormat(_)
            | ConfigError::Option(_)
            | ConfigError::Identity(_) => ErrorCategory::Construction,
        }
    }
}
