//! Reading settings files into node trees.
//!
//! TOML and JSON are supported. The format is taken from the caller or
//! inferred from the extension (`.toml`, `.json`); anything else is an
//! [`UnknownFormat`](ConfigError::UnknownFormat) error. The document root
//! must be a table/object.
//!
//! TOML datetimes arrive as strings; the binder's time caster turns them
//! back into timestamps when a field asks for one.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;
use crate::node::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Parse `content` read from `path`. `path` only labels errors.
    pub fn parse(self, content: &str, path: &Path) -> Result<Node, ConfigError> {
        let parsed: Node = match self {
            Self::Toml => toml::from_str(content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?,
            Self::Json => serde_json::from_str(content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?,
        };

        if !parsed.is_mapping() {
            return Err(ConfigError::Parse {
                path: path.to_path_buf(),
                reason: format!("document root is a {}, not a mapping", parsed.kind_name()),
            });
        }
        Ok(parsed)
    }
}

fn resolve_format(path: &Path, format: Option<FileFormat>) -> Result<FileFormat, ConfigError> {
    format
        .or_else(|| FileFormat::from_path(path))
        .ok_or_else(|| ConfigError::UnknownFormat(path.to_path_buf()))
}

/// Load and parse the file at `path`.
pub fn load_file(path: &Path, format: Option<FileFormat>) -> Result<Node, ConfigError> {
    let format = resolve_format(path, format)?;
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let node = format.parse(&content, path)?;
    debug!(path = %path.display(), ?format, "loaded settings file");
    Ok(node)
}

/// Like [`load_file`], but a missing file yields `None`. Other I/O errors
/// are still returned.
pub fn load_optional_file(
    path: &Path,
    format: Option<FileFormat>,
) -> Result<Option<Node>, ConfigError> {
    match load_file(path, format) {
        Ok(node) => Ok(Some(node)),
        Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "settings file not found, skipping");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Load every existing file of `paths`, in order. Missing files are skipped.
pub fn load_files(paths: &[PathBuf]) -> Result<Vec<(PathBuf, Node)>, ConfigError> {
    let mut results = Vec::new();
    for path in paths {
        if let Some(node) = load_optional_file(path, None)? {
            results.push((path.clone(), node));
        }
    }
    Ok(results)
}
