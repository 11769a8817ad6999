//! Document loading
//!
//! Grid state and request files are YAML or JSON, chosen by extension.
//! Files without a recognised extension are read as YAML, which also
//! accepts JSON.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// On-disk document encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }
}

/// Read and deserialize a YAML or JSON document
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!("cannot read '{}': {}", path.display(), e))
    })?;
    debug!("Loaded {} bytes from {}", text.len(), path.display());

    match DocumentFormat::from_path(path) {
        DocumentFormat::Json => Ok(serde_json::from_str(&text)?),
        DocumentFormat::Yaml => Ok(serde_yaml::from_str(&text)?),
    }
}

/// Serialize a document in the format implied by `path` and write it
pub fn save_document<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = match DocumentFormat::from_path(path) {
        DocumentFormat::Json => serde_json::to_string_pretty(value)?,
        DocumentFormat::Yaml => serde_yaml::to_string(value)?,
    };
    std::fs::write(path, text)?;
    debug!("Wrote {}", path.display());
    Ok(())
}
