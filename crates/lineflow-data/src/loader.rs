//! Reads line definition files and builds validated lines from them.
//!
//! Provides format detection (RON/JSON/TOML) and deserialization helpers used
//! by [`load_line_file`] and [`build_line`].

use lineflow_core::config::ConfigError;
use lineflow_core::line::Line;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::schema::LineFile;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// The file parsed but describes an invalid line.
    #[error("invalid line definition in {file}: {source}")]
    Invalid {
        file: PathBuf,
        #[source]
        source: ConfigError,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Deserialize `content` in the given format. `file` is only used for error
/// reporting.
pub fn deserialize_str<T: DeserializeOwned>(
    content: &str,
    format: Format,
    file: &Path,
) -> Result<T, DataLoadError> {
    let parse_error = |detail: String| DataLoadError::Parse {
        file: file.to_path_buf(),
        detail,
    };
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string())),
    }
}

/// Read a file and deserialize it according to its format (detected from
/// extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    debug!(file = %path.display(), ?format, bytes = content.len(), "read data file");
    deserialize_str(&content, format, path)
}

// ===========================================================================
// Line loading
// ===========================================================================

/// Load and validate a line definition without building it.
pub fn load_line_file(path: &Path) -> Result<LineFile, DataLoadError> {
    let file: LineFile = deserialize_file(path)?;
    file.validate().map_err(|source| DataLoadError::Invalid {
        file: path.to_path_buf(),
        source,
    })?;
    info!(
        file = %path.display(),
        machines = file.machines.len(),
        seed = file.line.seed,
        "loaded line definition"
    );
    Ok(file)
}

/// Load a line definition and build a ready-to-run [`Line`].
pub fn build_line(path: &Path) -> Result<Line, DataLoadError> {
    let LineFile { line, machines } = load_line_file(path)?;
    Line::new(line, machines).map_err(|source| DataLoadError::Invalid {
        file: path.to_path_buf(),
        source,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
