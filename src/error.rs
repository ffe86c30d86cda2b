//! Error types for mapmerge
//!
//! All modules use `MapmergeResult<T>` as their return type.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for mapmerge operations
pub type MapmergeResult<T> = Result<T, MapmergeError>;

/// All errors that can occur in mapmerge
#[derive(Error, Debug)]
pub enum MapmergeError {
    // Validation errors
    #[error("Illegal map hash '{0}'.")]
    InvalidKey(String),

    #[error("Must supply at least two map file hashes.")]
    TooFewKeys,

    #[error("Unknown map.")]
    UnknownInput(PathBuf),

    #[error("Invalid render option {name}: {reason}")]
    InvalidOption { name: String, reason: String },

    #[error("No map file in request.")]
    MissingUpload,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Merge errors
    #[error("Failed to merge {top} into {base}: {source}")]
    Merge {
        base: PathBuf,
        top: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    // Render errors
    #[error("Renderer exited with code {code}: {output}")]
    Render { code: i32, output: String },

    #[error("Renderer did not finish within {secs}s")]
    RenderTimeout { secs: u64 },

    // Computation outcome shared between every caller of one key
    #[error(transparent)]
    Shared(#[from] Arc<MapmergeError>),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MapmergeError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Follow shared outcomes down to the error that was actually raised
    pub fn root(&self) -> &MapmergeError {
        match self {
            Self::Shared(inner) => inner.root(),
            other => other,
        }
    }

    /// Whether the error was caused by the request rather than by execution
    ///
    /// Validation errors never touch the cache, so their message is safe to
    /// hand back to a client.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.root(),
            Self::InvalidKey(_)
                | Self::TooFewKeys
                | Self::UnknownInput(_)
                | Self::InvalidOption { .. }
                | Self::MissingUpload
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::UnknownInput(_) => Some("Upload the map first via POST /maps/upload.json"),
            Self::CommandFailed { .. } => Some("Install minetestmapper or set render.program in the config"),
            Self::RenderTimeout { .. } => Some("Raise render.timeout_secs in the config"),
            _ => None,
        }
    }
}
