//! Error handling primitives shared across the core.
//!
//! Every failure carries enough context (version, sample size, feature, path)
//! for the caller to act on it, and maps onto a stable [`ErrorKind`] code so
//! callers can branch on the kind without matching message text.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Stable error codes that callers may persist or branch on.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Malformed bundle, sample or request.
    Validation = 1,
    /// Version collision with differing content.
    DuplicateVersion = 2,
    /// Operation referenced an unregistered version or artefact.
    NotFound = 3,
    /// Drift computation on too small a sample.
    InsufficientData = 4,
    /// Champion read before any promotion.
    NoChampion = 5,
    /// Filesystem failure.
    Io = 6,
    /// Document could not be encoded or decoded.
    Serialization = 7,
    /// Configuration could not be loaded or failed validation.
    Config = 8,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::DuplicateVersion => "duplicate_version",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientData => "insufficient_data",
            ErrorKind::NoChampion => "no_champion",
            ErrorKind::Io => "io",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Config => "config",
        }
    }
}

/// Canonical error type for the core.
#[derive(Debug, Error)]
pub enum GovError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("version {version} already registered with hash {existing}, refusing content with hash {incoming}")]
    DuplicateVersion {
        version: String,
        existing: String,
        incoming: String,
    },

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("insufficient data{}: {rows} rows, need at least {required}", feature_suffix(.feature))]
    InsufficientData {
        rows: usize,
        required: usize,
        feature: Option<String>,
    },

    #[error("no champion has been promoted yet")]
    NoChampion,

    #[error("io error during {step} on {}: {source}", .path.display())]
    Io {
        step: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not encode or decode {}: {source}", .path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

fn feature_suffix(feature: &Option<String>) -> String {
    match feature {
        Some(name) => format!(" for feature `{name}`"),
        None => String::new(),
    }
}

/// Result alias used throughout the crate.
pub type GovResult<T> = Result<T, GovError>;

impl GovError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GovError::Validation(_) => ErrorKind::Validation,
            GovError::DuplicateVersion { .. } => ErrorKind::DuplicateVersion,
            GovError::NotFound { .. } => ErrorKind::NotFound,
            GovError::InsufficientData { .. } => ErrorKind::InsufficientData,
            GovError::NoChampion => ErrorKind::NoChampion,
            GovError::Io { .. } => ErrorKind::Io,
            GovError::Serialization { .. } => ErrorKind::Serialization,
            GovError::Config(_) => ErrorKind::Config,
        }
    }

    /// Validation helper.
    pub fn invalid(msg: impl Into<String>) -> Self {
        GovError::Validation(msg.into())
    }

    /// Unregistered model version.
    pub fn version_not_found(version: impl Into<String>) -> Self {
        GovError::NotFound {
            what: "version",
            id: version.into(),
        }
    }

    /// Sample too small to say anything about its distribution.
    pub fn insufficient(rows: usize, required: usize) -> Self {
        GovError::InsufficientData {
            rows,
            required,
            feature: None,
        }
    }

    /// IO helper that keeps the failing step and path.
    pub fn io(step: &'static str, path: &Path, source: io::Error) -> Self {
        GovError::Io {
            step,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn serde(path: &Path, source: serde_json::Error) -> Self {
        GovError::Serialization {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<config::ConfigError> for GovError {
    fn from(err: config::ConfigError) -> Self {
        GovError::Config(err.to_string())
    }
}
