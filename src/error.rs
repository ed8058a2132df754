use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Classified failures surfaced to collaborators.
///
/// Parse and network failures are isolated per item by the loader and
/// version checker; filesystem failures inside a staging transition
/// propagate to the caller after the reload trigger has fired.
#[derive(Debug, Error)]
pub enum ModError {
    /// Bad input from the caller; nothing was mutated.
    #[error("{0}")]
    Validation(String),

    /// A required file was not found where it had to be.
    #[error("{what} not found in {path:?}")]
    NotFound { what: String, path: PathBuf },

    /// A disk operation failed. Names the failed step and path.
    #[error("{op} failed for {path:?}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A version-check fetch failed.
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    /// A manifest or version file could not be parsed.
    #[error("could not parse {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl ModError {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        ModError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn not_found(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        ModError::NotFound {
            what: what.into(),
            path: path.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModError>;
