//! Error types for the profile synchronization engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::profile::ParseError;

/// Primary error type for engine operations.
#[derive(Error, Debug)]
pub enum LgsError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Profiles directory not found: {path}")]
    ProfilesDirNotFound { path: PathBuf },

    #[error("No profiles directory configured for this platform")]
    NoProfilesDir,

    #[error("Watcher error: {0}")]
    Watch(String),

    #[error("Native event source error: {0}")]
    Adapter(String),

    #[error("Native event source disconnect timed out after {seconds}s")]
    AdapterDisconnectTimeout { seconds: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl LgsError {
    /// Returns a suggestion for how to fix the error, if one applies.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ProfilesDirNotFound { .. } => Some("Pass --dir with the LGS profiles directory"),
            Self::NoProfilesDir => {
                Some("This platform has no default profiles location; pass --dir")
            }
            Self::Adapter(_) | Self::AdapterDisconnectTimeout { .. } => {
                Some("The engine keeps running on filesystem heuristics without the native source")
            }
            _ => None,
        }
    }
}

/// Convenience type alias for Results using LgsError.
pub type Result<T> = std::result::Result<T, LgsError>;
