//! Error types for the macadam toolkit
//!
//! Library-level failures that callers are expected to match on. Anything that
//! only needs to be reported to a human is wrapped in `anyhow` at the CLI
//! boundary instead.

use std::fmt;

use crate::classes;

/// Main error type for macadam operations
#[derive(Debug)]
pub enum Error {
    /// Road-class tag not present in the OSM highway vocabulary
    UnknownRoadClass {
        class: String,
        suggestion: Option<String>,
    },

    /// EPSG code outside the supported projection set
    UnsupportedCrs(u32),

    /// Invalid configuration or parameters
    InvalidInput(String),

    /// File I/O error
    IoError(std::io::Error),
}

impl Error {
    /// Build an `UnknownRoadClass` error, attaching a fuzzy-matched
    /// suggestion from the highway vocabulary when one is close enough.
    pub fn unknown_class(class: &str) -> Self {
        Error::UnknownRoadClass {
            class: class.to_string(),
            suggestion: classes::suggest_correction(class),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownRoadClass { class, suggestion } => match suggestion {
                Some(s) => {
                    write!(f, "Unknown road class '{class}' (did you mean '{s}'?)")
                }
                None => write!(f, "Unknown road class '{class}'"),
            },
            Error::UnsupportedCrs(code) => {
                write!(
                    f,
                    "Unsupported CRS 'epsg:{code}' (supported: 4326, 3857, UTM 326xx/327xx)"
                )
            }
            Error::InvalidInput(msg) => {
                write!(f, "Invalid input: {msg}")
            }
            Error::IoError(err) => {
                write!(f, "I/O error: {err}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

/// Convenience result type for macadam operations
pub type Result<T> = std::result::Result<T, Error>;
