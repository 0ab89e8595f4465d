//! Common utilities for the macadam toolkit
//!
//! Shared error types and the OSM road-class vocabulary used by the
//! extraction and simplification crates.

pub mod classes;
pub mod error;

pub use error::{Error, Result};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_is_exported() {
        let err = Error::InvalidInput("test".to_string());
        assert_eq!(err.to_string(), "Invalid input: test");
    }
}
