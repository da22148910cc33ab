//! # Error Types Module
//!
//! Centralized error handling for the cardiosync pipeline. The streaming core
//! (ingress, canceller, conditioner, HRV engine, aggregator) is infallible at
//! its public boundary by design: invalid input is dropped and logged, never
//! propagated as a `Result` (see the error-handling policy this crate
//! implements). The one module that talks to the filesystem, `config`, still
//! needs a real error type.
//!
//! ## Why Custom Errors
//! - Type-safe error handling with match expressions.
//! - Error chaining via `source()` for debugging.
//! - No dependency on an error-boilerplate crate; this pipeline has exactly
//!   one fallible surface, so hand-rolling it is no heavier than pulling one in.

use std::fmt;

/// Errors that can occur while loading or saving a `PipelineConfig`.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFailed(std::io::Error),
    /// Failed to write the config file.
    WriteFailed(std::io::Error),
    /// Failed to parse the config file contents.
    ParseFailed(toml::de::Error),
    /// Failed to serialize the config for writing.
    SerializeFailed(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => write!(f, "failed to read config file: {e}"),
            ConfigError::WriteFailed(e) => write!(f, "failed to write config file: {e}"),
            ConfigError::ParseFailed(e) => write!(f, "failed to parse config file: {e}"),
            ConfigError::SerializeFailed(e) => write!(f, "failed to serialize config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_chain() {
        use std::error::Error;
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConfigError::ReadFailed(io_err);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("failed to read config file"));
    }
}
