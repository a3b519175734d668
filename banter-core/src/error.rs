//! Engine error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while initialising or driving the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed settings, unknown tokens, bad locale
    #[error("configuration error: {0}")]
    Config(String),

    /// Module library path is empty or missing
    #[error("module library has no path")]
    EmptyLibraryPath,

    /// API version mismatch between the engine and a module
    #[error("API version mismatch: engine expects {expected}, module has {found}")]
    ApiVersionMismatch { expected: u32, found: u32 },

    /// Failed to load a module library
    #[error("failed to load module library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// No usable module libraries were found in the plugin directory
    #[error("no usable plugin libraries loaded from {path}")]
    NoPluginsLoaded { path: PathBuf },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_display() {
        let err = EngineError::Config("unknown key `gender`".to_string());
        assert!(err.to_string().contains("unknown key"));
    }

    #[test]
    fn test_api_version_mismatch_display() {
        let err = EngineError::ApiVersionMismatch {
            expected: 1,
            found: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains('1'));
        assert!(msg.contains('2'));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EngineError = io_err.into();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
