//! Error types for module authors

use thiserror::Error;

/// Errors a module can return from its lifecycle hooks
#[derive(Error, Debug)]
pub enum ModuleError {
    /// Module configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A registration call the module depends on was refused
    #[error("Registration failed: {0}")]
    Registration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Custom error with message
    #[error("{0}")]
    Custom(String),
}

impl ModuleError {
    /// Create a custom error with a message
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    /// Create a registration error
    pub fn registration(message: impl Into<String>) -> Self {
        Self::Registration(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let config_err = ModuleError::Config("missing key".to_string());
        assert_eq!(config_err.to_string(), "Configuration error: missing key");

        let reg_err = ModuleError::registration("duplicate name");
        assert_eq!(reg_err.to_string(), "Registration failed: duplicate name");

        let custom_err = ModuleError::custom("something happened");
        assert_eq!(custom_err.to_string(), "something happened");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let module_err: ModuleError = io_err.into();

        assert!(matches!(module_err, ModuleError::Io(_)));
        assert!(module_err.to_string().contains("file not found"));
    }
}
