//! Error types for dbucks.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbucksError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Microphone access denied: {message}")]
    PermissionDenied { message: String },

    #[error("Audio device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    Capture { message: String },

    // Audio output and file errors
    #[error("Tone playback failed: {message}")]
    ToneOutput { message: String },

    #[error("WAV error: {message}")]
    Wav { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl DbucksError {
    /// Status line shown to the user when a session fails to start or dies.
    pub fn status_message(&self) -> String {
        match self {
            DbucksError::PermissionDenied { .. } => "Error: Microphone access denied".to_string(),
            DbucksError::DeviceNotFound { .. } => "Error: No microphone found".to_string(),
            DbucksError::Capture { message } => format!("Error: {}", message),
            other => format!("Error: {}", other),
        }
    }

    /// True for errors raised while acquiring or reading the capture device.
    pub fn is_capture_error(&self) -> bool {
        matches!(
            self,
            DbucksError::PermissionDenied { .. }
                | DbucksError::DeviceNotFound { .. }
                | DbucksError::Capture { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, DbucksError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_invalid_value_display() {
        let error = DbucksError::ConfigInvalidValue {
            key: "meter.smoothing_factor".to_string(),
            message: "must be between 0 and 1".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for meter.smoothing_factor: must be between 0 and 1"
        );
    }

    #[test]
    fn test_device_not_found_display() {
        let error = DbucksError::DeviceNotFound {
            device: "default".to_string(),
        };
        assert_eq!(error.to_string(), "Audio device not found: default");
    }

    #[test]
    fn test_status_message_permission_denied() {
        let error = DbucksError::PermissionDenied {
            message: "portal refused".to_string(),
        };
        assert_eq!(error.status_message(), "Error: Microphone access denied");
    }

    #[test]
    fn test_status_message_no_device() {
        let error = DbucksError::DeviceNotFound {
            device: "hw:0,0".to_string(),
        };
        assert_eq!(error.status_message(), "Error: No microphone found");
    }

    #[test]
    fn test_status_message_generic_capture() {
        let error = DbucksError::Capture {
            message: "stream config not supported".to_string(),
        };
        assert_eq!(error.status_message(), "Error: stream config not supported");
    }

    #[test]
    fn test_status_message_other_uses_display() {
        let error = DbucksError::Other("boom".to_string());
        assert_eq!(error.status_message(), "Error: boom");
    }

    #[test]
    fn test_is_capture_error() {
        assert!(
            DbucksError::PermissionDenied {
                message: String::new()
            }
            .is_capture_error()
        );
        assert!(
            DbucksError::Capture {
                message: String::new()
            }
            .is_capture_error()
        );
        assert!(
            !DbucksError::ToneOutput {
                message: String::new()
            }
            .is_capture_error()
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: DbucksError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: DbucksError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<DbucksError>();
        assert_sync::<DbucksError>();
    }
}
