//! Error types for multichat.

use thiserror::Error;

/// Common error type for multichat.
///
/// Bad command arguments and authorization denials are never represented
/// here; the command engine answers those with response text.
#[derive(Error, Debug)]
pub enum MultichatError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// External session transport error.
    #[error("session error: {0}")]
    Session(String),

    /// The room hub has stopped and no longer accepts events.
    #[error("room is closed")]
    RoomClosed,
}

impl From<toml::de::Error> for MultichatError {
    fn from(e: toml::de::Error) -> Self {
        MultichatError::Config(e.to_string())
    }
}

/// Result type alias for multichat operations.
pub type Result<T> = std::result::Result<T, MultichatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = MultichatError::Config("operator_name must not be empty".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: operator_name must not be empty"
        );
    }

    #[test]
    fn test_session_error_display() {
        let err = MultichatError::Session("connection reset".to_string());
        assert_eq!(err.to_string(), "session error: connection reset");
    }

    #[test]
    fn test_room_closed_display() {
        assert_eq!(MultichatError::RoomClosed.to_string(), "room is closed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: MultichatError = io_err.into();
        assert!(matches!(err, MultichatError::Io(_)));
        assert!(err.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("[room").unwrap_err();
        let err: MultichatError = toml_err.into();
        assert!(matches!(err, MultichatError::Config(_)));
    }
}
