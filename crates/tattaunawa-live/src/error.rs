//! Error types for the live session

use thiserror::Error;

/// Result type alias for live session operations
pub type LiveResult<T> = Result<T, LiveError>;

/// Errors that can occur in a live voice session
#[derive(Error, Debug)]
pub enum LiveError {
    /// The transport channel could not be established. Fatal: the session never
    /// reaches Connected.
    #[error("Channel setup failed: {0}")]
    ChannelSetup(String),

    /// The capture device was denied or unavailable. Fatal.
    #[error("Capture device error: {0}")]
    DeviceAccess(String),

    /// The established channel failed mid-session. Fatal: downgrades
    /// Connected to Error and triggers full teardown.
    #[error("Channel error: {0}")]
    ChannelRuntime(String),

    /// A single inbound chunk could not be decoded. The chunk is dropped;
    /// the session continues.
    #[error("Chunk decode failed: {0}")]
    Decode(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Human-readable reason category carried by the Error state for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Connection,
    Microphone,
    Unknown,
}

impl LiveError {
    /// Map an error to the user-facing reason category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            LiveError::ChannelSetup(_)
            | LiveError::ChannelRuntime(_)
            | LiveError::ChannelSend(_) => ErrorCategory::Connection,
            LiveError::DeviceAccess(_) => ErrorCategory::Microphone,
            _ => ErrorCategory::Unknown,
        }
    }
}

impl From<cpal::DevicesError> for LiveError {
    fn from(err: cpal::DevicesError) -> Self {
        LiveError::DeviceAccess(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for LiveError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        LiveError::DeviceAccess(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for LiveError {
    fn from(err: cpal::BuildStreamError) -> Self {
        LiveError::DeviceAccess(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for LiveError {
    fn from(err: cpal::PlayStreamError) -> Self {
        LiveError::DeviceAccess(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_map_to_display_reasons() {
        assert_eq!(
            LiveError::ChannelSetup("refused".into()).category(),
            ErrorCategory::Connection
        );
        assert_eq!(
            LiveError::ChannelRuntime("reset".into()).category(),
            ErrorCategory::Connection
        );
        assert_eq!(
            LiveError::DeviceAccess("denied".into()).category(),
            ErrorCategory::Microphone
        );
        assert_eq!(
            LiveError::Decode("bad chunk".into()).category(),
            ErrorCategory::Unknown
        );
    }
}
