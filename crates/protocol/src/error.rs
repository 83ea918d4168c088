//! Protocol error types

use thiserror::Error;

/// Wire-level errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Setup packet shorter than the fixed 8-byte header
    #[error("Truncated setup packet: needed {needed} bytes, got {available}")]
    TruncatedSetup { needed: usize, available: usize },

    /// Alternate setting value outside what the interface defines
    #[error("Invalid alternate setting {alt} for interface {interface}")]
    InvalidAltSetting { interface: u8, alt: u8 },

    /// Link speed name not recognised
    #[error("Unknown link speed: {0}")]
    UnknownSpeed(String),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
