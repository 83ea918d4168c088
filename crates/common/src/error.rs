//! Common error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the USB transport seam
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint is not enabled, submissions are refused
    #[error("endpoint {0} is disabled")]
    Disabled(protocol::Endpoint),

    /// No descriptor matches the endpoint at the current speed
    #[error("endpoint {0} cannot be configured for this link speed")]
    Unconfigurable(protocol::Endpoint),

    /// Transfer is no longer queued (already completed or never submitted)
    #[error("transfer not queued on endpoint {0}")]
    NotQueued(protocol::Endpoint),

    /// Controller refused the operation
    #[error("controller error: {0}")]
    Controller(String),
}
