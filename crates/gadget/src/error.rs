//! Engine error types

use common::TransportError;
use protocol::{Endpoint, ProtocolError};
use thiserror::Error;

/// Errors returned to callers of the report channel
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HidError {
    /// Non-blocking call could not make progress
    #[error("operation would block")]
    WouldBlock,

    /// Blocked call was interrupted; safe to retry
    #[error("interrupted while waiting")]
    Interrupted,

    /// Caller buffer is smaller than the next record; the record stays queued
    #[error("record of {needed} bytes does not fit in a {available} byte buffer")]
    BufferTooSmall { needed: usize, available: usize },

    /// Record can never fit in the write queue
    #[error("report of {len} bytes exceeds the maximum of {max}")]
    ReportTooLong { len: usize, max: usize },

    /// Channel torn down by unbind
    #[error("report channel closed")]
    Closed,

    /// Function could not be brought up on first open
    #[error("function activation failed: {0}")]
    Activation(TransportError),
}

/// Errors from alt-setting transitions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("unknown interface {0}")]
    UnknownInterface(u8),

    #[error("interface {interface} has no alternate setting {alt}")]
    InvalidAlt { interface: u8, alt: u8 },

    #[error("configuring {endpoint} failed: {source}")]
    Configure {
        endpoint: Endpoint,
        source: TransportError,
    },

    #[error("enabling {endpoint} failed: {source}")]
    Enable {
        endpoint: Endpoint,
        source: TransportError,
    },

    #[error("priming slot {slot} on {endpoint} failed: {source}")]
    Prime {
        endpoint: Endpoint,
        slot: usize,
        source: TransportError,
    },
}

/// Errors from the PCM playback interface
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PcmError {
    #[error("buffer of {bytes} bytes outside {min}..={max}")]
    BufferSize { bytes: usize, min: usize, max: usize },

    #[error("period of {bytes} bytes outside {min}..={max}")]
    PeriodSize { bytes: usize, min: usize, max: usize },

    #[error("buffer of {buffer_bytes} bytes is not a whole number of {period_bytes} byte periods")]
    FractionalPeriods {
        buffer_bytes: usize,
        period_bytes: usize,
    },

    #[error("{periods} periods outside {min}..={max}")]
    PeriodCount {
        periods: usize,
        min: usize,
        max: usize,
    },

    #[error("unsupported format: {rate} Hz, {channels} channels")]
    UnsupportedFormat { rate: u32, channels: u16 },

    #[error("hardware parameters not set")]
    NotConfigured,

    #[error("playback stream not open")]
    NotOpen,

    #[error("playback stream already open")]
    Busy,
}

/// Control request the functions do not handle; the transport stalls ep0
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported control request {request_type:#04x}.{request:#04x} (index {index:#06x})")]
pub struct ControlError {
    pub request_type: u8,
    pub request: u8,
    pub index: u16,
}

/// Any engine error
#[derive(Debug, Error)]
pub enum GadgetError {
    #[error(transparent)]
    Hid(#[from] HidError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Pcm(#[from] PcmError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GadgetError>;
