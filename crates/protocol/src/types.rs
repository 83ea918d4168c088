//! USB type definitions shared by the gadget engine
//!
//! Interface numbering, logical endpoints, link speed and transfer status as
//! seen from the device side of the link.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Audio control interface (class requests for volume, no endpoints)
pub const AUDIO_CONTROL_INTERFACE: u8 = 0;

/// Audio streaming interface (alt 0 = idle, alt 1 = isochronous IN streaming)
pub const AUDIO_STREAMING_INTERFACE: u8 = 1;

/// HID report interface (interrupt IN, optional interrupt OUT)
pub const HID_INTERFACE: u8 = 2;

/// Negotiated link speed
///
/// Endpoint descriptors differ per speed (packet size and polling interval),
/// so activating an endpoint always consults the current link speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkSpeed {
    /// Full speed - 12 Mbps, 1 ms frames
    #[default]
    Full,
    /// High speed - 480 Mbps, 125 us microframes
    High,
}

impl fmt::Display for LinkSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkSpeed::Full => write!(f, "full"),
            LinkSpeed::High => write!(f, "high"),
        }
    }
}

impl FromStr for LinkSpeed {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "fs" => Ok(LinkSpeed::Full),
            "high" | "hs" => Ok(LinkSpeed::High),
            other => Err(ProtocolError::UnknownSpeed(other.to_string())),
        }
    }
}

/// Logical data endpoints owned by the accessory functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// Isochronous IN carrying PCM playback to the host
    AudioIn,
    /// Interrupt IN carrying outbound reports to the host
    HidIn,
    /// Interrupt OUT carrying inbound reports from the host
    HidOut,
}

impl Endpoint {
    /// Default endpoint address (bit 7 set for IN)
    pub fn address(self) -> u8 {
        match self {
            Endpoint::AudioIn => 0x81,
            Endpoint::HidIn => 0x82,
            Endpoint::HidOut => 0x02,
        }
    }

    /// True for device-to-host endpoints
    pub fn is_in(self) -> bool {
        (self.address() & 0x80) != 0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:#04x})", self, self.address())
    }
}

/// Completion status reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Transfer finished normally
    Completed,
    /// Transfer was dequeued before it finished
    Cancelled,
    /// Endpoint was disabled or the link went away
    Shutdown,
    /// Endpoint halted
    Stall,
    /// Host sent more data than the buffer holds
    Overflow,
}

impl TransferStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, TransferStatus::Completed)
    }
}
