//! Fixed descriptor data
//!
//! Endpoint descriptors are chosen per link speed when an endpoint is
//! (re)configured. The HID report descriptor is the blob returned for
//! GET_DESCRIPTOR on the report interface.

use crate::types::{Endpoint, LinkSpeed};
use serde::{Deserialize, Serialize};

/// Largest isochronous payload (44.1 kHz stereo S16 needs 176.4 bytes per ms)
pub const AUDIO_MAX_PACKET_SIZE: u16 = 180;

/// Interrupt endpoint packet size for the report channel
pub const HID_MAX_PACKET_SIZE: u16 = 64;

/// Endpoint transfer type, bits 0..1 of `bmAttributes`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Isochronous,
    Interrupt,
}

/// Endpoint descriptor fields the transport needs to configure an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// `bEndpointAddress`
    pub address: u8,
    /// `bmAttributes`
    pub attributes: u8,
    /// `wMaxPacketSize`
    pub max_packet_size: u16,
    /// `bInterval` (frames at full speed, 2^(n-1) microframes at high speed)
    pub interval: u8,
}

impl EndpointDescriptor {
    /// Descriptor for `endpoint` at the negotiated `speed`
    pub fn for_speed(endpoint: Endpoint, speed: LinkSpeed) -> Self {
        // 1 ms polling either way: 1 frame at FS, 2^(4-1) microframes at HS
        let interval = match speed {
            LinkSpeed::Full => 1,
            LinkSpeed::High => 4,
        };

        match endpoint {
            Endpoint::AudioIn => Self {
                address: endpoint.address(),
                // isochronous, asynchronous sync type
                attributes: 0x05,
                max_packet_size: AUDIO_MAX_PACKET_SIZE,
                interval,
            },
            Endpoint::HidIn | Endpoint::HidOut => Self {
                address: endpoint.address(),
                attributes: 0x03,
                max_packet_size: HID_MAX_PACKET_SIZE,
                interval,
            },
        }
    }

    pub fn kind(&self) -> TransferKind {
        match self.attributes & 0x03 {
            0x01 => TransferKind::Isochronous,
            _ => TransferKind::Interrupt,
        }
    }
}

/// HID report descriptor: one vendor-defined application collection with
/// four input and five output reports of buffered bytes
pub const HID_REPORT_DESCRIPTOR: &[u8] = &[
    0x06, 0x00, 0xff, // Usage Page (Vendor 0xFF00)
    0x09, 0x01, // Usage (0x01)
    0xa1, 0x01, // Collection (Application)
    0x75, 0x08, //   Report Size (8)
    0x26, 0x80, 0x00, //   Logical Maximum (128)
    0x15, 0x00, //   Logical Minimum (0)
    0x09, 0x01, 0x85, 0x01, 0x95, 0x0c, 0x82, 0x02, 0x01, // Input  id 1, 12 bytes
    0x09, 0x01, 0x85, 0x02, 0x95, 0x0e, 0x82, 0x02, 0x01, // Input  id 2, 14 bytes
    0x09, 0x01, 0x85, 0x03, 0x95, 0x14, 0x82, 0x02, 0x01, // Input  id 3, 20 bytes
    0x09, 0x01, 0x85, 0x04, 0x95, 0x3f, 0x82, 0x02, 0x01, // Input  id 4, 63 bytes
    0x09, 0x01, 0x85, 0x05, 0x95, 0x08, 0x92, 0x02, 0x01, // Output id 5, 8 bytes
    0x09, 0x01, 0x85, 0x06, 0x95, 0x0a, 0x92, 0x02, 0x01, // Output id 6, 10 bytes
    0x09, 0x01, 0x85, 0x07, 0x95, 0x0e, 0x92, 0x02, 0x01, // Output id 7, 14 bytes
    0x09, 0x01, 0x85, 0x08, 0x95, 0x14, 0x92, 0x02, 0x01, // Output id 8, 20 bytes
    0x09, 0x01, 0x85, 0x09, 0x95, 0x3f, 0x92, 0x02, 0x01, // Output id 9, 63 bytes
    0xc0, // End Collection
];
