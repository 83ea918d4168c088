//! Control pipe setup requests
//!
//! The 8-byte setup packet every control transfer starts with, plus the
//! request codes the accessory functions answer.

use crate::error::{ProtocolError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Size of a setup packet on the wire
pub const SETUP_PACKET_SIZE: usize = 8;

/// Audio class: set current value of a control (volume)
pub const UAC_SET_CUR: u8 = 0x01;
/// Audio class: get current value of a control (volume)
pub const UAC_GET_CUR: u8 = 0x81;
/// Standard: GET_DESCRIPTOR, answered with the HID report descriptor
pub const GET_DESCRIPTOR: u8 = 0x06;
/// HID class: SET_REPORT over the control pipe
pub const HID_SET_REPORT: u8 = 0x09;
/// HID class: SET_IDLE
pub const HID_SET_IDLE: u8 = 0x0a;
/// Vendor capability probe sent by hosts before starting the accessory protocol
pub const VENDOR_PROBE: u8 = 0x40;

/// Request type field, bits 5..6 of `bmRequestType`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Standard,
    Class,
    Vendor,
    Reserved,
}

/// Recipient field, bits 0..4 of `bmRequestType`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

/// Parsed setup packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlRequest {
    /// `bmRequestType`
    pub request_type: u8,
    /// `bRequest`
    pub request: u8,
    /// `wValue`
    pub value: u16,
    /// `wIndex`
    pub index: u16,
    /// `wLength`, size of the data stage
    pub length: u16,
}

impl ControlRequest {
    pub fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            request_type,
            request,
            value,
            index,
            length,
        }
    }

    /// Parse a little-endian setup packet
    ///
    /// Extra trailing bytes are ignored; fewer than [`SETUP_PACKET_SIZE`]
    /// bytes is an error.
    pub fn parse(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < SETUP_PACKET_SIZE {
            return Err(ProtocolError::TruncatedSetup {
                needed: SETUP_PACKET_SIZE,
                available: buf.len(),
            });
        }

        Ok(Self {
            request_type: buf.get_u8(),
            request: buf.get_u8(),
            value: buf.get_u16_le(),
            index: buf.get_u16_le(),
            length: buf.get_u16_le(),
        })
    }

    /// Encode back to the wire format
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SETUP_PACKET_SIZE);
        buf.put_u8(self.request_type);
        buf.put_u8(self.request);
        buf.put_u16_le(self.value);
        buf.put_u16_le(self.index);
        buf.put_u16_le(self.length);
        buf.freeze()
    }

    /// Data stage direction is device-to-host
    pub fn is_in(&self) -> bool {
        (self.request_type & 0x80) != 0
    }

    pub fn kind(&self) -> RequestKind {
        match (self.request_type >> 5) & 0x03 {
            0 => RequestKind::Standard,
            1 => RequestKind::Class,
            2 => RequestKind::Vendor,
            _ => RequestKind::Reserved,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self.request_type & 0x1f {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            _ => Recipient::Other,
        }
    }

    /// Interface number addressed by an interface-recipient request
    pub fn interface(&self) -> u8 {
        (self.index & 0xff) as u8
    }
}
