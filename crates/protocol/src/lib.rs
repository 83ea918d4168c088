//! Protocol library for accessory-gadget
//!
//! Device-side USB vocabulary shared by the gadget engine: setup packet
//! parsing, request codes, interface and endpoint identities, per-speed
//! endpoint descriptors and the fixed HID report descriptor.
//!
//! # Example
//!
//! ```
//! use protocol::{ControlRequest, HID_SET_REPORT};
//!
//! let raw = [0x21, 0x09, 0x05, 0x02, 0x02, 0x00, 0x08, 0x00];
//! let req = ControlRequest::parse(&raw).unwrap();
//!
//! assert_eq!(req.request, HID_SET_REPORT);
//! assert_eq!(req.interface(), 2);
//! assert_eq!(req.length, 8);
//! ```

pub mod descriptors;
pub mod error;
pub mod requests;
pub mod types;

pub use descriptors::{
    AUDIO_MAX_PACKET_SIZE, EndpointDescriptor, HID_MAX_PACKET_SIZE, HID_REPORT_DESCRIPTOR,
    TransferKind,
};
pub use error::{ProtocolError, Result};
pub use requests::{
    ControlRequest, GET_DESCRIPTOR, HID_SET_IDLE, HID_SET_REPORT, Recipient, RequestKind,
    SETUP_PACKET_SIZE, UAC_GET_CUR, UAC_SET_CUR, VENDOR_PROBE,
};
pub use types::{
    AUDIO_CONTROL_INTERFACE, AUDIO_STREAMING_INTERFACE, Endpoint, HID_INTERFACE, LinkSpeed,
    TransferStatus,
};
