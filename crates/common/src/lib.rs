//! Common utilities for accessory-gadget
//!
//! This crate provides the plumbing shared by the gadget engine and its
//! binary: error handling, logging setup, the event channel, the transport
//! seam to the device controller and an in-process loopback transport.

pub mod channel;
pub mod error;
pub mod logging;
pub mod loopback;
pub mod test_utils;
pub mod transport;

pub use channel::{EventReceiver, EventSender, GadgetEvent, create_event_channel};
pub use error::{Error, Result, TransportError};
pub use logging::setup_logging;
pub use loopback::LoopbackTransport;
pub use transport::{
    Completion, FunctionRegistrar, PoolId, SlotHandle, Transfer, TransferTag, UsbTransport,
};
