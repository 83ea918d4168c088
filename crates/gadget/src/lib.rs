//! Accessory gadget engine
//!
//! Device side of a USB composite accessory: isochronous audio playback
//! towards the host and a bidirectional report channel, driven through the
//! [`common::UsbTransport`] seam.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use common::test_utils::MockRegistrar;
//! use common::{EventSender, LoopbackTransport};
//! use gadget::{Gadget, GadgetConfig};
//! use protocol::{AUDIO_STREAMING_INTERFACE, LinkSpeed};
//!
//! let transport = Arc::new(LoopbackTransport::new(LinkSpeed::Full));
//! let gadget = Gadget::bind(
//!     &GadgetConfig::default(),
//!     transport.clone(),
//!     Arc::new(MockRegistrar::default()),
//!     EventSender::disconnected(),
//! )
//! .unwrap();
//!
//! gadget.set_alt(AUDIO_STREAMING_INTERFACE, 1).unwrap();
//! assert_eq!(gadget.get_alt(AUDIO_STREAMING_INTERFACE).unwrap(), 1);
//! gadget.unbind();
//! ```

pub mod audio;
pub mod config;
pub mod context;
pub mod control;
pub mod error;
pub mod hid;
pub mod lifecycle;

pub use audio::{HwParams, PcmPlayback, PlaybackSubstream, TriggerCommand};
pub use config::GadgetConfig;
pub use context::Gadget;
pub use control::{ControlOutcome, DataSink};
pub use error::{ControlError, GadgetError, HidError, LifecycleError, PcmError, Result};
pub use hid::{HidChannel, HidHandle, Readiness};
pub use lifecycle::AltSettingState;
