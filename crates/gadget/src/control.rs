//! Control request dispatch
//!
//! Class and vendor requests that reach the functions through ep0. The
//! transport serializes control transfers, so at most one request is in
//! progress at a time.

use crate::audio::AudioFunction;
use crate::error::ControlError;
use crate::hid::HidFunction;
use bytes::Bytes;
use protocol::{
    AUDIO_CONTROL_INTERFACE, AUDIO_STREAMING_INTERFACE, ControlRequest, GET_DESCRIPTOR,
    HID_INTERFACE, HID_REPORT_DESCRIPTOR, HID_SET_IDLE, HID_SET_REPORT, UAC_GET_CUR, UAC_SET_CUR,
    VENDOR_PROBE,
};
use std::sync::Arc;
use tracing::{debug, trace};

/// Function a request is delivered to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Audio,
    Hid,
}

/// Where the OUT data stage of a request goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSink {
    /// Volume control value
    Volume,
    /// Inbound report
    Report,
    /// Read and thrown away
    Discard,
}

/// How the transport should finish a control transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    /// IN data stage with these bytes
    Respond(Bytes),
    /// Zero-length status stage
    Ack,
    /// OUT data stage of `length` bytes, handed back through
    /// [`ControlDispatcher::complete_data_stage`]
    Receive { length: usize, sink: DataSink },
}

/// Pick the function for `req`
///
/// The vendor probe is claimed by the HID function whatever its index.
pub fn route(req: &ControlRequest) -> Option<Route> {
    if req.request == VENDOR_PROBE {
        return Some(Route::Hid);
    }
    match req.interface() {
        AUDIO_CONTROL_INTERFACE | AUDIO_STREAMING_INTERFACE => Some(Route::Audio),
        HID_INTERFACE => Some(Route::Hid),
        _ => None,
    }
}

fn receive_or_ack(length: usize, sink: DataSink) -> ControlOutcome {
    if length == 0 {
        ControlOutcome::Ack
    } else {
        ControlOutcome::Receive { length, sink }
    }
}

pub struct ControlDispatcher {
    audio: Arc<AudioFunction>,
    hid: Arc<HidFunction>,
}

impl ControlDispatcher {
    pub fn new(audio: Arc<AudioFunction>, hid: Arc<HidFunction>) -> Self {
        Self { audio, hid }
    }

    /// Handle the setup stage of `req`
    ///
    /// An error means the request is not supported and ep0 must stall.
    pub fn dispatch(&self, req: &ControlRequest) -> Result<ControlOutcome, ControlError> {
        trace!(
            "Control req: {:02x}.{:02x} v{:04x} i{:04x} l{}",
            req.request_type, req.request, req.value, req.index, req.length
        );

        let outcome = match route(req) {
            Some(Route::Audio) => self.audio_setup(req),
            Some(Route::Hid) => self.hid_setup(req),
            None => None,
        };

        outcome.ok_or_else(|| {
            debug!(
                "Stalling unsupported request {:02x}.{:02x} i{:04x}",
                req.request_type, req.request, req.index
            );
            ControlError {
                request_type: req.request_type,
                request: req.request,
                index: req.index,
            }
        })
    }

    fn audio_setup(&self, req: &ControlRequest) -> Option<ControlOutcome> {
        let length = usize::from(req.length);
        match req.request {
            UAC_SET_CUR => Some(receive_or_ack(length, DataSink::Volume)),
            UAC_GET_CUR => Some(ControlOutcome::Respond(Bytes::from(
                self.audio.volume(length),
            ))),
            _ => None,
        }
    }

    fn hid_setup(&self, req: &ControlRequest) -> Option<ControlOutcome> {
        let length = usize::from(req.length);
        match req.request {
            GET_DESCRIPTOR => {
                let len = length.min(HID_REPORT_DESCRIPTOR.len());
                Some(ControlOutcome::Respond(Bytes::from_static(
                    &HID_REPORT_DESCRIPTOR[..len],
                )))
            }
            HID_SET_REPORT => Some(receive_or_ack(length, DataSink::Report)),
            HID_SET_IDLE => Some(ControlOutcome::Ack),
            VENDOR_PROBE => {
                trace!("Vendor probe v{:04x}", req.value);
                if req.is_in() {
                    Some(ControlOutcome::Ack)
                } else {
                    Some(receive_or_ack(length, DataSink::Discard))
                }
            }
            _ => None,
        }
    }

    /// Deliver the OUT data stage of a request accepted with
    /// [`ControlOutcome::Receive`]
    pub fn complete_data_stage(&self, sink: DataSink, data: &[u8]) {
        match sink {
            DataSink::Volume => self.audio.set_volume(data),
            DataSink::Report => {
                self.hid.channel().receive(data);
            }
            DataSink::Discard => trace!("Discarded {} byte data stage", data.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_by_interface() {
        let volume = ControlRequest::new(0x21, UAC_SET_CUR, 0x0200, 0x0000, 2);
        let report = ControlRequest::new(0x21, HID_SET_REPORT, 0x0200, 0x0002, 8);
        let stray = ControlRequest::new(0x21, HID_SET_IDLE, 0, 0x0007, 0);

        assert_eq!(route(&volume), Some(Route::Audio));
        assert_eq!(route(&report), Some(Route::Hid));
        assert_eq!(route(&stray), None);
    }

    #[test]
    fn test_vendor_probe_ignores_index() {
        let probe = ControlRequest::new(0x40, VENDOR_PROBE, 0x6400, 0x0019, 0);
        assert_eq!(route(&probe), Some(Route::Hid));
    }

    #[test]
    fn test_zero_length_out_is_ack() {
        assert_eq!(receive_or_ack(0, DataSink::Report), ControlOutcome::Ack);
        assert_eq!(
            receive_or_ack(4, DataSink::Volume),
            ControlOutcome::Receive {
                length: 4,
                sink: DataSink::Volume
            }
        );
    }
}
