//! Gadget context
//!
//! Everything the functions share lives in one [`Gadget`], created at bind
//! and torn down at unbind. The transport feeds it alternate setting
//! selections, control requests and transfer completions.

use crate::audio::{AudioFunction, PcmPlayback};
use crate::config::GadgetConfig;
use crate::control::{ControlDispatcher, ControlOutcome, DataSink};
use crate::error::{ControlError, GadgetError, HidError, LifecycleError, Result};
use crate::hid::{HidChannel, HidFunction, HidHandle};
use common::{Completion, EventSender, FunctionRegistrar, GadgetEvent, TransferTag, UsbTransport};
use protocol::{AUDIO_CONTROL_INTERFACE, AUDIO_STREAMING_INTERFACE, ControlRequest, HID_INTERFACE};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Bound composite accessory: audio playback plus the report channel
pub struct Gadget {
    audio: Arc<AudioFunction>,
    hid: Arc<HidFunction>,
    control: ControlDispatcher,
    events: EventSender,
    unbound: AtomicBool,
}

impl Gadget {
    /// Bind the functions to `transport`
    pub fn bind(
        config: &GadgetConfig,
        transport: Arc<dyn UsbTransport>,
        registrar: Arc<dyn FunctionRegistrar>,
        events: EventSender,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| GadgetError::Config(format!("{e:#}")))?;

        let audio = Arc::new(AudioFunction::new(
            config.audio.transfers,
            Arc::clone(&transport),
            events.clone(),
        ));
        let hid = Arc::new(HidFunction::bind(
            config.hid.options(),
            config.hid.out_pool(),
            Arc::clone(&transport),
            registrar,
            events.clone(),
        )?);
        let control = ControlDispatcher::new(Arc::clone(&audio), Arc::clone(&hid));

        info!(
            "Gadget bound: {} audio transfers, {} byte reports, interrupt OUT {}",
            config.audio.transfers,
            config.hid.report_length,
            if config.hid.out_endpoint { "on" } else { "off" }
        );

        Ok(Self {
            audio,
            hid,
            control,
            events,
            unbound: AtomicBool::new(false),
        })
    }

    /// Host selected `alt` on `interface`
    pub fn set_alt(&self, interface: u8, alt: u8) -> std::result::Result<(), LifecycleError> {
        match interface {
            AUDIO_CONTROL_INTERFACE if alt == 0 => {}
            AUDIO_CONTROL_INTERFACE => {
                return Err(LifecycleError::InvalidAlt { interface, alt });
            }
            AUDIO_STREAMING_INTERFACE => self.audio.set_alt(alt)?,
            HID_INTERFACE => self.hid.set_alt(alt)?,
            other => return Err(LifecycleError::UnknownInterface(other)),
        }

        debug!("Interface {} now at alt {}", interface, alt);
        self.events
            .emit(GadgetEvent::AltSettingChanged { interface, alt });
        Ok(())
    }

    /// Current alternate setting of `interface`
    pub fn get_alt(&self, interface: u8) -> std::result::Result<u8, LifecycleError> {
        match interface {
            AUDIO_CONTROL_INTERFACE | HID_INTERFACE => Ok(0),
            AUDIO_STREAMING_INTERFACE => Ok(self.audio.alt_state().alt()),
            other => Err(LifecycleError::UnknownInterface(other)),
        }
    }

    /// Host deconfigured the device
    pub fn disable(&self) {
        self.audio.deactivate();
        self.hid.deactivate();
        info!("Gadget disabled");
    }

    /// Setup stage of a control request
    pub fn setup(&self, req: &ControlRequest) -> std::result::Result<ControlOutcome, ControlError> {
        self.control.dispatch(req)
    }

    /// Setup stage from the raw 8 byte packet
    pub fn setup_packet(&self, raw: &[u8]) -> Result<ControlOutcome> {
        let req = ControlRequest::parse(raw)?;
        Ok(self.setup(&req)?)
    }

    /// OUT data stage of a request answered with [`ControlOutcome::Receive`]
    pub fn control_data(&self, sink: DataSink, data: &[u8]) {
        self.control.complete_data_stage(sink, data);
    }

    /// Transfer completion from the transport
    pub fn complete(&self, completion: Completion) {
        match completion.tag {
            TransferTag::AudioSlot(slot) => self.audio.complete(slot, completion),
            TransferTag::HidSend => self.hid.complete_send(completion),
            TransferTag::HidReceive(slot) => self.hid.complete_receive(slot, completion),
        }
    }

    /// Playback device fed by the audio pump
    pub fn pcm(&self) -> &PcmPlayback {
        self.audio.pcm()
    }

    pub fn hid(&self) -> &Arc<HidChannel> {
        self.hid.channel()
    }

    /// Open the report channel
    pub fn open_hid(&self, nonblocking: bool) -> std::result::Result<HidHandle, HidError> {
        self.hid.channel().open(nonblocking)
    }

    /// Tear everything down
    pub fn unbind(self) {
        self.shutdown();
    }

    fn shutdown(&self) {
        if self.unbound.swap(true, Ordering::SeqCst) {
            return;
        }
        self.audio.pcm().close();
        self.audio.deactivate();
        self.hid.shutdown();
        info!("Gadget unbound");
    }
}

impl Drop for Gadget {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::LoopbackTransport;
    use common::test_utils::MockRegistrar;
    use protocol::{Endpoint, LinkSpeed};

    fn bind() -> (Gadget, Arc<LoopbackTransport>) {
        let transport = Arc::new(LoopbackTransport::new(LinkSpeed::Full));
        let gadget = Gadget::bind(
            &GadgetConfig::default(),
            transport.clone(),
            Arc::new(MockRegistrar::default()),
            EventSender::disconnected(),
        )
        .unwrap();
        (gadget, transport)
    }

    #[test]
    fn test_alt_settings() {
        let (gadget, transport) = bind();

        gadget.set_alt(AUDIO_STREAMING_INTERFACE, 1).unwrap();
        assert_eq!(gadget.get_alt(AUDIO_STREAMING_INTERFACE).unwrap(), 1);
        assert_eq!(transport.pending(Endpoint::AudioIn), 4);

        gadget.set_alt(AUDIO_STREAMING_INTERFACE, 0).unwrap();
        assert_eq!(gadget.get_alt(AUDIO_STREAMING_INTERFACE).unwrap(), 0);
        assert_eq!(transport.pending(Endpoint::AudioIn), 0);

        assert!(matches!(
            gadget.get_alt(7),
            Err(LifecycleError::UnknownInterface(7))
        ));
        assert!(gadget.set_alt(AUDIO_CONTROL_INTERFACE, 1).is_err());
    }

    #[test]
    fn test_invalid_config_refused() {
        let mut config = GadgetConfig::default();
        config.audio.transfers = 0;
        let result = Gadget::bind(
            &config,
            Arc::new(LoopbackTransport::new(LinkSpeed::Full)),
            Arc::new(MockRegistrar::default()),
            EventSender::disconnected(),
        );
        assert!(matches!(result, Err(GadgetError::Config(_))));
    }

    #[test]
    fn test_truncated_setup_packet() {
        let (gadget, _transport) = bind();
        assert!(matches!(
            gadget.setup_packet(&[0x21, 0x09]),
            Err(GadgetError::Protocol(_))
        ));
    }

    #[test]
    fn test_disable_tears_down_streaming() {
        let (gadget, transport) = bind();
        gadget.set_alt(AUDIO_STREAMING_INTERFACE, 1).unwrap();
        gadget.set_alt(HID_INTERFACE, 0).unwrap();

        gadget.disable();
        assert_eq!(gadget.get_alt(AUDIO_STREAMING_INTERFACE).unwrap(), 0);
        assert!(!transport.is_enabled(Endpoint::AudioIn));
        assert!(!transport.is_enabled(Endpoint::HidIn));
        gadget.unbind();
    }
}
