//! Audio function: streaming interface, pump and volume control

pub mod pcm;
pub mod pump;

pub use pcm::{HwParams, PcmPlayback, PlaybackSubstream, TriggerCommand};
pub use pump::AudioPump;

use crate::error::LifecycleError;
use crate::lifecycle::{AltSettingState, StreamInterface};
use common::{
    Completion, EventSender, GadgetEvent, SlotHandle, Transfer, TransferTag, UsbTransport,
};
use protocol::{AUDIO_MAX_PACKET_SIZE, AUDIO_STREAMING_INTERFACE, Endpoint};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{trace, warn};

/// Isochronous playback towards the host
pub struct AudioFunction {
    stream: StreamInterface,
    pump: Arc<AudioPump>,
    pcm: PcmPlayback,
    /// Raw volume control value, passed through unvalidated
    volume: Mutex<Vec<u8>>,
    events: EventSender,
}

impl AudioFunction {
    pub fn new(transfers: usize, transport: Arc<dyn UsbTransport>, events: EventSender) -> Self {
        let pump = Arc::new(AudioPump::new());
        Self {
            stream: StreamInterface::new(
                "Audio streaming",
                AUDIO_STREAMING_INTERFACE,
                Endpoint::AudioIn,
                transfers,
                usize::from(AUDIO_MAX_PACKET_SIZE),
                TransferTag::AudioSlot,
                transport,
            ),
            pcm: PcmPlayback::new(Arc::clone(&pump)),
            pump,
            volume: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn set_alt(&self, alt: u8) -> Result<(), LifecycleError> {
        self.stream.set_alt(alt)
    }

    pub fn alt_state(&self) -> AltSettingState {
        self.stream.alt_state()
    }

    pub fn deactivate(&self) {
        self.stream.deactivate();
    }

    pub fn pcm(&self) -> &PcmPlayback {
        &self.pcm
    }

    pub fn pump(&self) -> &AudioPump {
        &self.pump
    }

    /// Store a volume SET_CUR payload
    pub fn set_volume(&self, raw: &[u8]) {
        let mut volume = self.volume.lock().unwrap_or_else(PoisonError::into_inner);
        volume.clear();
        volume.extend_from_slice(raw);
        trace!("Volume set to {:02x?}", raw);
    }

    /// Answer a volume GET_CUR, zero padded or truncated to `length`
    pub fn volume(&self, length: usize) -> Vec<u8> {
        let mut value = self
            .volume
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        value.resize(length, 0);
        value
    }

    /// Isochronous completion for `slot`
    pub fn complete(&self, slot: SlotHandle, completion: Completion) {
        if !self.stream.is_current(slot) {
            trace!("Dropping completion from released pool {:?}", slot.pool);
            return;
        }

        if !completion.status.is_ok() {
            warn!(
                "Audio slot {} ended with {:?}, not resubmitting",
                slot.index, completion.status
            );
            self.events
                .emit(GadgetEvent::AudioStalled { slot: slot.index });
            return;
        }

        let step = self.pump.advance(slot.index);

        let mut buf = completion.buf;
        if buf.len() < step.length {
            buf.resize(self.stream.slot_len().max(step.length), 0);
        }
        match &step.source {
            Some(source) => source.read_wrapping(step.start, &mut buf[..step.length]),
            None if step.clear => buf.fill(0),
            None => {}
        }

        let mut transfer = Transfer::new(completion.tag, buf);
        transfer.length = step.length;
        match self.stream.resubmit(slot, transfer) {
            Ok(true) => trace!("Slot {} resubmitted with {} bytes", slot.index, step.length),
            Ok(false) => trace!("Slot {} released while refilling", slot.index),
            Err(e) => {
                warn!("Audio slot {} resubmit failed: {}", slot.index, e);
                self.events
                    .emit(GadgetEvent::AudioStalled { slot: slot.index });
            }
        }

        if step.periods > 0
            && let Some(source) = &step.source
        {
            source.period_elapsed(step.periods);
            self.events.emit(GadgetEvent::PeriodElapsed {
                hw_ptr: step.hw_ptr,
                periods: step.periods,
            });
        }
    }
}
