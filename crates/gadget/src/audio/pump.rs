//! Audio stream pump
//!
//! Turns the playback ring into a 44.1 kHz isochronous stream: nine 176 byte
//! packets followed by one 180 byte packet every ten frames, which is exactly
//! 1764 bytes (441 stereo S16 frames) per 10 ms.

use super::pcm::PlaybackSubstream;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Packets per phase cycle
pub const PHASE_CYCLE: u8 = 10;

/// Payload of the first nine packets of a cycle
pub const SHORT_PACKET: usize = 176;

/// Payload of the last packet of a cycle
pub const LONG_PACKET: usize = 180;

/// Payload length for phase `cnt`
pub fn packet_len(cnt: u8) -> usize {
    if cnt < PHASE_CYCLE - 1 {
        SHORT_PACKET
    } else {
        LONG_PACKET
    }
}

/// Copy `dst.len()` bytes out of `ring` starting at `start`, wrapping at the
/// end of the ring
pub fn copy_wrapping(ring: &[u8], start: usize, dst: &mut [u8]) {
    if ring.is_empty() {
        dst.fill(0);
        return;
    }

    let mut pos = start % ring.len();
    let mut done = 0;
    while done < dst.len() {
        let n = (ring.len() - pos).min(dst.len() - done);
        dst[done..done + n].copy_from_slice(&ring[pos..pos + n]);
        done += n;
        pos = (pos + n) % ring.len();
    }
}

struct PumpState {
    /// Read position in the ring, always below `dma_bytes`
    hw_ptr: usize,
    /// Phase counter, 0..PHASE_CYCLE
    cnt: u8,
    dma_bytes: usize,
    period_bytes: usize,
    active: Option<Weak<PlaybackSubstream>>,
    /// Slots whose staging buffer still holds audio from before a stop
    stale_slots: u32,
}

/// Outcome of one pump advance
#[derive(Debug)]
pub struct PumpStep {
    /// Payload length for the resubmitted packet
    pub length: usize,
    /// Ring offset to copy from
    pub start: usize,
    /// Ring pointer after the advance
    pub hw_ptr: usize,
    /// Period boundaries crossed by this advance
    pub periods: u32,
    /// Stream to copy from, if playing
    pub source: Option<Arc<PlaybackSubstream>>,
    /// Staging buffer must be zeroed
    pub clear: bool,
}

/// Shared pump state, locked once per completion
pub struct AudioPump {
    state: Mutex<PumpState>,
}

impl AudioPump {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PumpState {
                hw_ptr: 0,
                cnt: 0,
                dma_bytes: 0,
                period_bytes: 0,
                active: None,
                stale_slots: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, PumpState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restart the phase cycle
    pub fn reset_phase(&self) {
        self.state().cnt = 0;
    }

    /// Start (or resume) playing `substream` from the top of its ring
    pub fn start(&self, substream: &Arc<PlaybackSubstream>) {
        let mut state = self.state();
        state.hw_ptr = 0;
        Self::bind(&mut state, substream);
    }

    /// Stop (or suspend) playback; staging buffers are zeroed as their
    /// slots come by
    pub fn stop(&self) {
        let mut state = self.state();
        state.hw_ptr = 0;
        state.active = None;
        state.stale_slots = u32::MAX;
    }

    /// Pause without moving the pointer
    pub fn pause(&self) {
        let mut state = self.state();
        state.active = None;
        state.stale_slots = u32::MAX;
    }

    /// Continue after a pause from the current pointer
    pub fn release(&self, substream: &Arc<PlaybackSubstream>) {
        let mut state = self.state();
        if state.hw_ptr >= substream.buffer_bytes() {
            state.hw_ptr = 0;
        }
        Self::bind(&mut state, substream);
    }

    /// Forget the ring entirely (buffer freed)
    pub fn unbind(&self) {
        let mut state = self.state();
        state.hw_ptr = 0;
        state.dma_bytes = 0;
        state.period_bytes = 0;
        state.active = None;
        state.stale_slots = u32::MAX;
    }

    fn bind(state: &mut PumpState, substream: &Arc<PlaybackSubstream>) {
        state.dma_bytes = substream.buffer_bytes();
        state.period_bytes = substream.period_bytes();
        state.active = Some(Arc::downgrade(substream));
    }

    /// Current ring pointer in bytes
    pub fn hw_ptr(&self) -> usize {
        self.state().hw_ptr
    }

    pub fn is_running(&self) -> bool {
        self.state()
            .active
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Account one packet for `slot` and pick what it carries
    pub fn advance(&self, slot: usize) -> PumpStep {
        let mut state = self.state();
        let length = packet_len(state.cnt);
        state.cnt = (state.cnt + 1) % PHASE_CYCLE;

        let source = state.active.as_ref().and_then(Weak::upgrade);
        match source {
            Some(source) if state.dma_bytes > 0 && state.period_bytes > 0 => {
                let start = state.hw_ptr;
                let pending = start % state.period_bytes + length;
                let periods = (pending / state.period_bytes) as u32;
                state.hw_ptr = (start + length) % state.dma_bytes;
                PumpStep {
                    length,
                    start,
                    hw_ptr: state.hw_ptr,
                    periods,
                    source: Some(source),
                    clear: false,
                }
            }
            _ => {
                let bit = u32::try_from(slot)
                    .ok()
                    .and_then(|shift| 1u32.checked_shl(shift))
                    .unwrap_or(0);
                let clear = state.stale_slots & bit != 0;
                state.stale_slots &= !bit;
                PumpStep {
                    length,
                    start: 0,
                    hw_ptr: state.hw_ptr,
                    periods: 0,
                    source: None,
                    clear,
                }
            }
        }
    }
}

impl Default for AudioPump {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::HwParams;

    fn substream(buffer_bytes: usize, period_bytes: usize) -> Arc<PlaybackSubstream> {
        Arc::new(PlaybackSubstream::new(HwParams::new(buffer_bytes, period_bytes)))
    }

    #[test]
    fn test_phase_cycle_lengths() {
        let lengths: Vec<usize> = (0..PHASE_CYCLE).map(packet_len).collect();
        assert_eq!(lengths.iter().sum::<usize>(), 1764);
        assert_eq!(lengths[9], LONG_PACKET);
        assert!(lengths[..9].iter().all(|&len| len == SHORT_PACKET));
    }

    #[test]
    fn test_copy_wrapping_splits() {
        let ring: Vec<u8> = (0..10).collect();
        let mut dst = [0u8; 4];
        copy_wrapping(&ring, 8, &mut dst);
        assert_eq!(dst, [8, 9, 0, 1]);
    }

    #[test]
    fn test_idle_pump_still_cycles() {
        let pump = AudioPump::new();
        let lengths: Vec<usize> = (0..20).map(|_| pump.advance(0).length).collect();
        assert_eq!(lengths[9], LONG_PACKET);
        assert_eq!(lengths[19], LONG_PACKET);
        assert_eq!(pump.hw_ptr(), 0);
    }

    #[test]
    fn test_advance_moves_pointer_and_counts_periods() {
        let pump = AudioPump::new();
        let stream = substream(4096, 1024);
        pump.start(&stream);

        let mut periods = 0;
        for _ in 0..10 {
            let step = pump.advance(0);
            assert!(step.source.is_some());
            periods += step.periods;
        }
        assert_eq!(pump.hw_ptr(), 1764);
        assert_eq!(periods, 1);
    }

    #[test]
    fn test_small_period_crosses_twice() {
        let pump = AudioPump::new();
        let stream = substream(360, 90);
        pump.start(&stream);

        let step = pump.advance(0);
        assert_eq!(step.length, SHORT_PACKET);
        assert_eq!(step.periods, 1);
        let step = pump.advance(1);
        assert_eq!(step.start, 176);
        assert_eq!(step.periods, 2);
    }

    #[test]
    fn test_stop_marks_slots_for_zeroing_once() {
        let pump = AudioPump::new();
        let stream = substream(4096, 1024);
        pump.start(&stream);
        pump.advance(0);
        pump.stop();

        assert!(pump.advance(0).clear);
        assert!(!pump.advance(0).clear);
        assert!(pump.advance(1).clear);
        assert_eq!(pump.hw_ptr(), 0);
    }

    #[test]
    fn test_pause_keeps_pointer() {
        let pump = AudioPump::new();
        let stream = substream(4096, 1024);
        pump.start(&stream);
        pump.advance(0);
        pump.pause();
        assert!(!pump.is_running());
        assert_eq!(pump.hw_ptr(), SHORT_PACKET);

        pump.release(&stream);
        assert_eq!(pump.advance(0).start, SHORT_PACKET);
    }

    #[test]
    fn test_dropped_substream_stops_copy() {
        let pump = AudioPump::new();
        let stream = substream(4096, 1024);
        pump.start(&stream);
        drop(stream);
        assert!(pump.advance(0).source.is_none());
    }
}
