//! PCM playback interface
//!
//! The audio-subsystem side of the pump: one playback stream with a fixed
//! format (44.1 kHz, stereo, S16_LE), buffer and period negotiation, the
//! trigger commands and pointer reporting in frames.

use super::pump::{AudioPump, copy_wrapping};
use crate::error::PcmError;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const RATE: u32 = 44_100;
pub const CHANNELS: u16 = 2;
/// Bytes per frame: two S16 samples
pub const FRAME_BYTES: usize = 4;

pub const PERIOD_BYTES_MIN: usize = 90;
pub const PERIOD_BYTES_MAX: usize = 4096;
pub const PERIODS_MIN: usize = 4;
pub const PERIODS_MAX: usize = 16;
pub const BUFFER_BYTES_MAX: usize = PERIOD_BYTES_MAX * PERIODS_MAX;

/// Negotiated hardware parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwParams {
    pub rate: u32,
    pub channels: u16,
    pub buffer_bytes: usize,
    pub period_bytes: usize,
}

impl HwParams {
    /// Parameters in the fixed stream format
    pub fn new(buffer_bytes: usize, period_bytes: usize) -> Self {
        Self {
            rate: RATE,
            channels: CHANNELS,
            buffer_bytes,
            period_bytes,
        }
    }

    pub fn periods(&self) -> usize {
        self.buffer_bytes / self.period_bytes.max(1)
    }

    /// Check the parameters against the stream constraints
    pub fn validate(&self) -> Result<(), PcmError> {
        if self.rate != RATE || self.channels != CHANNELS {
            return Err(PcmError::UnsupportedFormat {
                rate: self.rate,
                channels: self.channels,
            });
        }
        if !(PERIOD_BYTES_MIN..=PERIOD_BYTES_MAX).contains(&self.period_bytes) {
            return Err(PcmError::PeriodSize {
                bytes: self.period_bytes,
                min: PERIOD_BYTES_MIN,
                max: PERIOD_BYTES_MAX,
            });
        }
        let buffer_min = PERIOD_BYTES_MIN * PERIODS_MIN;
        if !(buffer_min..=BUFFER_BYTES_MAX).contains(&self.buffer_bytes) {
            return Err(PcmError::BufferSize {
                bytes: self.buffer_bytes,
                min: buffer_min,
                max: BUFFER_BYTES_MAX,
            });
        }
        if self.buffer_bytes % self.period_bytes != 0 {
            return Err(PcmError::FractionalPeriods {
                buffer_bytes: self.buffer_bytes,
                period_bytes: self.period_bytes,
            });
        }
        let periods = self.periods();
        if !(PERIODS_MIN..=PERIODS_MAX).contains(&periods) {
            return Err(PcmError::PeriodCount {
                periods,
                min: PERIODS_MIN,
                max: PERIODS_MAX,
            });
        }
        Ok(())
    }
}

/// Trigger commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCommand {
    Start,
    Resume,
    Stop,
    Suspend,
    PausePush,
    PauseRelease,
}

/// Playback ring plus period notification for the producer
#[derive(Debug)]
pub struct PlaybackSubstream {
    params: HwParams,
    ring: RwLock<Vec<u8>>,
    periods: Mutex<u64>,
    elapsed: Condvar,
}

impl PlaybackSubstream {
    pub fn new(params: HwParams) -> Self {
        Self {
            params,
            ring: RwLock::new(vec![0u8; params.buffer_bytes]),
            periods: Mutex::new(0),
            elapsed: Condvar::new(),
        }
    }

    pub fn params(&self) -> HwParams {
        self.params
    }

    pub fn buffer_bytes(&self) -> usize {
        self.params.buffer_bytes
    }

    pub fn period_bytes(&self) -> usize {
        self.params.period_bytes
    }

    /// Write `data` into the ring at byte `offset`, wrapping at the end
    ///
    /// Returns the offset following the written data.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> usize {
        let mut ring = self.ring.write().unwrap_or_else(PoisonError::into_inner);
        let len = ring.len();
        if len == 0 {
            return 0;
        }

        let mut pos = offset % len;
        for chunk in data.chunks(len) {
            let first = (len - pos).min(chunk.len());
            ring[pos..pos + first].copy_from_slice(&chunk[..first]);
            let rest = chunk.len() - first;
            ring[..rest].copy_from_slice(&chunk[first..]);
            pos = (pos + chunk.len()) % len;
        }
        pos
    }

    /// Copy ring contents starting at `start` into `dst`
    pub(crate) fn read_wrapping(&self, start: usize, dst: &mut [u8]) {
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);
        copy_wrapping(&ring, start, dst);
    }

    fn periods(&self) -> MutexGuard<'_, u64> {
        self.periods.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Periods consumed by the pump since the stream was configured
    pub fn periods_elapsed(&self) -> u64 {
        *self.periods()
    }

    /// Wait until more than `seen` periods have elapsed or `timeout` passes
    ///
    /// Returns the period count at wake-up.
    pub fn wait_for_period(&self, seen: u64, timeout: Duration) -> u64 {
        let deadline = Instant::now() + timeout;
        let mut periods = self.periods();
        while *periods <= seen {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            periods = self
                .elapsed
                .wait_timeout(periods, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *periods
    }

    pub(crate) fn period_elapsed(&self, count: u32) {
        *self.periods() += u64::from(count);
        self.elapsed.notify_all();
    }
}

#[derive(Default)]
struct Runtime {
    open: bool,
    substream: Option<Arc<PlaybackSubstream>>,
}

/// Playback device bound to the pump
pub struct PcmPlayback {
    pump: Arc<AudioPump>,
    runtime: Mutex<Runtime>,
}

impl PcmPlayback {
    pub fn new(pump: Arc<AudioPump>) -> Self {
        Self {
            pump,
            runtime: Mutex::new(Runtime::default()),
        }
    }

    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open(&self) -> Result<(), PcmError> {
        let mut runtime = self.runtime();
        if runtime.open {
            return Err(PcmError::Busy);
        }
        runtime.open = true;
        self.pump.reset_phase();
        debug!("Playback stream opened");
        Ok(())
    }

    /// Negotiate buffer and period sizes and allocate the ring
    pub fn hw_params(&self, params: HwParams) -> Result<Arc<PlaybackSubstream>, PcmError> {
        let mut runtime = self.runtime();
        if !runtime.open {
            return Err(PcmError::NotOpen);
        }
        params.validate()?;

        if runtime.substream.take().is_some() {
            self.pump.unbind();
        }
        let substream = Arc::new(PlaybackSubstream::new(params));
        runtime.substream = Some(Arc::clone(&substream));
        info!(
            "Playback configured: {} byte buffer, {} periods of {} bytes",
            params.buffer_bytes,
            params.periods(),
            params.period_bytes
        );
        Ok(substream)
    }

    /// Release the ring
    pub fn hw_free(&self) -> Result<(), PcmError> {
        let mut runtime = self.runtime();
        if runtime.substream.take().is_some() {
            self.pump.unbind();
            debug!("Playback buffer released");
        }
        Ok(())
    }

    pub fn prepare(&self) -> Result<(), PcmError> {
        match self.runtime().substream {
            Some(_) => Ok(()),
            None => Err(PcmError::NotConfigured),
        }
    }

    pub fn trigger(&self, command: TriggerCommand) -> Result<(), PcmError> {
        let runtime = self.runtime();
        match command {
            TriggerCommand::Start | TriggerCommand::Resume => {
                let substream = runtime.substream.as_ref().ok_or(PcmError::NotConfigured)?;
                self.pump.start(substream);
            }
            TriggerCommand::Stop | TriggerCommand::Suspend => self.pump.stop(),
            TriggerCommand::PausePush => self.pump.pause(),
            TriggerCommand::PauseRelease => {
                let substream = runtime.substream.as_ref().ok_or(PcmError::NotConfigured)?;
                self.pump.release(substream);
            }
        }
        debug!("Playback trigger {:?}", command);
        Ok(())
    }

    /// Playback position in frames
    pub fn pointer(&self) -> usize {
        self.pump.hw_ptr() / FRAME_BYTES
    }

    /// Configured stream, if any
    pub fn substream(&self) -> Option<Arc<PlaybackSubstream>> {
        self.runtime().substream.clone()
    }

    pub fn close(&self) {
        let mut runtime = self.runtime();
        if runtime.substream.take().is_some() {
            self.pump.unbind();
        }
        runtime.open = false;
        debug!("Playback stream closed");
    }
}
