//! Simulated host and local producers for the binary
//!
//! The host thread plays the USB host on the loopback transport: one
//! isochronous packet per 1 ms frame, acknowledgement of every interrupt IN
//! report and a SET_REPORT (or interrupt OUT report) at a fixed interval.

use common::{
    Completion, EventReceiver, FunctionRegistrar, GadgetEvent, LoopbackTransport, TransportError,
};
use gadget::audio::pcm::{FRAME_BYTES, PERIODS_MAX, PERIOD_BYTES_MAX, RATE};
use gadget::config::SimulationSettings;
use gadget::{ControlOutcome, DataSink, Gadget, HidError, HidHandle, HwParams, PcmError, TriggerCommand};
use protocol::{
    AUDIO_CONTROL_INTERFACE, AUDIO_STREAMING_INTERFACE, ControlRequest, Endpoint, GET_DESCRIPTOR,
    HID_INTERFACE, HID_REPORT_DESCRIPTOR, HID_SET_IDLE, HID_SET_REPORT, UAC_GET_CUR, UAC_SET_CUR,
    VENDOR_PROBE,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Registrar standing in for the composite framework
pub struct SimRegistrar;

impl FunctionRegistrar for SimRegistrar {
    fn register(&self) -> Result<(), TransportError> {
        info!("Accessory function registered with the host");
        Ok(())
    }

    fn unregister(&self) {
        info!("Accessory function unregistered");
    }
}

/// What the simulated host saw
#[derive(Debug, Default, Clone, Copy)]
pub struct HostStats {
    pub frames: u64,
    pub audio_bytes: u64,
    pub reports_received: u64,
    pub reports_sent: u64,
}

/// Spawn the simulated host
pub fn spawn_host(
    gadget: Arc<Gadget>,
    transport: Arc<LoopbackTransport>,
    settings: SimulationSettings,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<HostStats>> {
    std::thread::Builder::new()
        .name("sim-host".to_string())
        .spawn(move || run_host(&gadget, &transport, &settings, &stop))
}

fn run_host(
    gadget: &Gadget,
    transport: &LoopbackTransport,
    settings: &SimulationSettings,
    stop: &AtomicBool,
) -> HostStats {
    info!("Simulated host started");
    enumerate(gadget);

    let frame = Duration::from_millis(1);
    let report_every = settings.report_interval_ms.max(1);
    let mut stats = HostStats::default();
    let mut next_frame = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        if let Some(transfer) = transport.take(Endpoint::AudioIn) {
            stats.audio_bytes += transfer.payload().len() as u64;
            gadget.complete(Completion::completed(transfer));
        }

        while let Some(transfer) = transport.take(Endpoint::HidIn) {
            trace!("Host received report {:02x?}", transfer.payload());
            stats.reports_received += 1;
            gadget.complete(Completion::completed(transfer));
        }

        if stats.frames % report_every == 0 {
            send_report(gadget, transport, stats.reports_sent as u8);
            stats.reports_sent += 1;
        }

        stats.frames += 1;
        next_frame += frame;
        let now = Instant::now();
        if next_frame > now {
            std::thread::sleep(next_frame - now);
        } else {
            next_frame = now;
        }
    }

    gadget.disable();
    info!(
        "Simulated host stopped after {} frames ({} audio bytes)",
        stats.frames, stats.audio_bytes
    );
    stats
}

/// Select alternate settings and issue the class requests a host sends
/// after enumeration
fn enumerate(gadget: &Gadget) {
    for (interface, alt) in [
        (AUDIO_CONTROL_INTERFACE, 0),
        (HID_INTERFACE, 0),
        (AUDIO_STREAMING_INTERFACE, 1),
    ] {
        if let Err(e) = gadget.set_alt(interface, alt) {
            warn!("Host could not select alt {} on interface {}: {}", alt, interface, e);
        }
    }

    let hid = u16::from(HID_INTERFACE);
    // Volume control unit 2 on the audio control interface
    let volume = 0x0200 | u16::from(AUDIO_CONTROL_INTERFACE);
    let requests = [
        ControlRequest::new(0x81, GET_DESCRIPTOR, 0x2200, hid, HID_REPORT_DESCRIPTOR.len() as u16),
        ControlRequest::new(0x21, HID_SET_IDLE, 0, hid, 0),
        ControlRequest::new(0x40, VENDOR_PROBE, 0x6400, 0, 0),
        ControlRequest::new(0x21, UAC_SET_CUR, 0x0200, volume, 2),
        ControlRequest::new(0xa1, UAC_GET_CUR, 0x0200, volume, 2),
    ];

    for req in &requests {
        match gadget.setup(req) {
            Ok(ControlOutcome::Respond(data)) => {
                debug!("Request {:02x}: {} byte response", req.request, data.len())
            }
            Ok(ControlOutcome::Ack) => debug!("Request {:02x}: ack", req.request),
            Ok(ControlOutcome::Receive { length, sink }) => {
                let data = match sink {
                    DataSink::Volume => vec![0x00, 0xf0],
                    _ => vec![0u8; length],
                };
                gadget.control_data(sink, &data[..length.min(data.len())]);
            }
            Err(e) => warn!("Request stalled: {}", e),
        }
    }
}

/// Send one output report, over interrupt OUT when armed, else SET_REPORT
fn send_report(gadget: &Gadget, transport: &LoopbackTransport, seq: u8) {
    let report = [0x05, seq, 0xa5, 0x5a];

    if let Some(transfer) = transport.take(Endpoint::HidOut) {
        gadget.complete(Completion::received(transfer, &report));
        return;
    }

    let req = ControlRequest::new(
        0x21,
        HID_SET_REPORT,
        0x0200 | u16::from(report[0]),
        u16::from(HID_INTERFACE),
        report.len() as u16,
    );
    match gadget.setup_packet(&req.encode()) {
        Ok(ControlOutcome::Receive { sink, .. }) => gadget.control_data(sink, &report),
        Ok(other) => debug!("SET_REPORT answered with {:?}", other),
        Err(e) => warn!("SET_REPORT failed: {}", e),
    }
}

/// Spawn the thread that plays a sine tone into the playback ring
pub fn spawn_tone(
    gadget: Arc<Gadget>,
    tone_hz: u32,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("tone".to_string())
        .spawn(move || {
            if let Err(e) = play_tone(&gadget, tone_hz, &stop) {
                warn!("Tone playback failed: {}", e);
            }
        })
}

fn play_tone(gadget: &Gadget, tone_hz: u32, stop: &AtomicBool) -> Result<(), PcmError> {
    let pcm = gadget.pcm();
    pcm.open()?;
    let periods = PERIODS_MAX / 4;
    let substream = pcm.hw_params(HwParams::new(PERIOD_BYTES_MAX * periods, PERIOD_BYTES_MAX))?;
    pcm.prepare()?;

    let mut tone = Tone::new(tone_hz);
    let mut chunk = vec![0u8; substream.period_bytes()];
    let mut appl = 0;
    for _ in 0..periods {
        tone.fill(&mut chunk);
        appl = substream.write_at(appl, &chunk);
    }

    pcm.trigger(TriggerCommand::Start)?;
    info!("Playing {} Hz tone", tone_hz);

    let mut seen = 0;
    while !stop.load(Ordering::SeqCst) {
        let elapsed = substream.wait_for_period(seen, Duration::from_millis(100));
        for _ in seen..elapsed {
            tone.fill(&mut chunk);
            appl = substream.write_at(appl, &chunk);
        }
        seen = elapsed;
    }

    pcm.trigger(TriggerCommand::Stop)?;
    debug!("Tone stopped after {} periods at frame {}", seen, pcm.pointer());
    pcm.hw_free()?;
    pcm.close();
    Ok(())
}

/// Stereo S16_LE sine generator
struct Tone {
    phase: f64,
    step: f64,
}

impl Tone {
    fn new(hz: u32) -> Self {
        Self {
            phase: 0.0,
            step: std::f64::consts::TAU * f64::from(hz) / f64::from(RATE),
        }
    }

    fn fill(&mut self, buf: &mut [u8]) {
        for frame in buf.chunks_exact_mut(FRAME_BYTES) {
            let sample = (self.phase.sin() * f64::from(i16::MAX) * 0.25) as i16;
            let bytes = sample.to_le_bytes();
            frame[..2].copy_from_slice(&bytes);
            frame[2..].copy_from_slice(&bytes);
            self.phase = (self.phase + self.step) % std::f64::consts::TAU;
        }
    }
}

/// Answer every inbound report with an input report carrying its payload
///
/// Returns the number of reports echoed once the handle is interrupted or
/// the channel closes.
pub fn echo_reports(handle: &HidHandle) -> u64 {
    let mut buf = vec![0u8; 1024];
    let mut echoed = 0;

    loop {
        let n = match handle.read(&mut buf) {
            Ok(n) => n,
            Err(HidError::Interrupted | HidError::Closed) => break,
            Err(e) => {
                warn!("Report read failed: {}", e);
                break;
            }
        };

        // Input report 1 carries the echo
        buf[0] = 0x01;
        match handle.write(&buf[..n]) {
            Ok(_) => echoed += 1,
            Err(HidError::Interrupted | HidError::Closed) => break,
            Err(e) => warn!("Report write failed: {}", e),
        }
    }

    debug!("Echo loop finished after {} reports", echoed);
    echoed
}

/// Counters kept by the event monitor
#[derive(Debug, Default, Clone, Copy)]
pub struct EventStats {
    pub periods: u64,
    pub reports_received: u64,
    pub reports_sent: u64,
    pub reports_dropped: u64,
    pub stalls: u64,
}

/// Log gadget events until every sender is gone
pub async fn log_events(receiver: EventReceiver) -> EventStats {
    let mut stats = EventStats::default();

    while let Ok(event) = receiver.recv().await {
        match event {
            GadgetEvent::PeriodElapsed { hw_ptr, periods } => {
                stats.periods += u64::from(periods);
                trace!("Period elapsed at {}", hw_ptr);
            }
            GadgetEvent::ReportReceived { .. } => stats.reports_received += 1,
            GadgetEvent::ReportSent { .. } => stats.reports_sent += 1,
            GadgetEvent::ReportDropped { len } => {
                stats.reports_dropped += 1;
                warn!("Inbound report of {} bytes dropped", len);
            }
            GadgetEvent::AudioStalled { slot } => {
                stats.stalls += 1;
                warn!("Audio slot {} stalled", slot);
            }
            GadgetEvent::AltSettingChanged { interface, alt } => {
                info!("Interface {} alt setting {}", interface, alt)
            }
            GadgetEvent::FunctionActivated => info!("Report channel active"),
            GadgetEvent::FunctionDeactivated => info!("Report channel inactive"),
        }
    }

    stats
}
