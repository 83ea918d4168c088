//! accessory-gadget
//!
//! Runs the accessory gadget engine against a simulated USB host on the
//! loopback transport: a generated tone is played through the isochronous
//! pump and host reports are echoed back through the report channel.

mod sim;

use anyhow::{Context, Result};
use clap::Parser;
use common::{LoopbackTransport, create_event_channel, setup_logging};
use gadget::{Gadget, GadgetConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "accessory-gadget")]
#[command(
    author,
    version,
    about = "USB accessory gadget - audio playback and report channel"
)]
#[command(long_about = "
Device side of a USB composite accessory: isochronous audio playback towards
the host plus a bidirectional report channel. This binary drives the engine
with a simulated host on an in-process loopback transport.

EXAMPLES:
    # Run until Ctrl-C with default config
    accessory-gadget

    # Run for ten seconds with debug logging
    accessory-gadget --duration 10 --log-level debug

CONFIGURATION:
    The gadget looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/accessory-gadget/gadget.toml
    3. /etc/accessory-gadget/gadget.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Stop after this many seconds (0 = run until Ctrl-C)
    #[arg(short, long, value_name = "SECS")]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = GadgetConfig::default();
        let path = GadgetConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        gadget::config::load_config(path).context("Failed to load configuration")?
    } else {
        GadgetConfig::load_or_default()
    };
    if let Some(secs) = args.duration {
        config.simulation.duration_secs = secs;
    }

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.gadget.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("accessory-gadget v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    if let Err(e) = run(config).await {
        error!("Gadget error: {:#}", e);
        return Err(e);
    }

    info!("Gadget shutdown complete");
    Ok(())
}

async fn run(config: GadgetConfig) -> Result<()> {
    let (events, receiver) = create_event_channel(1024);
    let transport = Arc::new(LoopbackTransport::new(config.gadget.link_speed));
    let gadget = Arc::new(
        Gadget::bind(
            &config,
            transport.clone(),
            Arc::new(sim::SimRegistrar),
            events,
        )
        .context("Failed to bind gadget")?,
    );
    let monitor = tokio::spawn(sim::log_events(receiver));

    let handle = Arc::new(
        gadget
            .open_hid(false)
            .context("Failed to open report channel")?,
    );
    let echo = tokio::task::spawn_blocking({
        let handle = handle.clone();
        move || sim::echo_reports(&handle)
    });

    let stop = Arc::new(AtomicBool::new(false));
    let host = sim::spawn_host(
        gadget.clone(),
        transport,
        config.simulation.clone(),
        stop.clone(),
    )
    .context("Failed to spawn simulated host")?;
    let tone = sim::spawn_tone(gadget.clone(), config.simulation.tone_hz, stop.clone())
        .context("Failed to spawn tone generator")?;

    let duration_secs = config.simulation.duration_secs;
    let run_for = async {
        if duration_secs == 0 {
            std::future::pending::<()>().await
        } else {
            tokio::time::sleep(Duration::from_secs(duration_secs)).await
        }
    };

    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Received Ctrl-C, shutting down...");
        }
        _ = run_for => {
            info!("Simulation finished after {}s", duration_secs);
        }
    }

    stop.store(true, Ordering::SeqCst);
    let host_stats = host.join().unwrap_or_else(|_| {
        error!("Simulated host panicked");
        Default::default()
    });
    if tone.join().is_err() {
        error!("Tone thread panicked");
    }

    handle.interrupt();
    let echoed = echo.await.context("Echo task failed")?;
    drop(handle);

    match Arc::try_unwrap(gadget) {
        Ok(gadget) => gadget.unbind(),
        Err(_) => warn!("Gadget still referenced at shutdown"),
    }

    match tokio::time::timeout(Duration::from_secs(1), monitor).await {
        Ok(Ok(stats)) => info!(
            "Events: {} periods, {} reports in, {} reports out, {} dropped, {} stalls",
            stats.periods,
            stats.reports_received,
            stats.reports_sent,
            stats.reports_dropped,
            stats.stalls
        ),
        Ok(Err(e)) => warn!("Event monitor failed: {}", e),
        Err(_) => warn!("Event monitor did not finish"),
    }

    info!(
        "Host: {} frames, {} audio bytes, {} reports received, {} sent; {} echoed",
        host_stats.frames,
        host_stats.audio_bytes,
        host_stats.reports_received,
        host_stats.reports_sent,
        echoed
    );
    Ok(())
}
