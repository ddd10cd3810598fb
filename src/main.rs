//! Sub-GHz capture - streams decoded remote-control frames
//!
//! Usage: `subghz-capture rx [frequency in Hz]`
//!
//! Replays the raw capture named by `SUBGHZ_REPLAY_PATH` through the decoding
//! pipeline and prints one line per decoded frame until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use subghz_capture::config::{Config, OutputFormat};
use subghz_capture::protocol::decoders::builtin_registry;
use subghz_capture::radio::{is_frequency_valid, NoopPower, ReplayRadio, FREQUENCY_RANGE_STR};
use subghz_capture::{DecodedFrame, Interrupt, Session};

fn print_usage() {
    println!("Usage:");
    println!("subghz-capture <cmd> <args>");
    println!("Cmd list:");
    println!("\trx <frequency in Hz>\t - Receive signal");
}

/// Frequency requested by `rx [frequency]`, `None` after printing a usage hint
fn parse_rx_args(args: &[String], default_frequency: u32) -> Option<u32> {
    match args {
        [] => Some(default_frequency),
        [frequency] => match frequency.trim().parse::<u32>() {
            Ok(frequency) => Some(frequency),
            Err(_) => {
                println!("Usage: subghz-capture rx <Frequency in Hz>, got '{}'", frequency);
                None
            }
        },
        _ => {
            print_usage();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env();
    let args: Vec<String> = std::env::args().skip(1).collect();

    let frequency = match args.split_first() {
        Some((cmd, rest)) if cmd == "rx" => match parse_rx_args(rest, config.frequency) {
            Some(frequency) => frequency,
            None => return Ok(()),
        },
        _ => {
            print_usage();
            return Ok(());
        }
    };

    if !is_frequency_valid(frequency) {
        println!(
            "Frequency must be in {} range, not {}",
            FREQUENCY_RANGE_STR, frequency
        );
        return Ok(());
    }

    info!("===========================================");
    info!("   Sub-GHz Capture");
    info!("===========================================");
    info!("Configuration:");
    info!("  Frequency: {} Hz", frequency);
    info!("  Replay capture: {:?}", config.replay_path);
    info!("  Queue capacity: {} edges", config.queue_capacity);
    info!("  Output: {:?}", config.output);

    let replay_path = config
        .replay_path
        .clone()
        .context("SUBGHZ_REPLAY_PATH is not set; no radio input available")?;
    let radio = ReplayRadio::from_file(&replay_path)?
        .realtime(config.replay_realtime)
        .repeat(config.replay_repeat);

    let registry = Arc::new(builtin_registry()?);
    let mut session = Session::new(radio, NoopPower, registry, config.session_config(frequency));

    // Print decoded frames as they arrive
    let (frame_tx, frame_rx) = mpsc::channel::<DecodedFrame>(100);
    let output = config.output;
    let printer = tokio::spawn(async move {
        let mut frames = ReceiverStream::new(frame_rx);
        while let Some(frame) = frames.next().await {
            match output {
                OutputFormat::Text => println!("{}", frame),
                OutputFormat::Json => match serde_json::to_string(&frame) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Failed to encode frame: {}", e),
                },
            }
        }
    });

    // Ctrl+C requests a cooperative stop
    let interrupt = Interrupt::new();
    let on_signal = interrupt.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        on_signal.trigger();
    });

    let report = match session.run(frame_tx, &interrupt).await {
        Ok(report) => report,
        Err(e) => {
            error!("Capture session failed: {}", e);
            return Err(e.into());
        }
    };

    // Channel closes once the session has dropped its receiver
    let _ = printer.await;

    info!(
        "Shutdown complete. Frames decoded: {}, pulses: {}, overruns: {}",
        report.frames_decoded, report.worker.pulses_delivered, report.worker.overruns
    );
    Ok(())
}
