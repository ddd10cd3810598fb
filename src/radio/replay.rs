//! Raw timing replay radio
//!
//! Replays a raw capture as if its pulses were arriving from the receiver's
//! demodulator pin. Capture format: any number of `RAW_Data:` lines holding
//! signed durations in microseconds, positive for high and negative for low.
//! Other lines (headers, comments) are ignored.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::hal::{Preset, RadioHal};
use crate::error::HalError;
use crate::worker::EdgeSink;

const RAW_PREFIX: &str = "RAW_Data:";

/// Longest uninterrupted sleep while pacing, bounds how late a stop is seen
const MAX_PACE_SLEEP: Duration = Duration::from_millis(50);

/// Parse a raw timing capture into signed durations
pub fn parse_raw_capture(text: &str) -> Result<Vec<i32>> {
    let mut pulses = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let Some(data) = line.trim().strip_prefix(RAW_PREFIX) else {
            continue;
        };
        for token in data.split_whitespace() {
            let value: i32 = token
                .parse()
                .with_context(|| format!("Invalid duration '{}' on line {}", token, line_no + 1))?;
            if value == 0 {
                bail!("Zero duration on line {}", line_no + 1);
            }
            pulses.push(value);
        }
    }
    if pulses.is_empty() {
        bail!("Capture contains no {} lines", RAW_PREFIX);
    }
    Ok(pulses)
}

/// Host-side radio that replays a capture from a background thread
pub struct ReplayRadio {
    pulses: Arc<Vec<i32>>,
    realtime: bool,
    repeat: u32,
    preset: Option<Preset>,
    frequency: Option<u32>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReplayRadio {
    pub fn new(pulses: Vec<i32>) -> Self {
        Self {
            pulses: Arc::new(pulses),
            realtime: true,
            repeat: 1,
            preset: None,
            frequency: None,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Load a capture file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read capture {}", path.display()))?;
        let pulses = parse_raw_capture(&text)
            .with_context(|| format!("Failed to parse capture {}", path.display()))?;
        info!("Loaded {} pulses from {}", pulses.len(), path.display());
        Ok(Self::new(pulses))
    }

    /// Pace edges with their recorded durations (default) or push them at once
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Number of times the capture is played back
    pub fn repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.pulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }
}

impl RadioHal for ReplayRadio {
    fn reset(&mut self) -> Result<(), HalError> {
        debug!("Replay radio reset");
        self.preset = None;
        self.frequency = None;
        Ok(())
    }

    fn load_preset(&mut self, preset: Preset) -> Result<(), HalError> {
        debug!("Replay radio preset {}", preset);
        self.preset = Some(preset);
        Ok(())
    }

    fn set_frequency_and_path(&mut self, frequency: u32) -> Result<u32, HalError> {
        if !self.is_frequency_valid(frequency) {
            return Err(HalError::Fault(format!("Cannot tune to {} Hz", frequency)));
        }
        self.frequency = Some(frequency);
        Ok(frequency)
    }

    fn configure_input_pin(&mut self) -> Result<(), HalError> {
        Ok(())
    }

    fn rx(&mut self) -> Result<(), HalError> {
        if self.frequency.is_none() {
            return Err(HalError::Fault("Receive requested before tuning".to_string()));
        }
        Ok(())
    }

    fn start_async_rx(&mut self, sink: EdgeSink) -> Result<(), HalError> {
        if self.thread.is_some() {
            return Err(HalError::Busy("Async receive already started".to_string()));
        }

        self.stop.store(false, Ordering::SeqCst);
        let pulses = self.pulses.clone();
        let stop = self.stop.clone();
        let realtime = self.realtime;
        let repeat = self.repeat;

        let handle = thread::Builder::new()
            .name("subghz-replay".to_string())
            .spawn(move || replay(&pulses, &sink, &stop, realtime, repeat))
            .map_err(|e| HalError::Fault(format!("Failed to spawn replay thread: {}", e)))?;

        self.thread = Some(handle);
        Ok(())
    }

    fn stop_async_rx(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Replay thread panicked");
            }
        }
    }

    fn sleep(&mut self) {
        debug!("Replay radio sleeping");
    }
}

impl Drop for ReplayRadio {
    fn drop(&mut self) {
        self.stop_async_rx();
    }
}

/// Replay loop (runs in dedicated thread)
fn replay(pulses: &[i32], sink: &EdgeSink, stop: &AtomicBool, realtime: bool, repeat: u32) {
    // Sleep granularity is far coarser than a pulse, so pace in batches
    const PACE_STEP_US: u64 = 2_000;
    let mut pending_us = 0u64;

    for pass in 0..repeat {
        debug!("Replay pass {}/{}", pass + 1, repeat);
        for &value in pulses {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            let duration = value.unsigned_abs();
            sink.push_edge(value > 0, duration);

            if realtime {
                pending_us += duration as u64;
                if pending_us >= PACE_STEP_US {
                    if !pace(Duration::from_micros(pending_us), stop) {
                        return;
                    }
                    pending_us = 0;
                }
            }
        }
    }
    info!("Replay finished ({} pulses x {})", pulses.len(), repeat);
}

/// Sleep for `delay` in short steps; false if a stop was requested meanwhile
fn pace(delay: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(MAX_PACE_SLEEP));
    }
}
