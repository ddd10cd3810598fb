//! Hardware capability contract

use std::fmt;

use tracing::debug;

use super::bands;
use crate::error::HalError;
use crate::worker::EdgeSink;

/// Modulation presets the receiver can load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// OOK, 270 kHz bandwidth
    Ook270Async,
    /// OOK, 650 kHz bandwidth
    #[default]
    Ook650Async,
    /// 2-FSK, 2.38 kHz deviation
    TwoFsk238Async,
    /// 2-FSK, 47.6 kHz deviation
    TwoFsk476Async,
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ook270Async => "AM270",
            Self::Ook650Async => "AM650",
            Self::TwoFsk238Async => "FM238",
            Self::TwoFsk476Async => "FM476",
        };
        f.write_str(name)
    }
}

/// Receiver chip operations used by a capture session
pub trait RadioHal {
    fn reset(&mut self) -> Result<(), HalError>;

    fn load_preset(&mut self, preset: Preset) -> Result<(), HalError>;

    /// Tune and select the RF path, returning the frequency actually set
    fn set_frequency_and_path(&mut self, frequency: u32) -> Result<u32, HalError>;

    /// Configure the demodulator output pin as a plain input
    fn configure_input_pin(&mut self) -> Result<(), HalError>;

    /// Switch the chip into receive mode
    fn rx(&mut self) -> Result<(), HalError>;

    /// Start reporting edges to `sink` from the edge context
    fn start_async_rx(&mut self, sink: EdgeSink) -> Result<(), HalError>;

    fn stop_async_rx(&mut self);

    fn sleep(&mut self);

    fn is_frequency_valid(&self, frequency: u32) -> bool {
        bands::is_frequency_valid(frequency)
    }
}

/// Power-saving policy that must be held off while capturing
pub trait PowerPolicy {
    fn suppress_enter(&mut self);

    fn suppress_exit(&mut self);
}

/// Power policy for hosts without one
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPower;

impl PowerPolicy for NoopPower {
    fn suppress_enter(&mut self) {
        debug!("Power saving suppressed");
    }

    fn suppress_exit(&mut self) {
        debug!("Power saving restored");
    }
}
