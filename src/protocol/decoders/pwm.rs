//! Generic OOK pulse-width decoder
//!
//! Frame layout (at 2 pulses per bit):
//! - Guard: a low pulse of at least `guard_min` µs
//! - Bit 0: short high + long low
//! - Bit 1: long high + short low
//!
//! When `keystore` is set the key is looked up in that keystore; without the
//! keystore attached the decoder never completes.

use std::sync::Arc;

use super::within;
use crate::protocol::{DecoderState, DecodingEnvironment, Keystore, ProtocolDecoder, PulseEvent};

/// PWM timing parameters
#[derive(Debug, Clone)]
pub struct PwmConfig {
    pub name: String,
    pub te_short: u32,
    pub te_long: u32,
    pub delta: u32,
    pub bit_count: u32,
    pub guard_min: u32,
    /// Name of the keystore required to validate keys
    pub keystore: Option<String>,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            name: "Pwm24".to_string(),
            te_short: 350,
            te_long: 1050,
            delta: 150,
            bit_count: 24,
            guard_min: 7000,
            keystore: None,
        }
    }
}

/// Pulse-width modulated frame decoder
#[derive(Debug)]
pub struct PwmDecoder {
    config: PwmConfig,
    keystore: Option<Arc<Keystore>>,
    state: DecoderState,
    high_duration: Option<u32>,
    key: u64,
    bits: u32,
    manufacturer: Option<String>,
}

impl PwmDecoder {
    pub fn new(mut config: PwmConfig, env: &DecodingEnvironment) -> Self {
        config.bit_count = config.bit_count.clamp(1, 64);
        let keystore = config.keystore.as_deref().and_then(|name| env.keystore(name));
        Self {
            config,
            keystore,
            state: DecoderState::Idle,
            high_duration: None,
            key: 0,
            bits: 0,
            manufacturer: None,
        }
    }

    fn restart(&mut self) -> DecoderState {
        self.state = DecoderState::Idle;
        self.high_duration = None;
        self.key = 0;
        self.bits = 0;
        self.manufacturer = None;
        self.state
    }

    fn is_short(&self, duration: u32) -> bool {
        within(duration, self.config.te_short, self.config.delta)
    }

    fn is_long(&self, duration: u32) -> bool {
        within(duration, self.config.te_long, self.config.delta)
    }

    fn classify(&self, high: u32, low: u32) -> Option<bool> {
        if self.is_short(high) && self.is_long(low) {
            Some(false)
        } else if self.is_long(high) && self.is_short(low) {
            Some(true)
        } else {
            None
        }
    }

    /// Check the collected key, returning the next state
    fn finish(&mut self) -> DecoderState {
        match (&self.config.keystore, &self.keystore) {
            (None, _) => {}
            (Some(_), None) => return self.restart(),
            (Some(_), Some(keystore)) => {
                self.manufacturer = Some(
                    keystore
                        .lookup(self.key)
                        .map(|e| e.name.clone())
                        .unwrap_or_else(|| "Unknown".to_string()),
                );
            }
        }
        self.state = DecoderState::Complete;
        self.state
    }
}

impl ProtocolDecoder for PwmDecoder {
    fn feed(&mut self, pulse: PulseEvent) -> DecoderState {
        match self.state {
            DecoderState::Complete => self.state,
            DecoderState::Idle => {
                if !pulse.level && pulse.duration >= self.config.guard_min {
                    self.state = DecoderState::Syncing;
                }
                self.state
            }
            DecoderState::Syncing => {
                if pulse.level && (self.is_short(pulse.duration) || self.is_long(pulse.duration)) {
                    self.high_duration = Some(pulse.duration);
                    self.state = DecoderState::Accumulating;
                    self.state
                } else if !pulse.level && pulse.duration >= self.config.guard_min {
                    // Back-to-back guard gaps
                    self.state
                } else {
                    self.restart()
                }
            }
            DecoderState::Accumulating => match (pulse.level, self.high_duration) {
                (true, None) => {
                    self.high_duration = Some(pulse.duration);
                    self.state
                }
                (false, Some(high)) => {
                    self.high_duration = None;
                    let Some(bit) = self.classify(high, pulse.duration) else {
                        return self.restart();
                    };
                    self.key = (self.key << 1) | u64::from(bit);
                    self.bits += 1;
                    if self.bits == self.config.bit_count {
                        self.finish()
                    } else {
                        self.state
                    }
                }
                _ => self.restart(),
            },
        }
    }

    fn reset(&mut self) {
        self.restart();
    }

    fn state(&self) -> DecoderState {
        self.state
    }

    fn render(&self) -> Option<String> {
        if self.state != DecoderState::Complete {
            return None;
        }
        let byte_len = self.config.bit_count.div_ceil(8) as usize;
        let bytes = self.key.to_be_bytes();
        let mut text = format!(
            "{} {}bit Key:0x{}",
            self.config.name,
            self.config.bit_count,
            hex::encode_upper(&bytes[8 - byte_len..])
        );
        if let Some(manufacturer) = &self.manufacturer {
            text.push_str(&format!(" Mf:{}", manufacturer));
        }
        Some(text)
    }
}
