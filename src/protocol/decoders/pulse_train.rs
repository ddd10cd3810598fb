//! Symmetric pulse train recogniser
//!
//! Matches `repetitions` consecutive `(high te, low te)` pairs, the shape of
//! most OOK preambles.

use super::within;
use crate::protocol::{DecoderState, ProtocolDecoder, PulseEvent};

/// Recognises a run of equal-width high/low pairs
#[derive(Debug, Clone)]
pub struct PulseTrainDecoder {
    te: u32,
    delta: u32,
    repetitions: u32,
    state: DecoderState,
    pairs: u32,
    awaiting_low: bool,
    total_duration: u64,
}

impl PulseTrainDecoder {
    /// Tolerance defaults to 30% of `te`
    pub fn new(te: u32, repetitions: u32) -> Self {
        Self::with_tolerance(te, te * 3 / 10, repetitions)
    }

    pub fn with_tolerance(te: u32, delta: u32, repetitions: u32) -> Self {
        Self {
            te,
            delta,
            repetitions: repetitions.max(1),
            state: DecoderState::Idle,
            pairs: 0,
            awaiting_low: false,
            total_duration: 0,
        }
    }

    fn matches(&self, pulse: PulseEvent, level: bool) -> bool {
        pulse.level == level && within(pulse.duration, self.te, self.delta)
    }

    fn restart(&mut self) -> DecoderState {
        self.state = DecoderState::Idle;
        self.pairs = 0;
        self.awaiting_low = false;
        self.total_duration = 0;
        self.state
    }

    fn close_pair(&mut self) {
        self.pairs += 1;
        self.awaiting_low = false;
        self.state = if self.pairs >= self.repetitions {
            DecoderState::Complete
        } else {
            DecoderState::Accumulating
        };
    }
}

impl ProtocolDecoder for PulseTrainDecoder {
    fn feed(&mut self, pulse: PulseEvent) -> DecoderState {
        match self.state {
            DecoderState::Complete => return self.state,
            DecoderState::Idle => {
                if self.matches(pulse, true) {
                    self.state = DecoderState::Syncing;
                    self.awaiting_low = true;
                    self.total_duration = pulse.duration as u64;
                }
                return self.state;
            }
            DecoderState::Syncing | DecoderState::Accumulating => {}
        }

        let expected_level = !self.awaiting_low;
        if !self.matches(pulse, expected_level) {
            return self.restart();
        }

        self.total_duration += pulse.duration as u64;
        if self.awaiting_low {
            self.close_pair();
        } else {
            self.awaiting_low = true;
        }
        self.state
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
        let avg = self.total_duration / (2 * self.pairs as u64);
        Some(format!(
            "PulseTrain {} pairs te:{}us avg:{}us",
            self.pairs, self.te, avg
        ))
    }
}
