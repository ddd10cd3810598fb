//! Receiver - fans every pulse out to all registered decoders
//!
//! Decoders run in registry order against the same pulse. The first decoder
//! to reach `Complete` on a given pulse wins and is reported through the
//! result callback; the callback's [`FrameDisposition`] decides whether the
//! receiver starts searching for a new frame.

use tracing::{debug, trace};

use crate::protocol::{
    DecodedFrame, DecoderState, DecodingEnvironment, ProtocolDecoder, ProtocolDescriptor,
    ProtocolFlags, PulseEvent,
};

/// What the receiver does after a frame was handed to the callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Frame consumed, reset every decoder
    Reset,
    /// Leave decoders as they are
    Keep,
}

type ResultCallback = Box<dyn FnMut(&DecodedFrame) -> FrameDisposition + Send>;

/// Receiver counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverStats {
    pub pulses_fed: u64,
    pub frames_decoded: u64,
    pub resets: u64,
}

struct DecoderSlot {
    descriptor: ProtocolDescriptor,
    decoder: Box<dyn ProtocolDecoder>,
    state: DecoderState,
}

/// One decoder instance per registered protocol plus the result callback
pub struct Receiver {
    slots: Vec<DecoderSlot>,
    filter: ProtocolFlags,
    callback: Option<ResultCallback>,
    stats: ReceiverStats,
}

impl Receiver {
    /// Create a receiver feeding every registered protocol
    pub fn new(env: &DecodingEnvironment) -> Self {
        let slots = env
            .registry()
            .iter()
            .map(|descriptor| DecoderSlot {
                descriptor: descriptor.clone(),
                decoder: descriptor.build(env),
                state: DecoderState::Idle,
            })
            .collect::<Vec<_>>();

        debug!("Receiver created with {} decoders", slots.len());

        Self {
            slots,
            filter: ProtocolFlags::ALL,
            callback: None,
            stats: ReceiverStats::default(),
        }
    }

    /// Create a receiver that only feeds protocols matching `filter`
    pub fn with_filter(env: &DecodingEnvironment, filter: ProtocolFlags) -> Self {
        let mut receiver = Self::new(env);
        receiver.set_filter(filter);
        receiver
    }

    /// Restrict fed protocols to those sharing a flag with `filter`
    pub fn set_filter(&mut self, filter: ProtocolFlags) {
        self.filter = filter;
    }

    pub fn filter(&self) -> ProtocolFlags {
        self.filter
    }

    /// Register the result callback (last registration wins)
    pub fn set_result_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&DecodedFrame) -> FrameDisposition + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Feed one pulse to every matching decoder.
    ///
    /// Returns the frame reported to the callback, if any. At most one frame
    /// is reported per call.
    pub fn feed(&mut self, pulse: PulseEvent) -> Option<DecodedFrame> {
        self.stats.pulses_fed += 1;

        let mut winner: Option<(usize, String)> = None;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if !slot.descriptor.flags().intersects(self.filter) {
                continue;
            }
            let previous = slot.state;
            slot.state = slot.decoder.feed(pulse);
            if slot.state != DecoderState::Complete || previous == DecoderState::Complete {
                continue;
            }
            trace!("Decoder '{}' completed a frame", slot.descriptor.name());
            if winner.is_some() {
                continue;
            }
            match slot.decoder.render() {
                Some(text) => winner = Some((index, text)),
                None => {
                    debug!(
                        "Decoder '{}' completed without a renderable frame, resetting it",
                        slot.descriptor.name()
                    );
                    slot.decoder.reset();
                    slot.state = slot.decoder.state();
                }
            }
        }

        let (index, text) = winner?;
        let slot = &self.slots[index];
        let frame = DecodedFrame::new(slot.descriptor.name(), text);
        self.stats.frames_decoded += 1;

        let disposition = match self.callback.as_mut() {
            Some(callback) => callback(&frame),
            None => FrameDisposition::Keep,
        };
        if disposition == FrameDisposition::Reset {
            self.reset();
        }
        Some(frame)
    }

    /// Put every decoder back into Idle
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.decoder.reset();
            slot.state = slot.decoder.state();
        }
        self.stats.resets += 1;
    }

    /// Frames currently held by completed decoders, in registry order
    pub fn completed_frames(&self) -> Vec<DecodedFrame> {
        self.slots
            .iter()
            .filter(|slot| slot.state == DecoderState::Complete)
            .filter_map(|slot| {
                slot.decoder
                    .render()
                    .map(|text| DecodedFrame::new(slot.descriptor.name(), text))
            })
            .collect()
    }

    /// Current state of every decoder, in registry order
    pub fn states(&self) -> impl Iterator<Item = (&str, DecoderState)> {
        self.slots
            .iter()
            .map(|slot| (slot.descriptor.name(), slot.decoder.state()))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }
}
