//! Decoder plugin contract
//!
//! A protocol is described by a [`ProtocolDescriptor`]: a unique name, a set of
//! capability flags and a constructor producing a fresh [`ProtocolDecoder`].
//! Decoders consume [`PulseEvent`]s one at a time and walk the
//! Idle → Syncing → Accumulating → Complete state machine.

pub mod decoders;
mod environment;
mod keystore;
mod registry;

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use serde::Serialize;

pub use environment::DecodingEnvironment;
pub use keystore::{KeyEntry, Keystore, KeystoreSource, StaticKeystore};
pub use registry::ProtocolRegistry;

/// One edge-to-edge interval of the demodulated signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseEvent {
    /// Signal level during the interval
    pub level: bool,
    /// Interval length in microseconds
    pub duration: u32,
}

impl PulseEvent {
    pub const fn high(duration: u32) -> Self {
        Self { level: true, duration }
    }

    pub const fn low(duration: u32) -> Self {
        Self { level: false, duration }
    }
}

/// Decoder state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Searching for the start of a frame
    Idle,
    /// Start pattern partially seen
    Syncing,
    /// Collecting frame content
    Accumulating,
    /// A full, validated frame is held until reset
    Complete,
}

/// Protocol capability bit set
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProtocolFlags(u32);

impl ProtocolFlags {
    pub const NONE: Self = Self(0);
    pub const DECODABLE: Self = Self(1 << 0);
    pub const TRANSMIT_UNSUPPORTED: Self = Self(1 << 1);
    pub const AM: Self = Self(1 << 2);
    pub const FM: Self = Self(1 << 3);
    /// Rolling-code protocols that need manufacturer keys
    pub const DYNAMIC: Self = Self(1 << 4);
    pub const ALL: Self = Self(u32::MAX);

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set in `self`
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit is shared
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ProtocolFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for ProtocolFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ALL {
            return f.write_str("ProtocolFlags(ALL)");
        }
        let names = [
            (Self::DECODABLE, "DECODABLE"),
            (Self::TRANSMIT_UNSUPPORTED, "TRANSMIT_UNSUPPORTED"),
            (Self::AM, "AM"),
            (Self::FM, "FM"),
            (Self::DYNAMIC, "DYNAMIC"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "ProtocolFlags({})", set.join(" | "))
    }
}

/// Per-protocol pulse state machine implemented by decoder plugins.
///
/// `feed` must never fail: a pulse that does not fit the expected format puts
/// the decoder back to [`DecoderState::Idle`]. Once `Complete`, the decoder
/// keeps its frame and ignores pulses until [`ProtocolDecoder::reset`].
pub trait ProtocolDecoder: Send {
    fn feed(&mut self, pulse: PulseEvent) -> DecoderState;

    fn reset(&mut self);

    fn state(&self) -> DecoderState;

    /// Text form of the held frame, `None` unless `Complete`
    fn render(&self) -> Option<String>;
}

type DecoderConstructor = dyn Fn(&DecodingEnvironment) -> Box<dyn ProtocolDecoder> + Send + Sync;

/// Registry entry describing one protocol
#[derive(Clone)]
pub struct ProtocolDescriptor {
    name: String,
    flags: ProtocolFlags,
    constructor: Arc<DecoderConstructor>,
}

impl ProtocolDescriptor {
    pub fn new<F>(name: impl Into<String>, flags: ProtocolFlags, constructor: F) -> Self
    where
        F: Fn(&DecodingEnvironment) -> Box<dyn ProtocolDecoder> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            flags,
            constructor: Arc::new(constructor),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> ProtocolFlags {
        self.flags
    }

    /// Build a fresh decoder in the Idle state
    pub fn build(&self, env: &DecodingEnvironment) -> Box<dyn ProtocolDecoder> {
        (self.constructor)(env)
    }
}

impl fmt::Debug for ProtocolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolDescriptor")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Frame handed to the result callback
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedFrame {
    pub protocol: String,
    pub text: String,
    pub timestamp_ms: i64,
}

impl DecodedFrame {
    pub fn new(protocol: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            text: text.into(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl fmt::Display for DecodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}
