//! Sub-GHz pulse capture and protocol decoding
//!
//! Pipeline:
//! 1. The radio reports `(level, duration)` edges into a bounded queue
//! 2. The pulse worker thread pops them in order
//! 3. The receiver feeds every pulse to all registered protocol decoders
//! 4. The first completed frame goes to the caller's channel
//!
//! [`session::Session`] ties the stages to a radio and runs the capture until
//! interrupted.

pub mod config;
pub mod error;
pub mod protocol;
pub mod radio;
pub mod receiver;
pub mod session;
pub mod worker;

pub use error::{HalError, KeystoreError, RegistryError, SessionError, WorkerError};
pub use protocol::{DecodedFrame, DecoderState, ProtocolDecoder, ProtocolDescriptor, PulseEvent};
pub use receiver::{FrameDisposition, Receiver};
pub use session::{Interrupt, Session, SessionConfig, SessionReport};
pub use worker::{EdgeSink, PulseWorker};
