//! Built-in generic decoders
//!
//! These are parametric pulse-shape recognisers, not implementations of any
//! vendor protocol. Third-party decoders plug in the same way through
//! [`ProtocolDescriptor`].

mod pulse_train;
mod pwm;

pub use pulse_train::PulseTrainDecoder;
pub use pwm::{PwmConfig, PwmDecoder};

use super::{ProtocolDescriptor, ProtocolFlags, ProtocolRegistry};
use crate::error::RegistryError;

/// True if `duration` is within `delta` of `target`
#[inline]
pub(crate) fn within(duration: u32, target: u32, delta: u32) -> bool {
    duration.abs_diff(target) <= delta
}

/// Default catalogue used by the `rx` command
pub fn builtin_registry() -> Result<ProtocolRegistry, RegistryError> {
    let pwm = PwmConfig::default();
    ProtocolRegistry::new(vec![
        ProtocolDescriptor::new(
            "PulseTrain",
            ProtocolFlags::DECODABLE | ProtocolFlags::AM | ProtocolFlags::TRANSMIT_UNSUPPORTED,
            |_| Box::new(PulseTrainDecoder::new(350, 24)),
        ),
        ProtocolDescriptor::new(
            pwm.name.clone(),
            ProtocolFlags::DECODABLE | ProtocolFlags::AM,
            move |env| Box::new(PwmDecoder::new(pwm.clone(), env)),
        ),
    ])
}
