//! Radio hardware interface
//!
//! The pipeline only needs a small capability contract from the receiver
//! chip: reset, preset, tuning, input pin setup, async edge reporting, sleep.
//! [`ReplayRadio`] implements it on the host by replaying a raw timing
//! capture.

mod bands;
mod hal;
mod replay;

pub use bands::{is_frequency_valid, FREQUENCY_RANGE_STR, SUB_BANDS};
pub use hal::{NoopPower, PowerPolicy, Preset, RadioHal};
pub use replay::{parse_raw_capture, ReplayRadio};
