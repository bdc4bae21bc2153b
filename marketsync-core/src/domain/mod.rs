//! Domain types: bars, frequencies, ranges, security metadata.

pub mod bar;
pub mod frequency;
pub mod range;
pub mod security;

pub use bar::Bar;
pub use frequency::{Frequency, FrequencyParseError};
pub use range::Range;
pub use security::SecurityInfo;
