//! iperf3 output handling
//!
//! - `units`: bandwidth unit conversion
//! - `decode`: byte-to-text decoding tolerant of mixed encodings
//! - `json_stream`: `--json-stream` record parsing
//! - `classifier`: turning output lines into normalized events

pub mod classifier;
pub mod decode;
pub mod json_stream;
pub mod units;

#[cfg(test)]
mod tests;

pub use classifier::{Event, IperfClassifier, LineClassifier};
pub use decode::decode_output;
pub use units::BandwidthUnit;
