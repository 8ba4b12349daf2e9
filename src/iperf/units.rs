//! Bandwidth unit conversion
//!
//! iperf3 reports throughput in bits per second, either as a raw number in the
//! JSON stream or as a `"<number> <K|M|G>bits/sec"` token in its text output.
//! Everything handed to a viewer is scaled to the unit selected for the run.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Matches the legacy `"<number> <K|M|G>bits/sec"` throughput token
static BANDWIDTH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(K|M|G)bits/sec").expect("bandwidth token pattern is valid")
});

/// Display unit for bandwidth samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandwidthUnit {
    /// Kilobits per second (10^3)
    #[serde(rename = "Kbits")]
    Kilo,
    /// Megabits per second (10^6)
    #[default]
    #[serde(rename = "Mbits")]
    Mega,
    /// Gigabits per second (10^9)
    #[serde(rename = "Gbits")]
    Giga,
}

impl BandwidthUnit {
    /// Resolves a unit label the way the web client sends it.
    ///
    /// Accepts `Kbits`/`Mbits`/`Gbits` and the `Kbps`/`Mbps`/`Gbps` aliases.
    /// Anything else, including an empty label, resolves to [`BandwidthUnit::Mega`].
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Kbits" | "Kbps" => BandwidthUnit::Kilo,
            "Mbits" | "Mbps" => BandwidthUnit::Mega,
            "Gbits" | "Gbps" => BandwidthUnit::Giga,
            _ => BandwidthUnit::Mega,
        }
    }

    /// Resolves the single-letter SI prefix used in iperf3 text output
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_uppercase().as_str() {
            "K" => Some(BandwidthUnit::Kilo),
            "M" => Some(BandwidthUnit::Mega),
            "G" => Some(BandwidthUnit::Giga),
            _ => None,
        }
    }

    /// Number of bits per second in one unit
    pub fn factor(self) -> f64 {
        match self {
            BandwidthUnit::Kilo => 1_000.0,
            BandwidthUnit::Mega => 1_000_000.0,
            BandwidthUnit::Giga => 1_000_000_000.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BandwidthUnit::Kilo => "Kbits",
            BandwidthUnit::Mega => "Mbits",
            BandwidthUnit::Giga => "Gbits",
        }
    }
}

impl fmt::Display for BandwidthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Converts `value` expressed in `from` into `to`
///
/// ```
/// use iperf_watcher::iperf::units::{convert, BandwidthUnit};
///
/// assert_eq!(convert(1000.0, BandwidthUnit::Kilo, BandwidthUnit::Mega), 1.0);
/// ```
pub fn convert(value: f64, from: BandwidthUnit, to: BandwidthUnit) -> f64 {
    value * from.factor() / to.factor()
}

/// Scales a raw bits-per-second figure into `unit`
pub fn bits_per_second_to(bits_per_second: f64, unit: BandwidthUnit) -> f64 {
    bits_per_second / unit.factor()
}

/// Extracts the first `"<number> <K|M|G>bits/sec"` token from `text` as bits per second
///
/// Returns `None` when the text carries no throughput token.
pub fn parse_bandwidth(text: &str) -> Option<f64> {
    let captures = BANDWIDTH_TOKEN.captures(text.trim())?;
    let number: f64 = captures.get(1)?.as_str().parse().ok()?;
    let source = BandwidthUnit::from_prefix(captures.get(2)?.as_str())?;
    Some(number * source.factor())
}

/// Converts a textual throughput token into `target`
///
/// Unparsable input yields `0.0`, which callers cannot tell apart from a genuine
/// zero-bandwidth reading. New code should prefer [`parse_bandwidth`].
pub fn convert_text(text: &str, target: BandwidthUnit) -> f64 {
    parse_bandwidth(text)
        .map(|bps| bits_per_second_to(bps, target))
        .unwrap_or(0.0)
}
