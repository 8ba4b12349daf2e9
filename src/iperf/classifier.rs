//! Line classification for iperf3 output
//!
//! Every decoded, trimmed, non-empty output line becomes at most one [`Event`].
//! Lines that parse as JSON objects follow the `--json-stream` protocol; all
//! other lines go through ordered pattern checks over the human-readable output
//! older iperf3 builds (and error paths of current ones) still produce.
//!
//! The rules live behind [`LineClassifier`] so the worker and the stream server
//! never depend on the matching details.

use log::trace;
use regex::Regex;
use std::sync::LazyLock;

use crate::iperf::json_stream::{StreamRecord, extract_bits_per_second, parse_record, payload_text};
use crate::iperf::units::{BandwidthUnit, bits_per_second_to, parse_bandwidth};

/// A bare sample value, as forwarded by earlier pipeline stages
static BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").expect("number pattern is valid"));

/// Control markers passed through verbatim
const CONTROL_PREFIXES: [&str; 3] = ["CMD:", "LOGFILE:", "WORKER:"];

/// Phrases iperf3 uses when a run cannot continue
const FATAL_PHRASES: [&str; 5] = [
    "unable to connect",
    "connection refused",
    "timed out",
    "failed",
    "no route",
];

/// Marker iperf3 puts on lines aggregating all parallel streams
const SUMMARY_MARKER: &str = "[SUM]";

/// Normalized output of a measurement run
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Command line, log path and worker lifecycle markers
    Info(String),
    /// Bandwidth already scaled to the run's unit
    Sample(f64),
    /// Fatal condition; nothing useful follows
    Error(String),
    /// The server is serving another client; not fatal
    Busy,
    /// Unclassified text
    Raw(String),
}

impl Event {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Error(_))
    }
}

/// Replaceable classification rules
pub trait LineClassifier: Send + Sync {
    /// Classifies one trimmed, non-empty line; `None` means the line is dropped
    fn classify(&mut self, line: &str) -> Option<Event>;
}

/// Classifies `line` for a run measured in `unit` with `stream_count` parallel streams
///
/// `last_sample` is the most recent sample emitted for the run. It is re-emitted
/// for per-stream legacy lines when several streams run in parallel, so only
/// the `[SUM]` line moves the displayed value.
pub fn classify(line: &str, unit: BandwidthUnit, stream_count: u32, last_sample: f64) -> Option<Event> {
    match parse_record(line) {
        Some(record) => classify_record(record, unit),
        None => Some(classify_text(line, unit, stream_count, last_sample)),
    }
}

fn classify_record(record: StreamRecord, unit: BandwidthUnit) -> Option<Event> {
    match record {
        StreamRecord::Interval(data) | StreamRecord::End(data) => {
            extract_bits_per_second(&data).map(|bps| Event::Sample(bits_per_second_to(bps, unit)))
        }
        StreamRecord::Error(data) => Some(Event::Error(payload_text(&data))),
        StreamRecord::ServerOutputText(data) => {
            let text = payload_text(&data);
            (!text.is_empty()).then_some(Event::Raw(text))
        }
        StreamRecord::Other(name) => {
            trace!("Ignoring json-stream event '{}'", name);
            None
        }
        StreamRecord::Untagged => None,
    }
}

fn classify_text(line: &str, unit: BandwidthUnit, stream_count: u32, last_sample: f64) -> Event {
    let lower = line.to_lowercase();

    if CONTROL_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
        return Event::Info(line.to_string());
    }

    if lower.starts_with("error:") {
        return Event::Error(line["error:".len()..].trim().to_string());
    }

    if lower.starts_with("iperf3:") || FATAL_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        return Event::Error(line.to_string());
    }

    if lower.contains("server is busy") || lower.contains("unable to send control message") {
        return Event::Busy;
    }

    if BARE_NUMBER.is_match(line) {
        return Event::Sample(line.parse().unwrap_or(last_sample));
    }

    if let Some(bps) = parse_bandwidth(line) {
        let value = bits_per_second_to(bps, unit);
        let is_summary = line.contains(SUMMARY_MARKER) && !lower.contains("sender");
        if is_summary || stream_count == 1 {
            return Event::Sample(value);
        }
        return Event::Sample(last_sample);
    }

    Event::Raw(line.to_string())
}

/// The iperf3 rule set, tracking the last emitted sample of one run
#[derive(Debug, Clone)]
pub struct IperfClassifier {
    unit: BandwidthUnit,
    stream_count: u32,
    last_sample: f64,
}

impl IperfClassifier {
    pub fn new(unit: BandwidthUnit, stream_count: u32) -> Self {
        Self {
            unit,
            stream_count,
            last_sample: 0.0,
        }
    }

    #[cfg(test)]
    pub fn last_sample(&self) -> f64 {
        self.last_sample
    }
}

impl LineClassifier for IperfClassifier {
    fn classify(&mut self, line: &str) -> Option<Event> {
        let event = classify(line, self.unit, self.stream_count, self.last_sample)?;
        if let Event::Sample(value) = event {
            self.last_sample = value;
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MBITS: BandwidthUnit = BandwidthUnit::Mega;

    #[test]
    fn test_interval_record_yields_sample() {
        let line = r#"{"event":"interval","data":{"streams":[],"sum_received":{"bits_per_second":125000000}}}"#;
        assert_eq!(classify(line, MBITS, 2, 0.0), Some(Event::Sample(125.0)));

        let line = r#"{"event":"end","data":{"sum_sent":{"bits_per_second":2000000000.0}}}"#;
        assert_eq!(classify(line, BandwidthUnit::Giga, 1, 0.0), Some(Event::Sample(2.0)));
    }

    #[test]
    fn test_record_without_throughput_is_dropped() {
        let line = r#"{"event":"interval","data":{"streams":[]}}"#;
        assert_eq!(classify(line, MBITS, 1, 0.0), None);

        let line = r#"{"event":"start","data":{"connected":[]}}"#;
        assert_eq!(classify(line, MBITS, 1, 0.0), None);
    }

    #[test]
    fn test_error_and_server_output_records() {
        let line = r#"{"event":"error","data":"unable to connect to server: Connection refused"}"#;
        assert_eq!(
            classify(line, MBITS, 1, 0.0),
            Some(Event::Error("unable to connect to server: Connection refused".to_string()))
        );

        let line = r#"{"event":"server_output_text","data":"Accepted connection\n"}"#;
        assert_eq!(
            classify(line, MBITS, 1, 0.0),
            Some(Event::Raw("Accepted connection".to_string()))
        );
    }

    #[test]
    fn test_control_markers_pass_through() {
        assert_eq!(
            classify("CMD: iperf3 -c 10.0.0.5", MBITS, 1, 0.0),
            Some(Event::Info("CMD: iperf3 -c 10.0.0.5".to_string()))
        );
        // A control marker wins over fatal phrases in its payload
        assert_eq!(
            classify("WORKER: spawn failed", MBITS, 1, 0.0),
            Some(Event::Info("WORKER: spawn failed".to_string()))
        );
    }

    #[test]
    fn test_fatal_text() {
        assert_eq!(
            classify("ERROR: boom", MBITS, 1, 0.0),
            Some(Event::Error("boom".to_string()))
        );
        assert_eq!(
            classify("unable to connect to server", MBITS, 1, 0.0),
            Some(Event::Error("unable to connect to server".to_string()))
        );
        assert_eq!(
            classify("iperf3: error - control socket has closed unexpectedly", MBITS, 1, 0.0),
            Some(Event::Error(
                "iperf3: error - control socket has closed unexpectedly".to_string()
            ))
        );
        assert!(classify("Connection Timed Out", MBITS, 1, 0.0).unwrap().is_terminal());
        assert!(classify("connect failed: No route to host", MBITS, 1, 0.0).unwrap().is_terminal());
    }

    #[test]
    fn test_busy_is_not_terminal() {
        let event = classify("the server is busy running a test. try again later", MBITS, 1, 0.0);
        assert_eq!(event, Some(Event::Busy));
        assert!(!Event::Busy.is_terminal());
    }

    #[test]
    fn test_bare_number() {
        assert_eq!(classify("941.5", MBITS, 3, 1.0), Some(Event::Sample(941.5)));
        assert_eq!(classify("-1", MBITS, 3, 1.0), Some(Event::Sample(-1.0)));
    }

    #[test]
    fn test_summary_line_always_updates() {
        let line = "[SUM]   0.00-1.00   sec   112 MBytes   940 Mbits/sec";
        assert_eq!(classify(line, MBITS, 3, 17.0), Some(Event::Sample(940.0)));
    }

    #[test]
    fn test_per_stream_line_with_multiple_streams_repeats_last_sample() {
        let line = "[  5]   0.00-1.00   sec  37.4 MBytes   313 Mbits/sec";
        assert_eq!(classify(line, MBITS, 3, 940.0), Some(Event::Sample(940.0)));

        // Sender summary lines are not authoritative either
        let line = "[SUM]   0.00-10.00  sec  1.10 GBytes   944 Mbits/sec    0   sender";
        assert_eq!(classify(line, MBITS, 3, 940.0), Some(Event::Sample(940.0)));
    }

    #[test]
    fn test_single_stream_line_updates() {
        let line = "[  5]   0.00-1.00   sec   112 MBytes   941 Mbits/sec";
        assert_eq!(classify(line, BandwidthUnit::Giga, 1, 0.0), Some(Event::Sample(0.941)));
    }

    #[test]
    fn test_other_text_is_raw() {
        assert_eq!(
            classify("Connecting to host 10.0.0.5, port 5201", MBITS, 1, 0.0),
            Some(Event::Raw("Connecting to host 10.0.0.5, port 5201".to_string()))
        );
    }

    #[test]
    fn test_stateful_classifier_suppresses_per_stream_noise() {
        let mut classifier = IperfClassifier::new(MBITS, 3);
        let lines = [
            "[  5]   0.00-1.00   sec  37.4 MBytes   313 Mbits/sec",
            "[  7]   0.00-1.00   sec  37.6 MBytes   315 Mbits/sec",
            "[SUM]   0.00-1.00   sec   112 MBytes   940 Mbits/sec",
            "[  5]   1.00-2.00   sec  30.0 MBytes   251 Mbits/sec",
        ];

        let samples: Vec<Event> = lines.iter().filter_map(|l| classifier.classify(l)).collect();
        assert_eq!(
            samples,
            vec![
                Event::Sample(0.0),
                Event::Sample(0.0),
                Event::Sample(940.0),
                Event::Sample(940.0),
            ]
        );
        assert_eq!(classifier.last_sample(), 940.0);
    }
}
