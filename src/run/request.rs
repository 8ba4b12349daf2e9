//! Start-run input and its validated form

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::iperf::BandwidthUnit;
use crate::run::errors::RunError;
use crate::settings::Settings;

pub const DEFAULT_DURATION_SECS: u32 = 10;
pub const DEFAULT_INTERVAL_SECS: f64 = 1.0;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

/// Direction of the test as seen from this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Upload,
    /// Reverse mode (`-R`): the server sends
    Download,
}

/// Start-run request as the web client sends it
///
/// Numeric fields arrive as either JSON numbers or strings, so they are kept
/// loose here and checked in [`RunRequest::validate`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    pub target: Option<String>,
    pub protocol: Option<String>,
    pub mode: Option<String>,
    pub port: Option<Value>,
    pub streams: Option<Value>,
    pub bandwidth: Option<Value>,
    pub units: Option<String>,
    pub iface: Option<String>,
    pub duration: Option<Value>,
    pub interval: Option<Value>,
    pub connect_timeout_ms: Option<Value>,
}

/// Validated, immutable parameters of one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub target: String,
    pub port: u16,
    pub protocol: Protocol,
    pub mode: Mode,
    pub streams: u32,
    /// UDP target bitrate as iperf3 accepts it (`0`, `100M`, ...)
    pub bandwidth: String,
    pub unit: BandwidthUnit,
    pub interface: String,
    pub duration_secs: u32,
    pub interval_secs: f64,
    pub connect_timeout_ms: u64,
}

/// Text of a loose field; `None` for absent, null or blank input
fn field_text(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn parse_field<T: std::str::FromStr>(
    value: &Option<Value>,
    default: T,
    message: &str,
) -> Result<T, RunError> {
    match field_text(value) {
        Some(text) => text.parse().map_err(|_| RunError::validation(message)),
        None => Ok(default),
    }
}

impl RunRequest {
    /// Resolves defaults from `settings` and validates every field
    pub fn validate(&self, settings: &Settings) -> Result<RunConfig, RunError> {
        let target = self.target.as_deref().unwrap_or_default().trim().to_string();
        if target.is_empty() {
            return Err(RunError::validation("Target is required."));
        }

        let protocol = match self
            .protocol
            .as_deref()
            .unwrap_or("tcp")
            .trim()
            .to_lowercase()
            .as_str()
        {
            "" | "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            _ => {
                return Err(RunError::validation(
                    "Invalid protocol. Must be \"tcp\" or \"udp\".",
                ));
            }
        };

        let streams: i64 = parse_field(&self.streams, 1, "Streams must be a positive integer.")?;
        let streams = u32::try_from(streams)
            .ok()
            .filter(|s| *s >= 1)
            .ok_or_else(|| RunError::validation("Streams must be a positive integer."))?;

        let mode = match self.mode.as_deref().map(|m| m.trim().to_lowercase()) {
            Some(m) if m == "download" => Mode::Download,
            _ => Mode::Upload,
        };

        let port: u16 = parse_field(
            &self.port,
            settings.iperf_port,
            "Port must be an integer between 1 and 65535.",
        )?;
        if port == 0 {
            return Err(RunError::validation("Port must be an integer between 1 and 65535."));
        }

        let duration_secs = parse_field(
            &self.duration,
            DEFAULT_DURATION_SECS,
            "Duration must be a non-negative integer number of seconds.",
        )?;

        let interval_secs: f64 = parse_field(
            &self.interval,
            DEFAULT_INTERVAL_SECS,
            "Interval must be a number of seconds.",
        )?;
        if !interval_secs.is_finite() || interval_secs < 0.0 {
            return Err(RunError::validation("Interval must be a number of seconds."));
        }

        let connect_timeout_ms = parse_field(
            &self.connect_timeout_ms,
            DEFAULT_CONNECT_TIMEOUT_MS,
            "Connect timeout must be a non-negative integer number of milliseconds.",
        )?;

        let interface = self
            .iface
            .as_deref()
            .map(str::trim)
            .filter(|iface| !iface.is_empty())
            .unwrap_or(settings.default_iface.as_str())
            .to_string();

        Ok(RunConfig {
            target,
            port,
            protocol,
            mode,
            streams,
            bandwidth: field_text(&self.bandwidth).unwrap_or_else(|| "0".to_string()),
            unit: BandwidthUnit::from_label(self.units.as_deref().unwrap_or_default()),
            interface,
            duration_secs,
            interval_secs,
            connect_timeout_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> RunRequest {
        serde_json::from_value(value).unwrap()
    }

    fn rejection(value: Value) -> String {
        request(value)
            .validate(&Settings::default())
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn test_defaults() {
        let config = request(json!({"target": "10.0.0.5"}))
            .validate(&Settings::default())
            .unwrap();

        assert_eq!(config.target, "10.0.0.5");
        assert_eq!(config.port, 5201);
        assert_eq!(config.protocol, Protocol::Tcp);
        assert_eq!(config.mode, Mode::Upload);
        assert_eq!(config.streams, 1);
        assert_eq!(config.bandwidth, "0");
        assert_eq!(config.unit, BandwidthUnit::Mega);
        assert_eq!(config.interface, "");
        assert_eq!(config.duration_secs, 10);
        assert_eq!(config.interval_secs, 1.0);
        assert_eq!(config.connect_timeout_ms, 3000);
    }

    #[test]
    fn test_explicit_fields_accept_numbers_and_strings() {
        let settings = Settings {
            default_iface: "eth9".to_string(),
            ..Settings::default()
        };
        let config = request(json!({
            "target": " iperf.example.net ",
            "protocol": "UDP",
            "mode": "Download",
            "port": "5301",
            "streams": 4,
            "bandwidth": "100M",
            "units": "Gbits",
            "iface": "eth0",
            "duration": "30",
            "interval": 0.5,
            "connect_timeout_ms": 1500
        }))
        .validate(&settings)
        .unwrap();

        assert_eq!(config.target, "iperf.example.net");
        assert_eq!(config.protocol, Protocol::Udp);
        assert_eq!(config.mode, Mode::Download);
        assert_eq!(config.port, 5301);
        assert_eq!(config.streams, 4);
        assert_eq!(config.bandwidth, "100M");
        assert_eq!(config.unit, BandwidthUnit::Giga);
        assert_eq!(config.interface, "eth0");
        assert_eq!(config.duration_secs, 30);
        assert_eq!(config.interval_secs, 0.5);
        assert_eq!(config.connect_timeout_ms, 1500);
    }

    #[test]
    fn test_interface_falls_back_to_settings() {
        let settings = Settings {
            default_iface: "eth9".to_string(),
            ..Settings::default()
        };
        let config = request(json!({"target": "h", "iface": ""}))
            .validate(&settings)
            .unwrap();
        assert_eq!(config.interface, "eth9");
    }

    #[test]
    fn test_rejections() {
        assert_eq!(rejection(json!({})), "Target is required.");
        assert_eq!(rejection(json!({"target": "   "})), "Target is required.");
        assert_eq!(
            rejection(json!({"target": "h", "protocol": "sctp"})),
            "Invalid protocol. Must be \"tcp\" or \"udp\"."
        );
        assert_eq!(
            rejection(json!({"target": "h", "streams": -2})),
            "Streams must be a positive integer."
        );
        assert_eq!(
            rejection(json!({"target": "h", "streams": 0})),
            "Streams must be a positive integer."
        );
        assert_eq!(
            rejection(json!({"target": "h", "streams": "many"})),
            "Streams must be a positive integer."
        );
        assert!(rejection(json!({"target": "h", "port": 70000})).starts_with("Port"));
        assert!(rejection(json!({"target": "h", "interval": "-1"})).starts_with("Interval"));
    }

    #[test]
    fn test_target_checked_before_protocol() {
        assert_eq!(rejection(json!({"protocol": "sctp"})), "Target is required.");
    }
}
