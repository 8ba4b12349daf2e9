use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;
use sysinfo::Networks;

use super::shell::run_command;
use super::{CounterReading, CounterSnapshot, InterfaceQuery, LinkInfo};

/// ethtool counter names vary by driver; this is the useful superset
pub const LINUX_COUNTER_KEYS: [&str; 11] = [
    "rx_crc_errors",
    "rx_fcs_errors",
    "rx_errors",
    "tx_errors",
    "rx_dropped",
    "tx_dropped",
    "rx_missed_errors",
    "rx_length_errors",
    "rx_over_errors",
    "rx_frame_errors",
    "rx_fifo_errors",
];

const LINK_INFO_TIMEOUT: Duration = Duration::from_secs(4);
const COUNTERS_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LinuxInterfaceQuery;

impl LinuxInterfaceQuery {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LinuxInterfaceQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses `ethtool <iface>` output
pub fn parse_link_info(output: &str) -> LinkInfo {
    let grab = |key: &str| -> String {
        output
            .lines()
            .find_map(|line| {
                let (name, value) = line.trim().split_once(':')?;
                (name.trim() == key).then(|| value.trim().to_string())
            })
            .unwrap_or_default()
    };

    LinkInfo {
        ok: true,
        speed: grab("Speed"),
        duplex: grab("Duplex"),
        link: grab("Link detected"),
        auto: grab("Auto-negotiation"),
        error: None,
    }
}

/// Parses `ethtool -S <iface>` output, keeping only [`LINUX_COUNTER_KEYS`]
pub fn parse_counters(output: &str) -> CounterSnapshot {
    output
        .lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            if !LINUX_COUNTER_KEYS.contains(&name) {
                return None;
            }
            let value: i64 = value.trim().parse().ok()?;
            Some((name.to_string(), value))
        })
        .collect()
}

#[async_trait]
impl InterfaceQuery for LinuxInterfaceQuery {
    async fn list_interfaces(&self) -> Vec<String> {
        let networks = Networks::new_with_refreshed_list();
        let mut names: Vec<String> = networks
            .iter()
            .map(|(name, _)| name.to_string())
            .filter(|name| name != "lo")
            .collect();
        names.sort();
        debug!("Enumerated {} interfaces", names.len());
        names
    }

    async fn link_info(&self, interface_name: &str) -> LinkInfo {
        if interface_name.is_empty() {
            return LinkInfo::unavailable("no iface");
        }

        match run_command(&["ethtool", interface_name], LINK_INFO_TIMEOUT).await {
            Ok(result) if result.success() => parse_link_info(&result.output),
            Ok(result) => LinkInfo::unavailable(result.output),
            Err(e) => {
                warn!("Link info for {} unavailable: {}", interface_name, e);
                LinkInfo::unavailable(e.to_string())
            }
        }
    }

    async fn counters(&self, interface_name: &str) -> CounterReading {
        if interface_name.is_empty() {
            return CounterReading::unavailable("no iface");
        }

        match run_command(&["ethtool", "-S", interface_name], COUNTERS_TIMEOUT).await {
            Ok(result) if result.success() => CounterReading::available(parse_counters(&result.output)),
            Ok(result) => CounterReading::unavailable(result.output),
            Err(e) => {
                warn!("Counters for {} unavailable: {}", interface_name, e);
                CounterReading::unavailable(e.to_string())
            }
        }
    }
}
