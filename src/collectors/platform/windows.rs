use async_trait::async_trait;
use log::warn;
use serde_json::Value;
use std::time::Duration;

use super::shell::run_command;
use super::{CounterReading, CounterSnapshot, InterfaceQuery, LinkInfo};

pub const WINDOWS_COUNTER_KEYS: [&str; 4] = [
    "ReceivedErrors",
    "OutboundErrors",
    "ReceivedDiscarded",
    "OutboundDiscarded",
];

/// PowerShell cold starts are slow
const LIST_TIMEOUT: Duration = Duration::from_secs(15);
const QUERY_TIMEOUT: Duration = Duration::from_secs(6);

const LIST_ADAPTERS: &str = "Get-NetAdapter | Select-Object -ExpandProperty Name | ConvertTo-Json -Compress";

/// Works where the NetAdapter module is missing
const LIST_ADAPTERS_CIM: &str = "Get-CimInstance Win32_NetworkAdapter | \
Where-Object { $_.NetEnabled -eq $true -and $_.NetConnectionID } | \
Select-Object -ExpandProperty NetConnectionID | ConvertTo-Json -Compress";

pub struct WindowsInterfaceQuery;

impl WindowsInterfaceQuery {
    pub fn new() -> Self {
        Self
    }

    async fn powershell(script: &str, limit: Duration) -> Result<String, String> {
        let args = [
            "powershell.exe",
            "-NoLogo",
            "-NoProfile",
            "-ExecutionPolicy",
            "Bypass",
            "-Command",
            script,
        ];
        match run_command(&args, limit).await {
            Ok(result) if result.success() && !result.output.is_empty() => Ok(result.output),
            Ok(result) => Err(result.output),
            Err(e) => Err(e.to_string()),
        }
    }
}

impl Default for WindowsInterfaceQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses adapter names from `ConvertTo-Json` output (one string or an array)
pub fn parse_adapter_names(output: &str) -> Option<Vec<String>> {
    match serde_json::from_str::<Value>(output).ok()? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        Value::String(name) if !name.trim().is_empty() => Some(vec![name.trim().to_string()]),
        _ => None,
    }
}

/// Parses `Get-NetAdapter | Select-Object Name, Status, LinkSpeed | ConvertTo-Json`
pub fn parse_link_info(output: &str) -> LinkInfo {
    let Ok(data) = serde_json::from_str::<Value>(output) else {
        return LinkInfo::unavailable(output);
    };
    let field = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    LinkInfo {
        ok: true,
        speed: field("LinkSpeed"),
        duplex: String::new(),
        link: field("Status"),
        auto: String::new(),
        error: None,
    }
}

/// Parses `Get-NetAdapterStatistics` JSON into [`WINDOWS_COUNTER_KEYS`]
pub fn parse_counters(output: &str) -> Option<CounterSnapshot> {
    let data: Value = serde_json::from_str(output).ok()?;
    let counters = WINDOWS_COUNTER_KEYS
        .iter()
        .filter_map(|key| {
            let value = match data.get(*key) {
                None | Some(Value::Null) => 0,
                Some(v) => v.as_i64().or_else(|| v.as_str()?.trim().parse().ok())?,
            };
            Some((key.to_string(), value))
        })
        .collect();
    Some(counters)
}

#[async_trait]
impl InterfaceQuery for WindowsInterfaceQuery {
    async fn list_interfaces(&self) -> Vec<String> {
        let primary = Self::powershell(LIST_ADAPTERS, LIST_TIMEOUT).await;
        if let Some(names) = primary.as_deref().ok().and_then(parse_adapter_names) {
            return names;
        }

        match Self::powershell(LIST_ADAPTERS_CIM, LIST_TIMEOUT).await {
            Ok(output) => parse_adapter_names(&output).unwrap_or_default(),
            Err(fallback_error) => {
                let primary_error = primary.err().unwrap_or_default();
                warn!(
                    "list_interfaces failed: primary={:.400} fallback={:.400}",
                    primary_error, fallback_error
                );
                Vec::new()
            }
        }
    }

    async fn link_info(&self, interface_name: &str) -> LinkInfo {
        if interface_name.is_empty() {
            return LinkInfo::unavailable("no iface");
        }
        let script = format!(
            "Get-NetAdapter -Name \"{interface_name}\" | Select-Object Name, Status, LinkSpeed | ConvertTo-Json"
        );
        match Self::powershell(&script, QUERY_TIMEOUT).await {
            Ok(output) => parse_link_info(&output),
            Err(e) => LinkInfo::unavailable(e),
        }
    }

    async fn counters(&self, interface_name: &str) -> CounterReading {
        if interface_name.is_empty() {
            return CounterReading::unavailable("no iface");
        }
        let script = format!(
            "Get-NetAdapterStatistics -Name \"{interface_name}\" | \
Select-Object ReceivedErrors, OutboundErrors, ReceivedDiscarded, OutboundDiscarded | ConvertTo-Json"
        );
        match Self::powershell(&script, QUERY_TIMEOUT).await {
            Ok(output) => match parse_counters(&output) {
                Some(counters) => CounterReading::available(counters),
                None => CounterReading::unavailable(output),
            },
            Err(e) => CounterReading::unavailable(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_adapter_names() {
        assert_eq!(
            parse_adapter_names(r#"["Ethernet","Wi-Fi"," "]"#),
            Some(vec!["Ethernet".to_string(), "Wi-Fi".to_string()])
        );
        assert_eq!(parse_adapter_names(r#""Ethernet 2""#), Some(vec!["Ethernet 2".to_string()]));
        assert_eq!(parse_adapter_names("Get-NetAdapter : not recognized"), None);
    }

    #[test]
    fn test_parse_link_info() {
        let info = parse_link_info(r#"{"Name":"Ethernet","Status":"Up","LinkSpeed":"1 Gbps"}"#);
        assert!(info.ok);
        assert_eq!(info.speed, "1 Gbps");
        assert_eq!(info.link, "Up");
        assert_eq!(info.duplex, "");

        assert!(!parse_link_info("garbage").ok);
    }

    #[test]
    fn test_parse_counters() {
        let counters = parse_counters(
            r#"{"ReceivedErrors":3,"OutboundErrors":0,"ReceivedDiscarded":"12","OutboundDiscarded":null}"#,
        )
        .unwrap();
        assert_eq!(counters.get("ReceivedErrors"), Some(&3));
        assert_eq!(counters.get("ReceivedDiscarded"), Some(&12));
        assert_eq!(counters.get("OutboundDiscarded"), Some(&0));
        assert_eq!(counters.len(), 4);

        assert_eq!(parse_counters("not json"), None);
    }
}
