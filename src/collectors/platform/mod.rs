use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// Platform-specific interface queries
// Link state and error/drop counters come from OS tools (ethtool, PowerShell)
// that are slow and occasionally hang, so every query is bounded and degrades
// to an `ok: false` answer instead of failing the caller

/// Bounded execution of auxiliary commands
pub mod shell;

/// Linux implementation
/// Uses `ethtool` for link state and driver statistics
pub mod linux;

/// Windows implementation
/// Uses PowerShell `Get-NetAdapter` cmdlets
pub mod windows;

/// Named interface error/drop counters at one point in time
pub type CounterSnapshot = BTreeMap<String, i64>;

/// Link properties of one interface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub ok: bool,
    #[serde(default)]
    pub speed: String,
    #[serde(default)]
    pub duplex: String,
    /// Link state as the OS tool reports it ("yes", "Up", ...)
    #[serde(default)]
    pub link: String,
    /// Auto-negotiation state
    #[serde(default)]
    pub auto: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LinkInfo {
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Result of a counter query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterReading {
    pub ok: bool,
    pub counters: CounterSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CounterReading {
    pub fn available(counters: CounterSnapshot) -> Self {
        Self {
            ok: true,
            counters,
            error: None,
        }
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            counters: CounterSnapshot::new(),
            error: Some(error.into()),
        }
    }
}

/// Interface enumeration, link info and counter queries for one OS
#[async_trait]
pub trait InterfaceQuery: Send + Sync {
    async fn list_interfaces(&self) -> Vec<String>;
    async fn link_info(&self, interface_name: &str) -> LinkInfo;
    async fn counters(&self, interface_name: &str) -> CounterReading;
}

pub fn create_platform_query() -> Arc<dyn InterfaceQuery> {
    #[cfg(target_os = "windows")]
    {
        Arc::new(windows::WindowsInterfaceQuery::new())
    }

    #[cfg(not(target_os = "windows"))]
    {
        Arc::new(linux::LinuxInterfaceQuery::new())
    }
}
