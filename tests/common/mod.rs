//! Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use iperf_watcher::collectors::platform::{CounterReading, CounterSnapshot, InterfaceQuery, LinkInfo};
use iperf_watcher::run::{EventQueue, QueueItem, Received, RunController};
use iperf_watcher::settings::SettingsSource;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Interface backend with one interface whose rx_errors grow on every read
#[derive(Default)]
pub struct FakeInterfaces {
    rx_errors: AtomicI64,
}

#[async_trait]
impl InterfaceQuery for FakeInterfaces {
    async fn list_interfaces(&self) -> Vec<String> {
        vec!["eth0".to_string()]
    }

    async fn link_info(&self, interface_name: &str) -> LinkInfo {
        if interface_name != "eth0" {
            return LinkInfo::unavailable("no iface");
        }
        LinkInfo {
            ok: true,
            speed: "1000Mb/s".to_string(),
            duplex: "Full".to_string(),
            link: "yes".to_string(),
            auto: "on".to_string(),
            error: None,
        }
    }

    async fn counters(&self, interface_name: &str) -> CounterReading {
        if interface_name != "eth0" {
            return CounterReading::unavailable("no iface");
        }
        let rx_errors = self.rx_errors.fetch_add(3, Ordering::SeqCst);
        let counters: CounterSnapshot = [
            ("rx_errors".to_string(), rx_errors),
            ("tx_dropped".to_string(), 7),
        ]
        .into_iter()
        .collect();
        CounterReading::available(counters)
    }
}

/// Interface backend whose counter reads stall, like `ethtool -S` on a busy driver
pub struct SlowInterfaces {
    delay: Duration,
    inner: FakeInterfaces,
}

impl SlowInterfaces {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: FakeInterfaces::default(),
        }
    }
}

#[async_trait]
impl InterfaceQuery for SlowInterfaces {
    async fn list_interfaces(&self) -> Vec<String> {
        self.inner.list_interfaces().await
    }

    async fn link_info(&self, interface_name: &str) -> LinkInfo {
        self.inner.link_info(interface_name).await
    }

    async fn counters(&self, interface_name: &str) -> CounterReading {
        tokio::time::sleep(self.delay).await;
        self.inner.counters(interface_name).await
    }
}

/// Writes a settings file pointing at `binary` and logging into `dir`
pub fn write_settings(dir: &Path, binary: &Path) -> PathBuf {
    let path = dir.join("settings.json");
    let settings = json!({
        "iperf_binary": binary,
        "log_dir": dir.join("logs"),
        "default_iface": "eth0",
        "terminate_grace_ms": 300,
    });
    std::fs::write(&path, settings.to_string()).unwrap();
    path
}

pub fn controller(dir: &Path, binary: &Path) -> Arc<RunController> {
    let settings = write_settings(dir, binary);
    Arc::new(RunController::new(
        Arc::new(FakeInterfaces::default()),
        SettingsSource::new(settings),
    ))
}

/// Executable shell script standing in for iperf3; arguments are ignored
#[cfg(unix)]
pub fn fake_iperf(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub const INTERVAL_125_MBITS: &str =
    r#"echo '{"event":"interval","data":{"streams":[],"sum_received":{"bits_per_second":125000000}}}'"#;

/// Every item up to and including the sentinel
pub async fn collect_run(queue: &EventQueue) -> Vec<QueueItem> {
    let mut items = Vec::new();
    loop {
        match queue.next(Duration::from_secs(10)).await {
            Received::Item(QueueItem::Sentinel) => {
                items.push(QueueItem::Sentinel);
                return items;
            }
            Received::Item(item) => items.push(item),
            Received::Idle => panic!("run {} produced nothing for 10s", queue.run_id()),
            Received::Closed => panic!("sentinel of run {} already taken", queue.run_id()),
        }
    }
}

/// Polls until the controller reports no active run
pub async fn wait_until_idle(controller: &RunController) {
    for _ in 0..100 {
        if !controller.run_status().running {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("run {} still active", controller.run_status().run_id);
}
