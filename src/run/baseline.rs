//! Interface counter baselines
//!
//! A snapshot of the error/drop counters is taken when a run starts; deltas
//! against it are computed on every status read and never stored.

use log::debug;
use std::sync::Arc;

use crate::collectors::platform::{CounterSnapshot, InterfaceQuery};

#[derive(Clone)]
pub struct CounterBaseliner {
    query: Arc<dyn InterfaceQuery>,
}

impl CounterBaseliner {
    pub fn new(query: Arc<dyn InterfaceQuery>) -> Self {
        Self { query }
    }

    /// Current counters of `interface_name`; empty when they cannot be read
    pub async fn snapshot(&self, interface_name: &str) -> CounterSnapshot {
        let reading = self.query.counters(interface_name).await;
        if reading.ok {
            reading.counters
        } else {
            debug!(
                "No counter baseline for '{}': {}",
                interface_name,
                reading.error.as_deref().unwrap_or("unavailable")
            );
            CounterSnapshot::new()
        }
    }
}

/// Per-counter change since `baseline`
///
/// Counters missing from the baseline report zero rather than their full value.
pub fn delta(baseline: &CounterSnapshot, current: &CounterSnapshot) -> CounterSnapshot {
    current
        .iter()
        .map(|(name, &now)| {
            let base = baseline.get(name).copied().unwrap_or(now);
            (name.clone(), now.saturating_sub(base))
        })
        .collect()
}
