//! Run controller
//!
//! Entry point for starting, stopping and inspecting measurement runs. At most
//! one iperf3 process exists at any time: starting a run terminates the
//! previous process before the new worker is launched, and concurrent starts
//! are serialized.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::collectors::platform::{CounterReading, CounterSnapshot, InterfaceQuery, LinkInfo};
use crate::iperf::{BandwidthUnit, Event, LineClassifier};
use crate::run::baseline::{CounterBaseliner, delta};
use crate::run::command::{MeasurementCommand, resolve_binary};
use crate::run::errors::RunError;
use crate::run::queue::EventQueue;
use crate::run::request::{RunConfig, RunRequest};
use crate::run::run_log::new_log_path;
use crate::run::state::{RunStatus, SharedRunState, StopTarget};
use crate::run::worker::MeasurementWorker;
use crate::settings::SettingsSource;

/// Builds the line classifier of a run
pub type ClassifierFactory = Arc<dyn Fn(&RunConfig) -> Box<dyn LineClassifier> + Send + Sync>;

/// Accepted start request
#[derive(Debug, Clone, Serialize)]
pub struct RunAccepted {
    pub run_id: u64,
    pub cmd: String,
    pub logfile: PathBuf,
}

/// Interface health report, with counter deltas against the run's baseline
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub iface: String,
    pub running: bool,
    pub unit: BandwidthUnit,
    pub streams: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub run_id: u64,
    pub link: LinkInfo,
    pub counters: CounterReading,
    pub delta: CounterSnapshot,
}

pub struct RunController {
    state: SharedRunState,
    query: Arc<dyn InterfaceQuery>,
    settings: SettingsSource,
    classifier_factory: Option<ClassifierFactory>,
    /// Held from taking the previous process until the new worker is launched
    start_gate: Mutex<()>,
}

impl RunController {
    pub fn new(query: Arc<dyn InterfaceQuery>, settings: SettingsSource) -> Self {
        Self {
            state: SharedRunState::new(),
            query,
            settings,
            classifier_factory: None,
            start_gate: Mutex::new(()),
        }
    }

    /// Uses `factory` instead of the iperf3 rule set for new runs
    pub fn with_classifier_factory(mut self, factory: ClassifierFactory) -> Self {
        self.classifier_factory = Some(factory);
        self
    }

    pub fn settings(&self) -> &SettingsSource {
        &self.settings
    }

    pub fn query(&self) -> Arc<dyn InterfaceQuery> {
        Arc::clone(&self.query)
    }

    /// Starts a run, replacing any run in progress
    ///
    /// Returns once the worker is launched; baseline capture and the
    /// measurement itself happen in the background. A rejected request leaves
    /// the current run and queue untouched.
    pub async fn start(&self, request: RunRequest) -> Result<RunAccepted, RunError> {
        let settings = self.settings.load();
        let config = request.validate(&settings)?;

        let command = MeasurementCommand::build(resolve_binary(&settings), &config);
        let cmd = command.display();
        let logfile = new_log_path(&settings.log_dir);
        let grace = settings.terminate_grace();

        let _gate = self.start_gate.lock().await;
        let start = self.state.begin(&config);
        if let Some(previous) = start.previous {
            info!("Run {} replaces run {}", start.run_id, previous.run_id());
            previous.terminate(grace).await;
        }

        info!("Run {}: {}", start.run_id, cmd);
        start.queue.push(Event::Info(format!("CMD: {cmd}")));
        start
            .queue
            .push(Event::Info(format!("LOGFILE: {}", logfile.display())));

        let mut worker = MeasurementWorker::new(
            start.run_id,
            config.clone(),
            command,
            Arc::clone(&start.queue),
            self.state.clone(),
            CounterBaseliner::new(Arc::clone(&self.query)),
            logfile.clone(),
            grace,
        );
        if let Some(factory) = &self.classifier_factory {
            worker = worker.with_classifier(factory(&config));
        }
        tokio::spawn(worker.run());

        Ok(RunAccepted {
            run_id: start.run_id,
            cmd,
            logfile,
        })
    }

    /// Stops the current run, if any
    ///
    /// A spawned process is terminated and its worker then sees the output end
    /// and finishes the queue as usual. A run still capturing its baseline is
    /// cancelled and never spawns iperf3.
    pub async fn stop(&self) -> bool {
        let _gate = self.start_gate.lock().await;
        match self.state.stop_current() {
            StopTarget::Process(process) => {
                info!("Stopping run {}", process.run_id());
                process.terminate(self.settings.load().terminate_grace()).await;
                true
            }
            StopTarget::Pending(run_id) => {
                info!("Run {} stopped before iperf3 started", run_id);
                true
            }
            StopTarget::Idle => false,
        }
    }

    /// Queue of the current run; an idle, never-finished queue before the first run
    pub fn current_queue(&self) -> Arc<EventQueue> {
        self.state.current_queue()
    }

    pub fn run_status(&self) -> RunStatus {
        self.state.snapshot().status
    }

    /// Link state, counters and counter deltas for `iface`
    ///
    /// Falls back to the current run's interface when `iface` is empty. The run
    /// state is copied under the lock before any external command runs.
    pub async fn status(&self, iface: Option<&str>) -> StatusReport {
        let snapshot = self.state.snapshot();
        let iface = iface
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| snapshot.status.interface.clone());

        let (link, counters) = tokio::join!(self.query.link_info(&iface), self.query.counters(&iface));
        if let Some(e) = counters.error.as_deref() {
            warn!("Counters for '{}' unavailable: {}", iface, e);
        }

        let delta = if counters.ok {
            delta(&snapshot.baseline, &counters.counters)
        } else {
            CounterSnapshot::new()
        };

        StatusReport {
            iface,
            running: snapshot.status.running,
            unit: snapshot.status.unit,
            streams: snapshot.status.streams,
            started_at: snapshot.status.started_at,
            run_id: snapshot.status.run_id,
            link,
            counters,
            delta,
        }
    }
}
