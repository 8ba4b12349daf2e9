//! Process-wide run state
//!
//! A single [`RunState`] sits behind one lock. Nothing outside this module
//! touches its fields: the controller and the worker go through the narrow,
//! run-id-checked operations of [`SharedRunState`], so a superseded worker can
//! never clobber the state of the run that replaced it. The lock is never held
//! across an await point.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::process::{Child, ChildStderr, ChildStdout};

use crate::collectors::platform::CounterSnapshot;
use crate::iperf::BandwidthUnit;
use crate::run::errors::RunError;
use crate::run::process::ProcessHandle;
use crate::run::queue::EventQueue;
use crate::run::request::RunConfig;

#[derive(Debug)]
struct RunState {
    /// Incremented for every started run; 0 before the first one
    run_id: u64,
    active: bool,
    /// Set by a stop request that arrived before the process was spawned
    cancelled: bool,
    unit: BandwidthUnit,
    stream_count: u32,
    interface: String,
    started_at: Option<DateTime<Utc>>,
    process: Option<ProcessHandle>,
    baseline: CounterSnapshot,
    queue: Arc<EventQueue>,
}

/// Client-visible view of the run state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub run_id: u64,
    pub running: bool,
    pub unit: BandwidthUnit,
    pub streams: u32,
    pub interface: String,
    pub started_at: Option<DateTime<Utc>>,
}

/// Point-in-time copy taken under the lock
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub baseline: CounterSnapshot,
}

/// What a freshly started run inherits
pub struct RunStart {
    pub run_id: u64,
    pub queue: Arc<EventQueue>,
    /// Process of the run being replaced, still to be terminated
    pub previous: Option<ProcessHandle>,
}

/// What a stop request found to stop
pub enum StopTarget {
    /// A spawned process, still to be terminated
    Process(ProcessHandle),
    /// A run whose worker has not spawned its process yet; it never will
    Pending(u64),
    Idle,
}

/// Output pipes of a freshly spawned process
pub struct SpawnedProcess {
    pub handle: ProcessHandle,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

#[derive(Debug, Clone)]
pub struct SharedRunState {
    inner: Arc<Mutex<RunState>>,
}

impl Default for SharedRunState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedRunState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunState {
                run_id: 0,
                active: false,
                cancelled: false,
                unit: BandwidthUnit::default(),
                stream_count: 1,
                interface: String::new(),
                started_at: None,
                process: None,
                baseline: CounterSnapshot::new(),
                queue: Arc::new(EventQueue::new(0)),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs a new run: fresh id and queue, config fields, cleared baseline
    ///
    /// The previous queue is abandoned, not drained; its worker still finishes it.
    pub fn begin(&self, config: &RunConfig) -> RunStart {
        let mut state = self.lock();
        state.run_id += 1;
        state.active = true;
        state.cancelled = false;
        state.unit = config.unit;
        state.stream_count = config.streams;
        state.interface = config.interface.clone();
        state.started_at = Some(Utc::now());
        state.baseline = CounterSnapshot::new();
        state.queue = Arc::new(EventQueue::new(state.run_id));

        info!("Run {} installed", state.run_id);
        RunStart {
            run_id: state.run_id,
            queue: Arc::clone(&state.queue),
            previous: state.process.take(),
        }
    }

    pub fn is_current(&self, run_id: u64) -> bool {
        self.lock().run_id == run_id
    }

    pub fn current_queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.lock().queue)
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let state = self.lock();
        RunSnapshot {
            status: RunStatus {
                run_id: state.run_id,
                running: state.active,
                unit: state.unit,
                streams: state.stream_count,
                interface: state.interface.clone(),
                started_at: state.started_at,
            },
            baseline: state.baseline.clone(),
        }
    }

    /// Records the counter baseline of `run_id` if it is still the current run
    pub fn set_baseline(&self, run_id: u64, baseline: CounterSnapshot) {
        let mut state = self.lock();
        if state.run_id == run_id {
            state.baseline = baseline;
        }
    }

    /// Spawns the process of `run_id` and records it, atomically with the
    /// check that the run has not been superseded
    ///
    /// Returns `Ok(None)` without spawning when a newer run exists or the run
    /// was stopped.
    pub fn spawn_if_current<F>(&self, run_id: u64, spawn: F) -> Result<Option<SpawnedProcess>, RunError>
    where
        F: FnOnce() -> Result<Child, RunError>,
    {
        let mut state = self.lock();
        if state.run_id != run_id {
            debug!("Run {} superseded by run {} before spawning", run_id, state.run_id);
            return Ok(None);
        }
        if state.cancelled {
            debug!("Run {} stopped before spawning", run_id);
            return Ok(None);
        }

        let mut child = spawn()?;
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(RunError::StreamRead(std::io::Error::other(
                "measurement process output is not piped",
            )));
        };

        let handle = ProcessHandle::new(run_id, child);
        state.process = Some(handle.clone());
        Ok(Some(SpawnedProcess { handle, stdout, stderr }))
    }

    #[cfg(test)]
    pub fn take_process(&self) -> Option<ProcessHandle> {
        self.lock().process.take()
    }

    /// Stops the current run
    ///
    /// Takes its process for termination, or, while the worker is still
    /// preparing, marks the run so that it never spawns one.
    pub fn stop_current(&self) -> StopTarget {
        let mut state = self.lock();
        if let Some(process) = state.process.take() {
            return StopTarget::Process(process);
        }
        if state.active && !state.cancelled {
            state.cancelled = true;
            return StopTarget::Pending(state.run_id);
        }
        StopTarget::Idle
    }

    /// Whether `run_id` was stopped before its process was spawned
    pub fn was_cancelled(&self, run_id: u64) -> bool {
        let state = self.lock();
        state.run_id == run_id && state.cancelled
    }

    /// Marks `run_id` finished; a no-op for superseded runs
    pub fn complete(&self, run_id: u64) {
        let mut state = self.lock();
        if state.process.as_ref().is_some_and(|p| p.run_id() == run_id) {
            state.process = None;
        }
        if state.run_id == run_id {
            state.active = false;
        }
    }
}
