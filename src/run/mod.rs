//! Measurement run orchestration
//!
//! The [`RunController`] validates start requests and owns the single active
//! run; a [`MeasurementWorker`](worker::MeasurementWorker) per run drives
//! iperf3 and feeds the run's [`EventQueue`].

pub mod baseline;
pub mod command;
pub mod controller;
pub mod errors;
pub mod process;
pub mod queue;
pub mod request;
pub mod run_log;
pub mod state;
pub mod worker;

pub use controller::{ClassifierFactory, RunAccepted, RunController, StatusReport};
pub use errors::RunError;
pub use queue::{EventQueue, QueueItem, Received};
pub use request::{RunConfig, RunRequest};
pub use state::RunStatus;
