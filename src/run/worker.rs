//! Measurement worker
//!
//! One worker task per run. It captures the counter baseline, spawns iperf3,
//! turns every output line into an event on the run's queue and always ends the
//! queue with exactly one sentinel, whichever way the run ends.

use futures::stream::{self, Stream, StreamExt};
use log::{debug, error, info, warn};
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use crate::iperf::{Event, IperfClassifier, LineClassifier, decode_output};
use crate::run::baseline::CounterBaseliner;
use crate::run::command::MeasurementCommand;
use crate::run::errors::RunError;
use crate::run::process::ProcessHandle;
use crate::run::queue::EventQueue;
use crate::run::request::RunConfig;
use crate::run::run_log::RunLog;
use crate::run::state::{SharedRunState, SpawnedProcess};

/// Hides the console window iperf3 would otherwise open
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

pub struct MeasurementWorker {
    run_id: u64,
    config: RunConfig,
    command: MeasurementCommand,
    queue: Arc<EventQueue>,
    state: SharedRunState,
    baseliner: CounterBaseliner,
    log_path: PathBuf,
    grace: Duration,
    classifier: Box<dyn LineClassifier>,
}

/// Finishes the queue and clears the active flag when the worker ends,
/// including by panic
struct Completion {
    run_id: u64,
    queue: Arc<EventQueue>,
    state: SharedRunState,
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.queue.finish();
        self.state.complete(self.run_id);
        info!("Run {} finished", self.run_id);
    }
}

impl MeasurementWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: u64,
        config: RunConfig,
        command: MeasurementCommand,
        queue: Arc<EventQueue>,
        state: SharedRunState,
        baseliner: CounterBaseliner,
        log_path: PathBuf,
        grace: Duration,
    ) -> Self {
        let classifier = Box::new(IperfClassifier::new(config.unit, config.streams));
        Self {
            run_id,
            config,
            command,
            queue,
            state,
            baseliner,
            log_path,
            grace,
            classifier,
        }
    }

    /// Replaces the default iperf3 rule set
    pub fn with_classifier(mut self, classifier: Box<dyn LineClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub async fn run(mut self) {
        let _completion = Completion {
            run_id: self.run_id,
            queue: Arc::clone(&self.queue),
            state: self.state.clone(),
        };

        self.queue.push(Event::Info("WORKER: started".to_string()));

        let baseline = self.baseliner.snapshot(&self.config.interface).await;
        debug!("Run {} baseline has {} counters", self.run_id, baseline.len());
        self.state.set_baseline(self.run_id, baseline);

        let mut log = RunLog::open(self.log_path.clone()).await;
        self.write_header(&mut log).await;

        if let Err(e) = self.execute(&mut log).await {
            error!("Run {} failed: {}", self.run_id, e);
            log.line(format!("EXCEPTION: {e}")).await;
            self.queue.push(Event::Error(e.to_string()));
        }
    }

    async fn write_header(&self, log: &mut RunLog) {
        let cwd = std::env::current_dir()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default();

        log.line("=== NEW RUN ===").await;
        log.line(format!("time: {}", chrono::Local::now().to_rfc3339())).await;
        log.line(format!("cwd: {cwd}")).await;
        log.line(format!("cmd: {}", self.command.display())).await;
        log.line(format!("connect_timeout_ms: {}", self.config.connect_timeout_ms)).await;
        log.line(format!("iface: {}", self.config.interface)).await;
        log.line(format!("unit: {}", self.config.unit)).await;
    }

    async fn execute(&mut self, log: &mut RunLog) -> Result<(), RunError> {
        let command = &self.command;
        let Some(SpawnedProcess { handle, stdout, stderr }) =
            self.state.spawn_if_current(self.run_id, || spawn_process(command))?
        else {
            if self.state.was_cancelled(self.run_id) {
                info!("Run {} stopped before iperf3 started", self.run_id);
                self.queue
                    .push(Event::Info("WORKER: stopped before iperf start".to_string()));
                log.line("stopped before start").await;
            } else {
                info!("Run {} superseded before iperf3 started", self.run_id);
                self.queue
                    .push(Event::Info("WORKER: superseded before iperf start".to_string()));
                log.line("superseded before start").await;
            }
            return Ok(());
        };

        let pid = handle.pid().map(|p| p.to_string()).unwrap_or_else(|| "?".to_string());
        info!("Run {} started iperf3 pid={}", self.run_id, pid);
        self.queue.push(Event::Info(format!("WORKER: iperf pid={pid}")));
        log.line(format!("pid: {pid}")).await;

        let lines = stream::select(output_lines(stdout), output_lines(stderr));
        let outcome = self.relay(lines, log).await;
        if outcome.is_err() {
            handle.terminate(self.grace).await;
        }

        let code = exit_code(&handle).await;
        log.line(format!("returncode: {}", code.map_or("?".to_string(), |c| c.to_string())))
            .await;
        outcome?;

        if let Some(code) = code.filter(|c| *c != 0) {
            self.queue.push(Event::Info(format!("iperf3 exited with code {code}")));
        }
        Ok(())
    }

    /// Classifies output until it ends or iperf3 reports a fatal condition
    async fn relay<S>(&mut self, lines: S, log: &mut RunLog) -> Result<(), RunError>
    where
        S: Stream<Item = io::Result<Vec<u8>>>,
    {
        let mut lines = std::pin::pin!(lines);
        while let Some(bytes) = lines.next().await {
            let bytes = bytes.map_err(RunError::StreamRead)?;
            let decoded = decode_output(&bytes);
            let line = decoded.trim_matches(|c: char| c.is_whitespace() || c == '\0');
            if line.is_empty() {
                continue;
            }

            log.line(format!("OUT: {line}")).await;
            let Some(event) = self.classifier.classify(line) else {
                continue;
            };
            if let Event::Error(message) = event {
                warn!("Run {} aborted by iperf3: {}", self.run_id, message);
                return Err(RunError::UpstreamFatal(message));
            }
            self.queue.push(event);
        }
        Ok(())
    }
}

fn spawn_process(command: &MeasurementCommand) -> Result<Child, RunError> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    cmd.spawn().map_err(|source| RunError::Spawn {
        program: command.program.display().to_string(),
        source,
    })
}

/// Raw newline-terminated chunks of a pipe
///
/// UTF-16LE output encodes the newline as `\n\0`; the trailing NUL is kept
/// with its line so every chunk stays aligned to whole code units.
fn output_lines<R>(reader: R) -> impl Stream<Item = io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    stream::unfold(Some(BufReader::new(reader)), |reader| async move {
        let mut reader = reader?;
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => {
                if splits_utf16_newline(&buf) {
                    let next_is_nul = match reader.fill_buf().await {
                        Ok(rest) => rest.first() == Some(&0),
                        Err(e) => return Some((Err(e), None)),
                    };
                    if next_is_nul {
                        buf.push(0);
                        reader.consume(1);
                    }
                }
                Some((Ok(buf), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// An odd-length, NUL-heavy chunk ending in `\n` stopped one byte short of a
/// UTF-16LE newline
fn splits_utf16_newline(chunk: &[u8]) -> bool {
    chunk.len() % 2 == 1
        && chunk.ends_with(b"\n")
        && chunk.iter().filter(|&&b| b == 0).count() > chunk.len() / 10
}

async fn exit_code(handle: &ProcessHandle) -> Option<i32> {
    match handle.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            warn!("Could not collect iperf3 exit status: {}", e);
            None
        }
    }
}
