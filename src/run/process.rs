//! Shared handle to a running measurement process
//!
//! The worker waits on the process while the controller may need to stop it
//! at any moment. Both sides poll through a short-lived lock instead of holding
//! it across a blocking wait, so termination never queues behind the worker.

use log::{debug, info, warn};
use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct ProcessHandle {
    run_id: u64,
    pid: Option<u32>,
    child: Arc<Mutex<Child>>,
}

impl ProcessHandle {
    pub fn new(run_id: u64, child: Child) -> Self {
        Self {
            run_id,
            pid: child.id(),
            child: Arc::new(Mutex::new(child)),
        }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status if the process has already exited
    pub async fn try_status(&self) -> io::Result<Option<ExitStatus>> {
        self.child.lock().await.try_wait()
    }

    /// Waits for the process to exit
    pub async fn wait(&self) -> io::Result<ExitStatus> {
        loop {
            if let Some(status) = self.try_status().await? {
                return Ok(status);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Asks the process to exit, killing it if it is still alive after `grace`
    ///
    /// Best effort: failures are logged and swallowed so a new run can always start.
    pub async fn terminate(&self, grace: Duration) {
        match self.try_status().await {
            Ok(Some(status)) => {
                debug!("Run {} process already exited with {}", self.run_id, status);
                return;
            }
            Ok(None) => {}
            Err(e) => warn!("Could not query run {} process state: {}", self.run_id, e),
        }

        info!("Terminating run {} process (pid {:?})", self.run_id, self.pid);
        if let Err(e) = self.request_exit().await {
            warn!("Graceful termination of run {} failed: {}", self.run_id, e);
        }
        if timeout(grace, self.wait()).await.is_ok() {
            return;
        }

        warn!(
            "Run {} process did not exit within {:?}; killing",
            self.run_id, grace
        );
        if let Err(e) = self.child.lock().await.start_kill() {
            warn!("Killing run {} process failed: {}", self.run_id, e);
        }
        match timeout(grace, self.wait()).await {
            Ok(Ok(status)) => info!("Run {} process killed ({})", self.run_id, status),
            Ok(Err(e)) => warn!("Waiting for killed run {} process failed: {}", self.run_id, e),
            Err(_) => warn!("Run {} process still alive after kill", self.run_id),
        }
    }

    #[cfg(unix)]
    async fn request_exit(&self) -> io::Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return Ok(());
        };
        let pid = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    async fn request_exit(&self) -> io::Result<()> {
        self.child.lock().await.start_kill()
    }
}
