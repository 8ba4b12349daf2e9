//! Append-only log file per run
//!
//! Purely diagnostic: every failure here is logged and otherwise ignored.

use chrono::Local;
use log::warn;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// `<dir>/iperf_<YYYYmmdd_HHMMSS>.log` for a run starting now
pub fn new_log_path(dir: &Path) -> PathBuf {
    dir.join(format!("iperf_{}.log", Local::now().format("%Y%m%d_%H%M%S")))
}

#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: Option<File>,
}

impl RunLog {
    /// Opens `path` for appending, creating its directory if needed
    pub async fn open(path: PathBuf) -> Self {
        if let Some(dir) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                warn!("Cannot create run log directory {}: {}", dir.display(), e);
            }
        }

        let file = match OpenOptions::new().create(true).append(true).open(&path).await {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("Cannot open run log {}: {}", path.display(), e);
                None
            }
        };

        Self { path, file }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line and flushes it
    pub async fn line(&mut self, message: impl AsRef<str>) {
        let Some(file) = self.file.as_mut() else {
            return;
        };

        let mut bytes = message.as_ref().as_bytes().to_vec();
        bytes.push(b'\n');
        let result = async {
            file.write_all(&bytes).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!("Run log {} stopped accepting writes: {}", self.path.display(), e);
            self.file = None;
        }
    }
}
