//! Bounded execution of auxiliary shell tools
//!
//! `ethtool` and PowerShell occasionally hang (a wedged driver, a cold PowerShell
//! module cache). Every invocation here carries its own timeout so an HTTP
//! handler waiting on one can never block indefinitely.

use log::{debug, warn};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

use crate::iperf::decode_output;

/// Failure to obtain any output from an auxiliary command
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("timeout after {seconds}s: {command}")]
    Timeout { command: String, seconds: f64 },
    #[error("failed to run {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("empty command line")]
    EmptyCommand,
}

/// Exit status and decoded, trimmed stdout+stderr of a finished command
#[derive(Debug, Clone, PartialEq)]
pub struct ShellOutput {
    pub code: i32,
    pub output: String,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs `args[0]` with the remaining arguments, killing it after `limit`
pub async fn run_command(args: &[&str], limit: Duration) -> Result<ShellOutput, ShellError> {
    let (program, rest) = args.split_first().ok_or(ShellError::EmptyCommand)?;
    let command_line = args.join(" ");
    debug!("Running auxiliary command: {}", command_line);

    let child = Command::new(program)
        .args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ShellError::Io {
            command: command_line.clone(),
            source,
        })?;

    // Dropping the wait future on timeout drops the child, which kills it
    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| ShellError::Io {
            command: command_line.clone(),
            source,
        })?,
        Err(_) => {
            warn!("Auxiliary command timed out after {:?}: {}", limit, command_line);
            return Err(ShellError::Timeout {
                command: command_line,
                seconds: limit.as_secs_f64(),
            });
        }
    };

    let mut bytes = output.stdout;
    bytes.extend_from_slice(&output.stderr);

    Ok(ShellOutput {
        code: output.status.code().unwrap_or(-1),
        output: decode_output(&bytes).trim().to_string(),
    })
}
