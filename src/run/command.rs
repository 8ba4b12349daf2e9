//! iperf3 command line construction and binary resolution

use log::debug;
use std::path::{Path, PathBuf};

use crate::run::request::{Mode, Protocol, RunConfig};
use crate::settings::Settings;

const FALLBACK_BINARY: &str = "iperf3";

/// Program and arguments of one measurement process
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl MeasurementCommand {
    /// Builds the iperf3 client invocation for `config`
    pub fn build(program: impl Into<PathBuf>, config: &RunConfig) -> Self {
        let mut args: Vec<String> = vec![
            "-c".into(),
            config.target.clone(),
            "-p".into(),
            config.port.to_string(),
            "-P".into(),
            config.streams.to_string(),
            "-i".into(),
            config.interval_secs.to_string(),
            "-t".into(),
            config.duration_secs.to_string(),
            "--json-stream".into(),
            "--forceflush".into(),
            "--connect-timeout".into(),
            config.connect_timeout_ms.to_string(),
        ];

        if config.protocol == Protocol::Udp {
            args.extend(["-u".into(), "-b".into(), config.bandwidth.clone()]);
        }
        if config.mode == Mode::Download {
            args.push("-R".into());
        }

        Self {
            program: program.into(),
            args,
        }
    }

    /// Renders the command line for display, quoted for the host shell
    pub fn display(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .map(|arg| quote_arg(&arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(not(windows))]
fn quote_arg(arg: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c);
    if !arg.is_empty() && arg.chars().all(safe) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r#"'"'"'"#))
    }
}

#[cfg(windows)]
fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"']) {
        arg.to_string()
    } else {
        format!("\"{}\"", arg.replace('"', "\\\""))
    }
}

/// Bundled binary name for this OS and architecture, if one ships
fn bundled_binary_name() -> Option<&'static str> {
    if cfg!(windows) {
        return Some("iperf3.exe");
    }
    match std::env::consts::ARCH {
        "x86_64" => Some("iperf3-amd64"),
        "aarch64" => Some("iperf3-arm64v8"),
        _ => None,
    }
}

/// Picks the iperf3 binary: explicit setting, then the bundled copy in
/// `<exe dir>/../IPERF/`, then `iperf3` from `PATH`
pub fn resolve_binary(settings: &Settings) -> PathBuf {
    if let Some(explicit) = &settings.iperf_binary {
        return explicit.clone();
    }

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    if let (Some(dir), Some(name)) = (exe_dir, bundled_binary_name()) {
        let candidate = dir.join("..").join("IPERF").join(name);
        if candidate.is_file() {
            ensure_executable(&candidate);
            debug!("Using bundled iperf3 at {}", candidate.display());
            return candidate;
        }
    }

    PathBuf::from(FALLBACK_BINARY)
}

#[cfg(unix)]
fn ensure_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(metadata) = path.metadata() {
        let mut permissions = metadata.permissions();
        permissions.set_mode(permissions.mode() | 0o100);
        if let Err(e) = std::fs::set_permissions(path, permissions) {
            debug!("Could not mark {} executable: {}", path.display(), e);
        }
    }
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) {}
