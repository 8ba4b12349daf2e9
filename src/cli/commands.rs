use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::settings::DEFAULT_SETTINGS_FILE;

/// Main CLI structure for the iperf-watcher application
#[derive(Parser, Debug)]
#[command(author = "Kaipo Chen")]
#[command(version)]
#[command(about = "iperf3 web relay - start bandwidth runs from the browser and watch them live")]
#[command(long_about = "iperf-watcher drives iperf3 client runs on request, turns their output into \
bandwidth samples in the unit of your choice and streams them to the browser as server-sent events. \
Interface error and drop counters are captured when a run starts so their growth during the run \
can be reported.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    #[command(about = "Serve the web API and the live measurement stream")]
    #[command(long_about = "Starts the HTTP server. Settings are read from the settings file and \
IPW_-prefixed environment variables; --host and --port override them.\n\n\
Examples:\n  \
ipw serve                             # Listen on the configured address (0.0.0.0:5000)\n  \
ipw serve --port 8080                 # Override the port\n  \
ipw serve --settings /etc/ipw.json    # Use another settings file")]
    Serve {
        /// Settings file (JSON)
        #[arg(short, long, default_value = DEFAULT_SETTINGS_FILE, help = "Path of the settings file")]
        settings: PathBuf,

        #[arg(long, help = "Address to listen on (overrides web_host)")]
        host: Option<String>,

        #[arg(short, long, help = "Port to listen on (overrides web_port)")]
        port: Option<u16>,
    },

    /// List the interfaces a run can be bound to
    #[command(about = "List network interfaces")]
    Interfaces,

    /// Print link state and error counters of one interface
    #[command(about = "Show link info and error/drop counters of an interface as JSON")]
    Stats {
        #[arg(short = 'I', long, help = "Interface to query")]
        iface: String,
    },
}
