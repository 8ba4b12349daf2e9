//! iperf-watcher
//!
//! Drives iperf3 client runs on behalf of a browser, normalizes their output
//! into bandwidth samples and streams them live over server-sent events, while
//! tracking interface error counters for the duration of each run.

pub mod cli;
pub mod collectors;
pub mod iperf;
pub mod run;
pub mod settings;
pub mod web;
