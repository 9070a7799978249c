//! Subscriber setup for the binary.
//!
//! Library code logs through the `log` facade; the fmt subscriber bridges
//! those records. Output goes to stderr and, when configured, to a log file.
//! `RUST_LOG` overrides the default filter; `RUST_LOG_FORMAT=json` switches
//! to JSON lines.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "sternengeschichten_graph=info";

/// Install the global subscriber. Subsequent calls are no-ops.
pub fn init(log_file: Option<&Path>, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "sternengeschichten_graph=debug"
        } else {
            DEFAULT_FILTER
        })
    });

    let is_json = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let file = log_file.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Could not open log file {:?}: {}", path, e);
                None
            }
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true);

    let result = match (file, is_json) {
        (Some(file), true) => builder
            .json()
            .with_writer(std::io::stderr.and(Mutex::new(file)))
            .try_init(),
        (Some(file), false) => builder
            .with_ansi(false)
            .with_writer(std::io::stderr.and(Mutex::new(file)))
            .try_init(),
        (None, true) => builder.json().with_writer(std::io::stderr).try_init(),
        (None, false) => builder.with_writer(std::io::stderr).try_init(),
    };

    if result.is_ok() {
        log::debug!("Set up logging successfully");
    }
}
