/// Set up the tracing subscriber for the program.
///
/// The filter comes from RUST_LOG, with `info` as the default; `--verbose` forces `debug`, which
/// adds an event per parsed line.  Events go to stderr in compact form, or as JSON lines if
/// requested.  If a log file is configured then events are appended to it as JSON lines instead.
use anyhow::{anyhow, Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub fn init_logging(log_file: Option<&Path>, verbose: bool, json: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let res = if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Could not open log file {}", path.display()))?;
        builder.json().with_writer(Mutex::new(file)).try_init()
    } else if json {
        builder.json().with_writer(std::io::stderr).try_init()
    } else {
        builder.compact().with_writer(std::io::stderr).try_init()
    };
    res.map_err(|e| anyhow!("Could not initialize logging: {e}"))
}

// There can be only one global subscriber per process, so this is the only test that installs it.

#[test]
fn test_init_logging() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logreport.log");
    init_logging(Some(&path), true, false).unwrap();
    tracing::debug!(lines = 3, "logging test debug event");
    tracing::info!("logging test info event");

    // Other tests run concurrently and may log into the same file, so look only for our events.
    let text = std::fs::read_to_string(&path).unwrap();
    let events = text
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
        .filter(|e| {
            e["fields"]["message"]
                .as_str()
                .is_some_and(|m| m.starts_with("logging test"))
        })
        .collect::<Vec<_>>();
    assert!(events.len() == 2);
    assert!(events[0]["level"] == "DEBUG");
    assert!(events[0]["fields"]["message"] == "logging test debug event");
    assert!(events[0]["fields"]["lines"] == 3);
    assert!(events[1]["level"] == "INFO");
    assert!(events[1]["fields"]["message"] == "logging test info event");

    assert!(init_logging(None, false, false).is_err());
}
