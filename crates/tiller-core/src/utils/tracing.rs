use chrono::Local;
use std::io;
use std::path::PathBuf;
use tracing_appender::rolling;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

use super::tiller_home;

/// Install the global subscriber.
///
/// Logs go to `~/.tiller/logs/<timestamp>.log` so that provider and engine
/// output never reaches the terminal. Without a home directory they go to
/// stderr. The filter comes from `RUST_LOG`. Returns the log file path, if any.
pub fn init_tracing() -> io::Result<Option<PathBuf>> {
    let filter = EnvFilter::from_default_env();

    let Some(log_dir) = tiller_home().map(|home| home.join("logs")) else {
        tracing_subscriber::registry()
            .with(
                fmt::Layer::default()
                    .with_writer(io::stderr)
                    .with_ansi(true)
                    .with_target(true),
            )
            .with(filter)
            .try_init()
            .map_err(io::Error::other)?;

        tracing::debug!(
            target: "tiller_core::utils::tracing",
            "Tracing initialized with stderr output. Filter configured via RUST_LOG env var."
        );
        return Ok(None);
    };

    std::fs::create_dir_all(&log_dir)?;
    let file_name = format!("{}.log", Local::now().format("%Y%m%d_%H%M%S"));
    let file_appender = rolling::never(&log_dir, &file_name);

    tracing_subscriber::registry()
        .with(
            fmt::Layer::new()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .with_file(true)
                .with_line_number(true),
        )
        .with(filter)
        .try_init()
        .map_err(io::Error::other)?;

    let path = log_dir.join(file_name);
    tracing::debug!(
        target: "tiller_core::utils::tracing",
        path = %path.display(),
        "Tracing initialized with file output. Filter configured via RUST_LOG env var."
    );
    Ok(Some(path))
}
