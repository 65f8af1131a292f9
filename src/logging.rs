//! Structured logging initialization for the CLI.
//!
//! Supports both human-friendly and machine-readable (JSON) output
//! formats, with TTY detection and verbosity control. Logs always go
//! to stderr; stdout is reserved for host notifications and command
//! output.

use std::io::{self, IsTerminal};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize the tracing subscriber based on CLI flags and environment.
///
/// # Arguments
///
/// * `json` - If true, output structured JSON logs for machine consumption
/// * `verbose` - Verbosity level: 0 = info, 1 = debug, 2+ = trace
/// * `quiet` - If true, suppress non-essential output (only errors)
///
/// # Environment Variables
///
/// * `RUST_LOG` - Override default filter (e.g., "lgsync=debug,notify=warn")
pub fn init_logging(json: bool, verbose: u8, quiet: bool) {
    let default_directive = if quiet {
        "lgsync=error"
    } else {
        match verbose {
            0 => "lgsync=info",
            1 => "lgsync=debug",
            _ => "lgsync=trace",
        }
    };

    // Allow RUST_LOG to override, but use our default otherwise
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    if json {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(false)
            .with_span_events(FmtSpan::NONE)
            .with_writer(io::stderr);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    } else if io::stderr().is_terminal() {
        let fmt_layer = fmt::layer()
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(false)
            .with_span_events(FmtSpan::NONE)
            .with_writer(io::stderr);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    } else {
        // Compact output for non-TTY (piped, redirected)
        let fmt_layer = fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(false)
            .with_span_events(FmtSpan::NONE)
            .compact()
            .with_writer(io::stderr);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}
