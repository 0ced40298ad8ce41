//! Logging initialization via `tracing`.
//!
//! Verbosity tiers: `--quiet` shows errors only, default shows warnings,
//! `-v` info, `-vv` debug, `-vvv` trace. `LB_LOG` overrides everything with
//! a full `EnvFilter` directive string.

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber for a CLI invocation.
///
/// Logs go to stderr so `-j` output on stdout stays machine-parseable. The
/// worker child inherits this; its stderr is redirected to `sync.log` by the
/// launcher.
///
/// # Errors
///
/// Returns an error string if a subscriber is already installed.
pub fn init_logging(verbose: u8, quiet: bool) -> Result<(), String> {
    let filter = if let Ok(directive) = std::env::var("LB_LOG") {
        EnvFilter::new(directive)
    } else {
        let level = if quiet {
            "error"
        } else {
            match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        };
        EnvFilter::new(format!("lb={level}"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| e.to_string())
}

/// Install a quiet test subscriber; safe to call from every test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("lb=debug"))
        .with_writer(std::io::stderr)
        .with_test_writer()
        .try_init();
}
