// Logging module - Logging infrastructure
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use std::io;

/// Filter used when neither `RUST_LOG` nor `--verbose` says otherwise
fn default_directives(level: &str, verbose: bool) -> String {
    let level = if verbose { "debug" } else { level };
    format!("irbridge={},warn", level)
}

/// Initialize logging system
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(level: &str, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(level, verbose)))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(verbose)
                .with_file(verbose)
                .with_line_number(verbose)
        )
        .try_init()?;

    tracing::debug!("irbridge logging system initialized");
    Ok(())
}
