//! Structured logging setup, scaled by repeated `-v` flags the way the
//! wharf CLI's `Args` counts them.

use tracing_subscriber::EnvFilter;

/// Output and logging configuration for one CLI invocation.
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Suppress non-error output.
    pub quiet: bool,
    /// Verbosity level: 0=WARN, 1=INFO, 2=DEBUG, 3+=TRACE.
    pub verbose: u8,
    /// Optional path to additionally mirror logs into.
    pub log_file: Option<std::path::PathBuf>,
}

fn level_for(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Installs a `tracing` subscriber writing to stderr, honoring `RUST_LOG`
/// when set and otherwise deriving a default filter from `config`.
pub fn init_tracing(config: &OutputConfig) -> Result<(), anyhow::Error> {
    let default_level = level_for(config.verbose, config.quiet);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wharf={default_level}")));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_escalates_with_verbosity() {
        assert_eq!(level_for(0, false), "warn");
        assert_eq!(level_for(1, false), "info");
        assert_eq!(level_for(3, false), "trace");
        assert_eq!(level_for(3, true), "error");
    }
}
