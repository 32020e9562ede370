use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable consulted when `RUST_LOG` is unset.
pub const LOG_ENV: &str = "HOST_RECON_LOGLEVEL";

fn default_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "warn" };
    format!("{}={}", env!("CARGO_CRATE_NAME"), level)
}

/// Install a stderr `tracing` subscriber. Report output stays on stdout.
pub fn initialize_logging(verbose: bool) -> Result<()> {
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var(LOG_ENV))
        .unwrap_or_else(|_| default_filter(verbose));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::try_new(filter)?);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_lowers_level() {
        assert!(default_filter(true).ends_with("=debug"));
        assert!(default_filter(false).ends_with("=warn"));
    }
}
