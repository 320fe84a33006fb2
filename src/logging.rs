use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. `RUST_LOG` wins over the `-v` count.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fellow_payouts={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_writer(std::io::stderr)
        .init();

    debug!("logging initialised at verbosity {verbose}");
}
