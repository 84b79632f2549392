use tracing_subscriber::EnvFilter;

/// Sets up logging to stderr.
///
/// `RUST_LOG` takes precedence over `level` when it is set, e.g.
/// `RUST_LOG=iterative_resolver::transport=debug`.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init()
        .ok();
}
