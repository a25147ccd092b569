use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` directives are honored on top
/// of the crate default.
pub fn init_tracing() {
    let filter = EnvFilter::from_default_env().add_directive(
        "analytics_service=info"
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
    );

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
