pub mod agent_engine;
pub mod case;
pub mod commands;
pub mod config;
pub mod device;
pub mod errors;
pub mod perception;

/// Installs the stderr log subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
