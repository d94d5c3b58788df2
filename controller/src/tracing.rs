use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layered, SubscriberExt},
    registry::Registry,
};

/// Log lines go to stdout, filtered by `RUST_LOG` (`info` when unset).
pub fn subscriber() -> Layered<EnvFilter, Layered<fmt::Layer<Registry>, Registry>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
}
