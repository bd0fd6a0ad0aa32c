//! Tracing subscriber setup for the gateway binary.

use tracing_subscriber::EnvFilter;

/// Initialize logging. `RUST_LOG` wins; otherwise the supplied level is
/// applied to the hub crates and `info` to everything else.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,mcp_hub={default_level},hub_core={default_level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
