pub mod config;
pub mod mcp_client;
pub mod mcp_server;
pub mod ollama;
pub mod server;
pub mod state;
pub mod transport;

use config::{AppConfig, LogFormat};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over the built-in filter. Output is human-readable by
/// default and one JSON object per line with `log_format: json`. Calling
/// this twice is harmless; the second subscriber is ignored.
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ollama_mcp_bridge=info,tower_http=info,warn"));

    let installed = match config.log_format {
        LogFormat::Json => fmt::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .try_init(),
        LogFormat::Pretty => fmt::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .try_init(),
    };

    if installed.is_ok() {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            ollama = %config.ollama_base_url,
            pid = std::process::id(),
            "=== ollama-mcp-bridge starting ==="
        );
    }
}
