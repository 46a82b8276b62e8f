use anyhow::Context;

use ollama_mcp_bridge::config::AppConfig;
use ollama_mcp_bridge::{init_tracing, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config);
    server::serve(&config).await
}
