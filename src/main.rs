//! Paper Relay
//!
//! Entry point for the interactive multi-server MCP chatbot.

use std::sync::Arc;

use anyhow::Context as _;
use dotenvy::dotenv;
use mimalloc::MiMalloc;
use tokio::io::{BufReader, stdin, stdout};
use tracing::info;

use paper_relay::chat::{Repl, report};
use paper_relay::config::AppConfig;
use paper_relay::llm::Orchestrator;
use paper_relay::mcp::Router;
use paper_relay::mcp::config::load_mcp_config;
use paper_relay::mcp::session::connect_all;
use paper_relay::session::Session;
use paper_relay::telemetry;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let config = AppConfig::load().context("Configuration error")?;
    telemetry::init(config.log.json);

    let settings = config.llm_settings().context("Configuration error")?;
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        protocol = ?settings.effective_protocol(),
        "LLM configuration loaded"
    );
    if settings.api_key.is_none() {
        tracing::warn!(name: "llm.config.no_api_key", "No API key configured for the model API");
    }

    // MCP: connect once at startup
    let servers = load_mcp_config(&config.mcp.servers_file).with_context(|| {
        format!(
            "Error loading server configuration from {}",
            config.mcp.servers_file
        )
    })?;
    let connected = connect_all(&servers).await;
    let router = Arc::new(Router::from_connections(connected.connections).await);

    info!(
        name: "mcp.registry.ready",
        servers = router.connections().len(),
        failed = connected.failures.len(),
        tools = router.registry().tool_count(),
        prompts = router.registry().prompt_count(),
        "Capability registry built"
    );
    print!(
        "{}",
        report::startup_report(router.registry(), &connected.failures)
    );

    let orchestrator = Orchestrator::new(
        settings,
        Arc::clone(&router),
        config.chat.max_tool_rounds,
    );
    let mut repl = Repl::new(orchestrator, Session::new(), BufReader::new(stdin()), stdout());
    repl.run().await?;

    router.close_all();
    println!("Closed all sessions and cleaned up resources.");
    Ok(())
}
