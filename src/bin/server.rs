//! PromptMCP stdio server binary.
//!
//! Wires every capability (cache, Context7 client, curator, project
//! analyzer, todo store, LLM client, breakdown engine) into a single
//! `EnhanceOrchestrator`, then runs the JSON-RPC 2.0 read/dispatch/write
//! loop over stdin/stdout until EOF. Stdout is reserved for the JSON-RPC
//! frames; all logging goes to stderr (see `telemetry::init_telemetry`).

use promptmcp::config::Config;
use promptmcp::context7_client::Context7Client;
use promptmcp::doc_curator::DocumentationCurator;
use promptmcp::llm_client::LlmClient;
use promptmcp::mcp::transport::StdioTransport;
use promptmcp::mcp::McpServer;
use promptmcp::orchestrator::EnhanceOrchestrator;
use promptmcp::project_analyzer::ProjectAnalyzer;
use promptmcp::prompt_cache::PromptCache;
use promptmcp::task_breakdown::TaskBreakdownEngine;
use promptmcp::telemetry::{init_telemetry, TelemetryConfig};
use promptmcp::todo_store::TodoStore;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_telemetry(TelemetryConfig::from_env(&config.log_level))?;

    info!(workspace = %config.workspace_path.display(), "promptmcp starting");

    let cache = PromptCache::open(&config.cache_db_path(), config.cache.clone()).await;
    let context7 = Context7Client::new(config.context7.clone());
    let curator = DocumentationCurator::new(config.curator.clone());
    let analyzer = ProjectAnalyzer::new(&config.workspace_path, config.analyzer.clone());
    let todos = TodoStore::open(&config.todo_db_path()).await?;
    let breakdown_engine = TaskBreakdownEngine::new(config.breakdown.clone());
    let llm = if config.llm.enabled {
        Some(LlmClient::new(config.llm.clone()))
    } else {
        None
    };

    let orchestrator = EnhanceOrchestrator::new(
        cache,
        context7,
        curator,
        analyzer,
        todos,
        llm,
        breakdown_engine,
        config.concurrency.clone(),
        config.context7.fan_out,
        config.context7.stage_deadline,
        config.default_max_tokens,
    );

    let server = McpServer::new(orchestrator);
    let mut transport = StdioTransport::new();
    server.run(&mut transport).await?;

    info!("promptmcp shut down cleanly");
    Ok(())
}
