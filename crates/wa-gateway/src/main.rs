//! wa-gateway: warehouse agent main binary
//!
//! Usage:
//!   wa-gateway                     - Start the web shell
//!   wa-gateway --cli               - Start interactive CLI mode
//!   wa-gateway --execute "<text>"  - Answer one question and exit
//!   wa-gateway --help              - Show help

mod cli;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use wa_core::warehouse::{self, DataSource};
use wa_core::{Config, Dispatcher, DispatcherConfig, LlmClient, ReActReasoner, Toolset, TranscriptStore};
use wa_tools::{QueryExecutor, register_default_tools};
use wa_web::{WebConfig, WebServer};

/// Run mode
#[derive(Debug, PartialEq)]
enum RunMode {
    /// Web shell
    Server,
    /// Interactive CLI mode
    Cli,
    /// One-shot question
    Execute(String),
    /// Show help
    Help,
    /// Show version
    Version,
}

/// Everything a turn needs, wired once at startup
pub struct Runtime {
    pub dispatcher: Arc<Dispatcher>,
    pub source: Arc<dyn DataSource>,
}

impl Runtime {
    /// Release the warehouse connection
    pub async fn close(&self) {
        if let Err(e) = self.source.close().await {
            tracing::warn!("Error closing warehouse connection: {}", e);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = parse_args(&args);

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("wa-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting wa-gateway...");
    tracing::info!("Model: {}", config.llm.model);

    let runtime = build_runtime(&config)?;

    let result = match mode {
        RunMode::Cli => {
            tracing::info!("Running in CLI mode");
            cli::run_cli(&runtime).await
        }
        RunMode::Execute(question) => cli::run_execute(&runtime, &question).await,
        RunMode::Server => run_server(&config, &runtime).await,
        RunMode::Help | RunMode::Version => Ok(()),
    };

    runtime.close().await;
    result
}

/// Parse command line arguments
fn parse_args(args: &[String]) -> RunMode {
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--cli" | "-c" => return RunMode::Cli,
            "--execute" | "-e" => {
                let question = iter.cloned().collect::<Vec<_>>().join(" ");
                return RunMode::Execute(question);
            }
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Server
}

/// Construct the completion client, data source, tools, memory and dispatcher.
fn build_runtime(config: &Config) -> anyhow::Result<Runtime> {
    let url = config
        .warehouse
        .resolve_url()
        .map_err(|e| anyhow::anyhow!("Warehouse config error: {}", e))?;
    let source = warehouse::connect(&url)
        .map_err(|e| anyhow::anyhow!("Failed to connect to warehouse: {}", e))?;

    let client = LlmClient::new(&config.llm)
        .map_err(|e| anyhow::anyhow!("Failed to create LLM client: {}", e))?;
    let model: Arc<LlmClient> = Arc::new(client);

    let executor = Arc::new(QueryExecutor::new(source.clone(), model.clone(), &config.query));

    let mut toolset = Toolset::new();
    register_default_tools(&mut toolset, executor, model.clone(), &config.code_execution)
        .map_err(|e| anyhow::anyhow!("Failed to register tools: {}", e))?;

    let reasoner = Arc::new(ReActReasoner::new(model));
    let mut dispatcher = Dispatcher::new(
        reasoner,
        Arc::new(toolset),
        DispatcherConfig::from(&config.agent),
    );

    if config.memory.enabled {
        let store = TranscriptStore::new(&config.memory.db_path)
            .map_err(|e| anyhow::anyhow!("Failed to open memory store: {}", e))?;
        tracing::info!("Conversation memory enabled at {}", config.memory.db_path);
        dispatcher = dispatcher.with_memory(Arc::new(store), config.memory.window);
    } else {
        tracing::info!("Conversation memory is disabled");
    }

    Ok(Runtime {
        dispatcher: Arc::new(dispatcher),
        source,
    })
}

/// Print help message
fn print_help() {
    println!("wa-gateway - natural-language questions over a data warehouse");
    println!();
    println!("Usage:");
    println!("  wa-gateway                     Start the web shell");
    println!("  wa-gateway --cli               Start interactive CLI mode");
    println!("  wa-gateway --execute \"<text>\"  Answer one question and exit");
    println!("  wa-gateway --help              Show this help message");
    println!("  wa-gateway --version           Show version");
    println!();
    println!("Configuration is read from warehouse-agent.toml, then the environment.");
    println!();
    println!("Environment Variables:");
    println!("  LLM_API_KEY          API key (required)");
    println!("  LLM_MODEL            Model name (default: claude-sonnet-4-20250514)");
    println!("  LLM_PROVIDER         Provider: claude or openai (default: claude)");
    println!("  LLM_BASE_URL         Custom API endpoint");
    println!("  WAREHOUSE_URL        Warehouse connection URL (e.g. sqlite://orders.db)");
    println!("  SERVER_PORT          Web shell port (default: 3000)");
    println!("  MEMORY_ENABLED       Thread prior turns per session (default: false)");
}

/// Run the web shell until Ctrl+C
async fn run_server(config: &Config, runtime: &Runtime) -> anyhow::Result<()> {
    let server = WebServer::new(WebConfig::from(&config.server), runtime.dispatcher.clone());

    tracing::info!("wa-gateway initialized with tools: {}", runtime.dispatcher.tools().names().join(", "));
    tracing::info!("Press Ctrl+C to exit");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
            tracing::info!("Shutting down...");
        })
        .await
        .map_err(|e| anyhow::anyhow!("Web shell error: {}", e))?;

    tracing::info!("Shutdown complete");
    Ok(())
}
