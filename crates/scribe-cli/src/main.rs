mod config;

use clap::{Parser, Subcommand};
use config::ScribeConfig;
use futures_util::StreamExt;
use scribe_gateway::GatewayServer;
use scribe_graph::{
    chat_model, AgentGraph, DuckDuckGoSearch, GraphInput, Prompts, ResearchGraph, ToolRegistry,
};
use scribe_protocol::StreamTranslator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scribe", about = "Scribe: research reports streamed to the browser")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "scribe.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Research one topic and print the protocol lines to stdout
    Ask {
        /// The topic to research
        topic: String,
    },
    /// List the tools offered to the reporter
    Tools,
}

async fn build_graph(config: &ScribeConfig) -> anyhow::Result<ResearchGraph> {
    if config.model.api_key.is_empty() {
        warn!("No API key configured; set OPENAI_API_KEY or [model].api_key");
    }
    let prompts = Prompts::load(config.prompts_dir.as_deref()).await?;
    let tools = ToolRegistry::with_builtins();
    info!(
        model = %config.model.model_id,
        provider = ?config.model.provider,
        tools = tools.len(),
        "Research graph ready"
    );

    Ok(ResearchGraph::new(
        chat_model(config.model.clone()),
        Arc::new(DuckDuckGoSearch::new(&config.search)),
        tools,
        prompts,
        config.graph_settings(),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e.into());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = ScribeConfig::load(&cli.config).await?;
    config.apply_env(|name| std::env::var(name).ok());

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let graph: Arc<dyn AgentGraph> = Arc::new(build_graph(&config).await?);
            let app = GatewayServer::build(graph, config.gateway())?;

            let addr = format!("{}:{}", host, port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Scribe listening on {}", addr);
            axum::serve(listener, app).await?;
        }
        Commands::Ask { topic } => {
            let input = GraphInput::new(topic.trim());
            input.validate(config.server.max_topic_chars)?;

            let graph = build_graph(&config).await?;
            let mut lines =
                Box::pin(StreamTranslator::new(&config.stream.translator).translate(graph.stream(input)));

            let mut stdout = tokio::io::stdout();
            while let Some(line) = lines.next().await {
                stdout.write_all(line.as_bytes()).await?;
                stdout.flush().await?;
            }
        }
        Commands::Tools => {
            let tools = ToolRegistry::with_builtins().specs();
            println!("Reporter tools:");
            for tool in &tools {
                println!("  {}: {}", tool.name, tool.description);
            }
            println!("\nTotal: {} tool(s)", tools.len());
        }
    }

    Ok(())
}
