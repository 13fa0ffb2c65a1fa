use anyhow::{Context, Result};
use biomed_mcp::config::{find_config_file, load_config, Config};
use biomed_mcp::mcp::server::McpServer;
use biomed_mcp::mcp::{Dispatcher, ToolRegistry};
use biomed_mcp::models::{ToolDescriptor, ToolRequest};
use biomed_mcp::sources::SourceRegistry;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Biomed MCP - bioRxiv, ClinicalTrials.gov and PubMed as callable tools
#[derive(Parser, Debug)]
#[command(name = "biomed-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Serve bioRxiv, ClinicalTrials.gov and PubMed as MCP tools", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v debug, -vv trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a server transport (MCP stdio by default)
    Serve {
        /// Transport to serve
        #[arg(long, short, value_enum, default_value_t = Transport::Stdio)]
        transport: Transport,

        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to server.port)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// List the registered tools
    #[command(alias = "ls")]
    Tools {
        /// Print descriptors as JSON
        #[arg(long, short)]
        json: bool,
    },

    /// Invoke one tool and print its result
    Call {
        /// Tool name, e.g. pubmed_search
        tool: String,

        /// Arguments as a JSON object
        #[arg(long, short, default_value = "{}")]
        args: String,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Print supported environment variables
    Env,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Transport {
    /// MCP over stdin/stdout
    Stdio,
    /// MCP over streamable HTTP
    Http,
    /// JSON-over-HTTP REST routes
    Rest,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

fn print_env_vars() {
    println!("Biomed MCP - Environment Variables");
    println!();
    println!("Credentials:");
    println!("  NCBI_API_KEY                 NCBI E-utilities API key (raises PubMed limit to 10 req/s)");
    println!("  NCBI_EMAIL                   Contact email sent with every E-utilities request");
    println!();
    println!("Configuration overrides (prefix BIOMED_MCP, '__' between sections):");
    println!("  BIOMED_MCP__SERVER__HOST                        Bind host (default: 127.0.0.1)");
    println!("  BIOMED_MCP__SERVER__PORT                        Bind port (default: 8080)");
    println!("  BIOMED_MCP__SERVER__REQUEST_TIMEOUT_SECS        Transport deadline (default: 90)");
    println!("  BIOMED_MCP__DISPATCHER__TIMEOUT_SECS            Per-invocation timeout (default: 60)");
    println!("  BIOMED_MCP__RETRY__BACKOFF_FLOOR_MS             Rate-limit backoff floor (default: 1000)");
    println!("  BIOMED_MCP__RETRY__MAX_WAIT_SECS                Longest honored Retry-After (default: 10)");
    println!("  BIOMED_MCP__SOURCES__PUBMED__ENABLED            Register PubMed tools (default: true)");
    println!("  BIOMED_MCP__SOURCES__PUBMED__BASE_URL           E-utilities base URL");
    println!("  BIOMED_MCP__SOURCES__PUBMED__REQUESTS_PER_SECOND");
    println!("  BIOMED_MCP__SOURCES__CLINICAL_TRIALS__BASE_URL  ClinicalTrials.gov API v2 base URL");
    println!("  BIOMED_MCP__SOURCES__BIORXIV__BASE_URL          bioRxiv API base URL");
    println!("  BIOMED_MCP__SOURCES__BIORXIV__SEARCH_WINDOW_DAYS  Default search window (default: 30)");
    println!();
    println!("Other Settings:");
    println!("  RUST_LOG                     Log filter (overrides -v/-q)");
    println!();
    println!("Example:");
    println!("  export NCBI_API_KEY=\"your-key\"");
    println!("  export BIOMED_MCP__SERVER__PORT=9000");
}

fn init_tracing(cli: &Cli) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("biomed_mcp={}", level)),
    );

    // stdout belongs to the stdio transport
    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

fn build_dispatcher(config: &Config) -> Result<Dispatcher> {
    let sources = SourceRegistry::from_config(config).context("Failed to build source adapters")?;
    let tools = ToolRegistry::from_sources(&sources).context("Failed to register tools")?;
    tracing::debug!("Registered {} tools from {} sources", tools.len(), sources.len());

    Ok(Dispatcher::new(Arc::new(tools), config.dispatcher.timeout()))
}

fn print_tools(tools: &[&ToolDescriptor], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(tools)?);
        return Ok(());
    }

    use comfy_table::{Attribute, Cell, Table};
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Tool", "Parameters", "Description"]);

    for tool in tools {
        let params = tool
            .parameters
            .iter()
            .map(|p| {
                let marker = if p.required { "*" } else { "" };
                format!("{}{}: {}", p.name, marker, p.param_type.schema_name())
            })
            .collect::<Vec<_>>()
            .join("\n");

        table.add_row(vec![
            Cell::new(&tool.name).add_attribute(Attribute::Bold),
            Cell::new(params),
            Cell::new(&tool.description),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn parse_args(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(raw).context("--args is not valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("--args must be a JSON object"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Some(path) = find_config_file(cli.config.as_deref()) {
        tracing::info!("Using config file: {}", path.display());
    }
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Env) => print_env_vars(),

        Some(Commands::Config) => print!("{}", config.to_toml()?),

        Some(Commands::Tools { json }) => {
            let dispatcher = build_dispatcher(&config)?;
            print_tools(&dispatcher.tools(), json)?;
        }

        Some(Commands::Call { tool, args }) => {
            let request = ToolRequest {
                tool,
                arguments: parse_args(&args)?,
            };
            let dispatcher = build_dispatcher(&config)?;
            let result = dispatcher.invoke(&request).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Some(Commands::Serve {
            transport,
            host,
            port,
        }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(&config, transport).await?;
        }

        None => serve(&config, Transport::Stdio).await?,
    }

    Ok(())
}

async fn serve(config: &Config, transport: Transport) -> Result<()> {
    let dispatcher = build_dispatcher(config)?;
    let request_timeout = config.server.request_timeout();
    let addr = config.server.address();

    match transport {
        Transport::Stdio => {
            let server = McpServer::new(dispatcher, request_timeout)?;
            server.run_stdio().await?;
        }
        Transport::Http => {
            let server = McpServer::new(dispatcher, request_timeout)?;
            let (bound_addr, handle) = server.run_http(&addr).await?;
            tracing::info!("MCP server listening on {}", bound_addr);

            handle
                .await
                .map_err(|e| anyhow::anyhow!("Server task failed: {}", e))?;
        }
        Transport::Rest => {
            biomed_mcp::rest::serve(&addr, dispatcher, request_timeout)
                .await
                .with_context(|| format!("REST server on {} failed", addr))?;
        }
    }

    Ok(())
}
