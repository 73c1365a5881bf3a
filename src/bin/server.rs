//! iMessage MCP Server
//!
//! Run with: imessage-mcp

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use imessage_mcp::error::{IMessageError, Result};
use imessage_mcp::mcp::{IMessageHandler, McpServer};
use imessage_mcp::types::{AutomationConfig, Service, StoreConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "imessage-mcp")]
#[command(about = "MCP server for reading and sending iMessages")]
struct Args {
    /// Messages database path
    #[arg(
        long,
        env = "IMESSAGE_DB_PATH",
        default_value = "~/Library/Messages/chat.db"
    )]
    db_path: String,

    /// SQLite busy timeout in ms
    #[arg(long, env = "IMESSAGE_BUSY_TIMEOUT_MS", default_value = "5000")]
    busy_timeout_ms: u64,

    /// osascript binary
    #[arg(long, env = "IMESSAGE_OSASCRIPT", default_value = "osascript")]
    osascript: String,

    /// Default service for one-to-one sends (imessage or sms)
    #[arg(long, env = "IMESSAGE_SERVICE", default_value = "imessage")]
    service: Service,

    /// HTTP port for JSON-RPC over HTTP (0 = stdio)
    #[arg(long, env = "IMESSAGE_HTTP_PORT", default_value = "0")]
    http_port: u16,

    /// HTTP bind host
    #[arg(long, env = "IMESSAGE_HTTP_HOST", default_value = "127.0.0.1")]
    http_host: String,

    /// Log format written to stderr
    #[arg(long, env = "IMESSAGE_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_logging(format: LogFormat) {
    // stdout carries the protocol, so logs always go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
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

#[cfg(feature = "http")]
fn run_http(handler: IMessageHandler, host: String, port: u16) -> Result<()> {
    use imessage_mcp::mcp::http::{serve, HttpConfig};

    let config = HttpConfig { host, port };
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(serve(std::sync::Arc::new(handler), &config))
}

#[cfg(not(feature = "http"))]
fn run_http(_handler: IMessageHandler, _host: String, _port: u16) -> Result<()> {
    Err(IMessageError::Config(
        "HTTP transport requested but this build lacks the `http` feature".to_string(),
    ))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_format);

    // Expand ~ in path
    let db_path = shellexpand::tilde(&args.db_path).to_string();
    if db_path.trim().is_empty() {
        return Err(IMessageError::Config("db-path must not be empty".to_string()));
    }

    let store_config = StoreConfig {
        db_path: db_path.into(),
        busy_timeout_ms: args.busy_timeout_ms,
    };
    let automation = AutomationConfig {
        osascript: args.osascript,
        default_service: args.service,
    };

    let handler = IMessageHandler::new(store_config, automation);

    // The database opens lazily; report problems early without failing, since
    // Full Disk Access can be granted while the server is running
    if let Err(e) = handler.store().probe() {
        tracing::warn!("Messages database not readable yet: {}", e);
    }

    if args.http_port > 0 {
        tracing::info!("iMessage MCP server starting (HTTP)...");
        return run_http(handler, args.http_host, args.http_port);
    }

    tracing::info!("iMessage MCP server starting...");
    McpServer::new(handler).run()?;

    Ok(())
}
