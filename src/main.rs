use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use mnemo_server::{ProviderSettings, ServerConfig};
use mnemo_telemetry::{init_telemetry, parse_level, TelemetryConfig};

/// Chat proxy with token-budgeted long-term memory.
#[derive(Debug, Parser)]
#[command(name = "mnemo", version)]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Address to bind.
    #[arg(long, env = "MNEMO_HOST", default_value = "0.0.0.0")]
    host: String,

    /// SQLite database holding long-term memory.
    #[arg(long, env = "MNEMO_DB", default_value = "chat_memory.db")]
    db: PathBuf,

    /// Default log level (trace, debug, info, warn, error). RUST_LOG wins.
    #[arg(long, env = "MNEMO_LOG", default_value = "info")]
    log: String,

    /// Emit JSON log lines.
    #[arg(long, env = "MNEMO_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; variables may come from the environment.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let level = parse_level(&args.log)
        .with_context(|| format!("unknown log level '{}'", args.log))?;
    let _ = init_telemetry(
        &TelemetryConfig::default()
            .with_level(level)
            .with_json(args.log_json),
    );

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting mnemo");

    let settings = ProviderSettings::from_env();
    for kind in mnemo_llm::ProviderKind::ALL {
        if settings.api_key(kind).is_none() {
            tracing::warn!(provider = %kind, var = kind.api_key_var(), "API key not set");
        }
    }

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        database_path: args.db,
        ..ServerConfig::default()
    };
    let handle = mnemo_server::start(config, settings)
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port, "mnemo ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
