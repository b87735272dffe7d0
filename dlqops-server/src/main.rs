use std::sync::Arc;

use clap::Parser;
use dlqops_core::DlqOpsConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use dlqops_server::{server, AppContext};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "dlqops.toml")]
    config: String,

    /// Check every configured DLQ is reachable and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match DlqOpsConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Build backends once
    let ctx = match AppContext::from_config(config) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            eprintln!("Failed to configure backends: {:#}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        let mut healthy = true;
        for name in ctx.config.dlq_names() {
            match dlqops_server::subsystems::tools::get_queue_message_count(&ctx, &name).await {
                Ok(count) => println!("✅ {}: {} messages", name, count),
                Err(e) => {
                    println!("❌ {}: {:#}", name, e);
                    healthy = false;
                }
            }
        }

        if !healthy {
            std::process::exit(1);
        }
        println!("✅ dlqops queue health check passed");
        return Ok(());
    }

    // IPC Server
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // HTTP REST API, if enabled
    if ctx.config.http.enabled {
        let http_ctx = ctx.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = dlqops_server::http::start_http_server(http_ctx, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = ctx.config.service.socket_path.clone();
    server::run_unix_server(&socket_path, ctx, tx.subscribe()).await?;

    Ok(())
}
