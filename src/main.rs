use clap::Parser;
use pdf_rag::{config::Config, create_router, utils::init_logger, AppState, RagPipeline};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pdf-rag", version, about = "Question answering over uploaded PDF documents")]
struct Cli {
    /// Interface to bind (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let log_dir = std::env::var_os("LOG_DIR").map(PathBuf::from);
    let _log_guard = init_logger(log_dir.as_deref());

    // Load configuration
    let mut config = Config::from_env()?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    info!("Configuration loaded: {:?}", config.server);

    info!("Loading models and vector index. This may take a moment on first run...");
    let pipeline = RagPipeline::initialize(&config).await?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(pipeline, config);
    let app = create_router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
