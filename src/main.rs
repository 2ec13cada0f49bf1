use anyhow::{Context, Result};
use clap::Parser;
use media_relay::{create_router, AppState, Config};
use std::path::PathBuf;
use tracing::info;

/// Relay paced mu-law audio onto telephony media streams
#[derive(Debug, Parser)]
#[command(name = "media-relay", version)]
struct Args {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/media-relay")]
    config: String,

    /// Override the outbound PCM source
    #[arg(long)]
    pcm: Option<PathBuf>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;

    if let Some(pcm) = args.pcm {
        cfg.audio.pcm_path = pcm.display().to_string();
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!(
        "Outbound audio: {} ({}Hz, {} samples every {}ms, gain {})",
        cfg.audio.pcm_path,
        cfg.audio.sample_rate,
        cfg.audio.frame_samples,
        cfg.audio.frame_interval_ms,
        cfg.audio.gain
    );

    let mut session_config = cfg.audio.session_config();
    session_config.pcm = session_config.pcm.preload().await;

    let app = create_router(AppState::new(session_config));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on http://{} (media socket at /stream)", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
