use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ai_voice_connector::core::call::{CallManager, openai_factory};
use ai_voice_connector::signaling::{
    EventDispatcher, EventListener, MiDatagramClient, SharedSignaling,
};
use ai_voice_connector::GatewayConfig;

/// AI Voice Connector - bridges SIP calls to a realtime conversational AI backend
#[derive(Parser, Debug)]
#[command(name = "ai-voice-connector")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Needed by wss:// connections to the AI backend
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = GatewayConfig::load(cli.config).map_err(|e| anyhow!(e.to_string()))?;
    if !config.has_api_key() {
        warn!("OPENAI_API_KEY is not set; incoming calls will be rejected");
    }

    let mi = MiDatagramClient::resolve(
        &config.opensips.ip,
        config.opensips.port,
        config.mi_timeout(),
    )
    .await?;
    info!("Using management interface at {}", mi.addr());
    let signaling: SharedSignaling = Arc::new(mi);

    let manager = CallManager::new(
        Arc::clone(&signaling),
        openai_factory(
            Arc::new(config.openai.clone()),
            config.engine.unknown_event_policy,
        ),
        config.call_manager_config(),
    );

    let listener = Arc::new(
        EventListener::bind(
            &config.engine.event_ip,
            config.engine.event_port,
            Arc::clone(&signaling),
            EventDispatcher::new(Arc::clone(&manager)),
        )
        .await?,
    );
    info!("Listening for events at {}", listener.socket_uri());

    let cancel = CancellationToken::new();
    let serving = {
        let listener = Arc::clone(&listener);
        let cancel = cancel.clone();
        tokio::spawn(async move { listener.run(cancel).await })
    };

    shutdown_signal().await;
    info!("Shutting down");

    cancel.cancel();
    if let Err(e) = serving.await {
        warn!("Event listener task failed: {}", e);
    }
    manager.shutdown().await;
    listener.unsubscribe().await;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
