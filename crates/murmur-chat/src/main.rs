//! Murmur chat binary
//!
//! Reads configuration from the environment, brings up the channels for the
//! configured role, and chats over standard input until `exit`.

use std::sync::Arc;

use murmur_cache::{ChannelResolver, JsonFileCache};
use murmur_chat::{ChatConfig, Console, Session};
use murmur_signal::{Consensus, LocalMiner, UdpSignal};
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "murmur_chat=info,murmur_cache=info,murmur_signal=warn";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they never land on the prompt line
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ChatConfig::from_env()?;
    tracing::info!("Starting murmur ({:?})", config.role);
    tracing::info!("  Channel: {} (depth {})", config.channel_id, config.proximity_depth);
    tracing::info!("  Signal: {} -> {}", config.bind, config.endpoint);
    tracing::info!("  Cache: {:?}", config.cache_path);

    let consensus = Consensus::messages(config.channel_id.clone());
    let signal = UdpSignal::bind(config.signal_config(), consensus).await?;
    let resolver = ChannelResolver::new(JsonFileCache::new(&config.cache_path), LocalMiner::new());
    let console = Arc::new(Console::stdout());

    let session = Session::establish(config.plan(), &resolver, signal, console).await?;

    let stdin = BufReader::new(tokio::io::stdin());
    let outcome = session.run(stdin, shutdown_signal()).await;
    tracing::debug!("Exiting after {:?}", outcome);

    // A pending stdin read would otherwise hold the runtime open.
    std::process::exit(0);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
