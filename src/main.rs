use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use anon_relay::channels::{ChannelClient, ConsoleClient, TelegramClient};
use anon_relay::config::{ChannelConfig, RelayConfig};
use anon_relay::identity::IdentityStore;
use anon_relay::pipeline::{FreshnessFilter, MessageHandler};
use anon_relay::relay::{
    RelayConsumer, RelayProducer, ReplyCommand, ReplyDispatcher, RestartBackoff,
    spawn_consumer_supervisor,
};
use anon_relay::store::{Database, LibSqlBackend};
use anon_relay::suppression::{self, SuppressionTracker};

const FLAG_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);
const CONSUMER_BACKOFF_START: Duration = Duration::from_secs(1);
const CONSUMER_BACKOFF_MAX: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env().context("invalid configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(&config);

    // Captured before anything connects so backlog is judged against it
    let freshness = FreshnessFilter::at_startup().with_grace(config.startup_grace);

    eprintln!("🔒 Anon Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Channel: {}", config.channel.name());
    eprintln!(
        "   Streams: in={} out={} group={} consumer={}",
        config.streams.inbound,
        config.streams.outbound,
        config.streams.group,
        config.streams.consumer
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    let identities =
        IdentityStore::new(Arc::clone(&db)).with_max_attempts(config.mint_max_attempts);
    let suppression_tracker = SuppressionTracker::new(Arc::clone(&db));
    let producer = RelayProducer::new(Arc::clone(&db), config.streams.outbound.clone());

    let _sweeper = suppression::spawn_flag_sweeper(Arc::clone(&db), FLAG_SWEEP_INTERVAL);

    // ── Channel ─────────────────────────────────────────────────────────
    let client: Arc<dyn ChannelClient> = match &config.channel {
        ChannelConfig::Telegram { bot_token } => Arc::new(TelegramClient::new(bot_token.clone())),
        ChannelConfig::Console => {
            eprintln!("   Type a message and press Enter. Ctrl-D to exit.\n");
            Arc::new(ConsoleClient::new())
        }
    };

    // ── Operator replies ────────────────────────────────────────────────
    let consumer = Arc::new(RelayConsumer::new(Arc::clone(&db), &config.streams));
    let (reply_tx, reply_rx) = tokio::sync::mpsc::unbounded_channel::<ReplyCommand>();
    let dispatcher = ReplyDispatcher::new(
        identities.clone(),
        suppression_tracker.clone(),
        Arc::clone(&client),
        consumer.acknowledger(),
    );
    tokio::spawn(dispatcher.run(reply_rx));
    spawn_consumer_supervisor(
        consumer,
        reply_tx,
        RestartBackoff::new(CONSUMER_BACKOFF_START, CONSUMER_BACKOFF_MAX),
    );

    // ── Inbound messages ────────────────────────────────────────────────
    let handler = Arc::new(MessageHandler::new(
        Arc::clone(&client),
        identities,
        suppression_tracker,
        producer,
        freshness,
        config.phrases.clone(),
    ));

    let mut events = client
        .start()
        .await
        .with_context(|| format!("failed to start {} channel", client.name()))?;

    tracing::info!(channel = client.name(), "Relay running");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else {
                    tracing::info!("Channel event stream ended");
                    break;
                };
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { handler.handle(event).await });
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    client.disconnect().await;
    Ok(())
}

/// Console output always; a daily rolling file too when a log dir is set.
fn init_tracing(config: &RelayConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter());

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "anon-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(stderr_layer).init();
            None
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
