use std::sync::Arc;

use anyhow::Context;
use tower_http::trace::TraceLayer;

use trainer_assist::channels::{
    MessagingChannel, Notifier, WebhookState, WhatsAppChannel, WhatsAppConfig, spawn_delivery,
    webhook_routes,
};
use trainer_assist::config::{EngineConfig, to_chrono};
use trainer_assist::dispatcher::Dispatcher;
use trainer_assist::invitations::InvitationLedger;
use trainer_assist::monitor::{TimeoutMonitor, spawn_sweep_ticker};
use trainer_assist::relationships::RelationshipGraph;
use trainer_assist::store::{Database, LibSqlBackend};
use trainer_assist::tasks::ActorLocks;

/// Bound on queued outbound notifications.
const NOTIFY_QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = EngineConfig::from_env().context("invalid engine configuration")?;
    let whatsapp = WhatsAppConfig::from_env().context(
        "WHATSAPP_TOKEN, WHATSAPP_PHONE_NUMBER_ID and WHATSAPP_VERIFY_TOKEN must be set",
    )?;

    let port: u16 = std::env::var("TRAINER_ASSIST_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .context("TRAINER_ASSIST_PORT must be a port number")?;

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = std::env::var("TRAINER_ASSIST_DB_PATH")
        .unwrap_or_else(|_| "./data/trainer-assist.db".to_string());
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .with_context(|| format!("failed to open database at {db_path}"))?,
    );

    // ── Engine ───────────────────────────────────────────────────────────
    let verify_token = whatsapp.verify_token.clone();
    let channel: Arc<dyn MessagingChannel> = Arc::new(WhatsAppChannel::new(whatsapp));
    let (notifier, notify_rx) = Notifier::channel(NOTIFY_QUEUE_CAPACITY);
    let _delivery_handle = spawn_delivery(notify_rx, Arc::clone(&channel));

    let locks = ActorLocks::new();
    let ledger = Arc::new(InvitationLedger::new(
        Arc::clone(&db),
        RelationshipGraph::new(Arc::clone(&db)),
        notifier.clone(),
        to_chrono(config.invitation_ttl),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&db),
        Arc::clone(&ledger),
        Arc::clone(&locks),
        Arc::clone(&channel),
        config.clone(),
    ));

    let sweep_interval = config.sweep_interval;
    let monitor = Arc::new(TimeoutMonitor::new(
        Arc::clone(&db),
        locks,
        ledger,
        notifier,
        config,
    ));
    let _sweep_handle = spawn_sweep_ticker(monitor, sweep_interval);

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = webhook_routes(WebhookState {
        dispatcher,
        db,
        verify_token,
    })
    .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    tracing::info!(port, db = %db_path, "Trainer Assist listening");
    axum::serve(listener, app).await?;
    Ok(())
}
