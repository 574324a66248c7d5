use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use welcome_gate::config::AppConfig;
use welcome_gate::ingest::{self, IngestState};
use welcome_gate::platform::{DiscordRest, Platform};
use welcome_gate::store::LibSqlPolicyStore;
use welcome_gate::verify::{AgentIdentity, Lifecycle, VerificationEngine};

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

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let (lifecycle_tx, lifecycle_rx) = watch::channel(Lifecycle::Starting);

    eprintln!("🚪 Welcome Gate v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Discord API: {}", config.api_base);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Ingest: http://0.0.0.0:{}/events", config.port);

    // ── Policy store ─────────────────────────────────────────────────────
    let store = Arc::new(
        LibSqlPolicyStore::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    // ── Platform ─────────────────────────────────────────────────────────
    let platform = Arc::new(
        DiscordRest::with_base_url(config.bot_token.clone(), config.api_base.clone())
            .with_history_page_limit(config.history_page_limit),
    );
    let me = platform
        .current_user()
        .await
        .context("Failed to resolve the bot account")?;
    let agent = AgentIdentity::new(me.id, me.username);
    info!(agent_id = %agent.id, agent_tag = %agent.tag, "Logged in");

    // ── Engine + ingest ──────────────────────────────────────────────────
    let engine = Arc::new(VerificationEngine::new(
        platform,
        store,
        agent,
        config.engine.clone(),
    ));
    let app = ingest::router(IngestState {
        engine,
        lifecycle: lifecycle_rx,
        token: config.ingest_token.clone(),
    });

    lifecycle_tx.send_replace(Lifecycle::Ready);
    info!("Ready");

    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        lifecycle_tx.send_replace(Lifecycle::ShuttingDown);
        info!("Shutting down");
    };

    ingest::serve(config.port, app, shutdown).await?;
    Ok(())
}
