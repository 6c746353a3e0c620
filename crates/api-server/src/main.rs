//! System X binary entrypoint: wires configuration, the scheduler, and the
//! monitoring surface together.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use api_server::{ApiServer, AppState, ServerConfig};
use scheduler::paper::{
    PaperBroker, PaperPersistence, StaticBacktester, StaticCandidates, ThresholdStrategy,
};
use scheduler::{Collaborators, Scheduler};
use systemx_core::config::SystemConfig;
use systemx_core::{
    CooldownNotifier, LogNotifier, MarketCalendar, NotificationAdapter, WebhookNotifier,
};

#[derive(Parser)]
#[command(name = "systemx", about = "Autonomous trading and backtesting control core")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config/systemx.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "systemx=info,api_server=info,scheduler=info,systemx_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Configuration problems are fatal: the core must not trade on defaults
    // it was never given.
    let config = Arc::new(SystemConfig::load(&args.config)?);
    info!(
        accounts = config.accounts.len(),
        host = %config.monitoring.host,
        port = config.monitoring.port,
        "Configuration loaded"
    );

    let notifier_inner: Arc<dyn NotificationAdapter> = match &config.monitoring.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };
    let notifier = Arc::new(CooldownNotifier::new(
        notifier_inner,
        Duration::from_secs(config.monitoring.notification_cooldown_secs),
    ));

    // Paper collaborators until a live brokerage integration is wired in.
    let collab = Collaborators {
        broker: Arc::new(PaperBroker::new()),
        candidates: Arc::new(StaticCandidates::new(Vec::new())),
        persistence: Arc::new(PaperPersistence::default()),
        strategy: Arc::new(ThresholdStrategy::new(config.trading.clone())),
        backtester: Arc::new(StaticBacktester::new(Vec::new())),
        notifier,
    };

    let oracle = Arc::new(MarketCalendar::new());
    let (sched, handle) = Scheduler::new(config.clone(), oracle, collab);
    let scheduler_task = tokio::spawn(sched.run());

    let state = AppState::new(config.clone(), handle.snapshot.clone(), handle.stop.clone());
    let server = ApiServer::new(ServerConfig::from_monitoring(&config.monitoring), state);
    let server_task = tokio::spawn(async move {
        if let Err(err) = server.run().await {
            error!(error = %err, "Monitoring surface exited");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received; draining scheduler");
    handle.shutdown();
    let _ = scheduler_task.await;
    server_task.abort();
    info!("Shutdown complete");
    Ok(())
}
