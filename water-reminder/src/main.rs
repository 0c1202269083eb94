use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use water_reminder::config::ReminderConfig;
use water_reminder::domain::{Clock, SystemClock};
use water_reminder::logging::init_logging;
use water_reminder::message::{GroqClient, MessageGenerator};
use water_reminder::notification::{Dispatcher, WebPushConfig, WebPushTransport};
use water_reminder::registration::RegistrationService;
use water_reminder::registry::SubscriptionRegistry;
use water_reminder::scheduler::{Scheduler, ThreadRandom};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let log_dir = std::env::var("LOG_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);
    let logging = init_logging(log_dir.as_deref())?;

    let cancel = CancellationToken::new();
    logging.start_retention_cleanup(cancel.child_token());

    let config = ReminderConfig::from_env()?;

    let generator = match GroqClient::from_env()? {
        Some(client) => {
            info!(model = %client.model(), "Generative reminder text enabled");
            let timeout = client.timeout();
            MessageGenerator::with_completion(Arc::new(client), timeout)
        }
        None => {
            warn!("GROQ_API_KEY not set; using built-in reminder messages only");
            MessageGenerator::fallback_only()
        }
    };

    let push_config = WebPushConfig::from_env_or_generate()?;
    let transport = Arc::new(WebPushTransport::new(push_config)?);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(SubscriptionRegistry::new());
    let dispatcher = Arc::new(
        Dispatcher::new(registry.clone(), transport.clone(), generator, clock.clone())
            .with_assets(config.icon.clone(), config.badge.clone()),
    );
    let registration = RegistrationService::new(registry.clone(), dispatcher.clone(), clock.clone());
    let scheduler = Scheduler::new(
        &config,
        registry,
        dispatcher,
        clock,
        Arc::new(ThreadRandom),
    );

    let status = registration.status();
    info!(
        vapid_public_key = %transport.vapid_public_key(),
        target_hours = ?config.target_hours,
        window_minutes = config.half_window_minutes,
        subscriptions = status.total_subscriptions,
        server_time = %status.server_time,
        "water-reminder started"
    );

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    scheduler.run(cancel).await;

    info!("water-reminder stopped");
    Ok(())
}
