//! `quay serve`: wire the session provider and run until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use quay_config::QuayConfig;
use quay_session::{
    ListenerRegistry, MemoryStore, SessionProvider, StatsRegistry, TokioScheduler,
};
use tracing::{info, warn};

use super::{Context, init_logging};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Seconds between statistics log lines (0 disables them)
    #[arg(long, default_value_t = 60)]
    pub stats_interval: u64,
}

/// Components owned by the host process.
pub struct Host {
    pub provider: Arc<SessionProvider>,
    pub events: Arc<ListenerRegistry>,
    pub stats: Option<Arc<StatsRegistry>>,
}

/// Build the provider and its collaborators from configuration.
pub fn build(config: &QuayConfig) -> Host {
    let mut store = MemoryStore::new().with_max_entries(config.store.max_entries);
    if config.session.transactional {
        store = store.with_transactions();
    }

    let events = Arc::new(ListenerRegistry::new());
    let mut provider = SessionProvider::new(Arc::new(store), &config.session_settings())
        .with_event_bus(events.clone())
        .with_scheduler(Arc::new(TokioScheduler::new()));

    let stats = config.monitoring.enabled.then(|| Arc::new(StatsRegistry::new()));
    if let Some(stats) = &stats {
        provider = provider.with_monitoring(stats.clone(), config.monitoring.name.clone());
    }

    Host {
        provider: Arc::new(provider),
        events,
        stats,
    }
}

pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    init_logging(&config.logging, ctx.verbose);

    let host = build(&config);
    host.provider
        .start()
        .context("failed to start session provider")?;

    let mut ticker = (args.stats_interval > 0)
        .then(|| tokio::time::interval(Duration::from_secs(args.stats_interval)));

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for shutdown signal")?;
                info!("Shutdown requested");
                break;
            }
            _ = async {
                match ticker.as_mut() {
                    Some(t) => { t.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                log_stats(&host);
            }
        }
    }

    if let Err(e) = host.provider.stop().await {
        warn!(error = %e, "Session provider did not stop cleanly");
    }
    log_stats(&host);
    Ok(())
}

fn log_stats(host: &Host) {
    match &host.stats {
        Some(registry) => {
            for (name, stats) in registry.snapshot() {
                let json = serde_json::to_string(&stats).unwrap_or_default();
                info!(name = %name, stats = %json, "Session statistics");
            }
        }
        None => {
            let stats = host.provider.statistics();
            info!(
                current = stats.current_entries,
                hits = stats.hits,
                misses = stats.misses,
                "Session statistics"
            );
        }
    }
}
