use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use mdns_sd::ServiceDaemon;
use anyhow::{Context, Result};
use lanpeerd::config::Config;
use lanpeerd::engine::{Engine, EngineHandle};
use lanpeerd::mdns::MdnsStack;
use lanpeerd::presenter::LogPresenter;
use lanpeerd::stack::DnsSdStack;

const DEFAULT_CONFIG_PATH: &str = "/etc/lanpeerd/lanpeerd.toml";
const RESOLVE_POLL_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lanpeerd=info"))
        )
        .init();

    tracing::info!("Starting lanpeerd");

    // Load config; an explicit path must load, the default path may be absent
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::load_or_default(DEFAULT_CONFIG_PATH)?,
    };

    tracing::info!(
        "Service type {} with {} advertised instances",
        config.service.service_type,
        config.advertise.instances
    );

    // Create mDNS daemon, optionally bound to one interface
    let mdns_daemon = ServiceDaemon::new().context("Failed to create mDNS daemon")?;
    if let Some(interface) = &config.service.interface {
        mdns_daemon
            .disable_interface(mdns_sd::IfKind::All)
            .context("Failed to disable default interfaces")?;
        mdns_daemon
            .enable_interface(interface.as_str())
            .with_context(|| format!("Failed to enable interface {}", interface))?;
    }

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn the engine over the mDNS stack
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let stack: Arc<dyn DnsSdStack> = Arc::new(
        MdnsStack::new(mdns_daemon.clone(), events_tx)
            .context("Failed to start mDNS stack")?,
    );
    let engine = Engine::new(stack, Arc::new(LogPresenter));
    let (handle, engine_task) = EngineHandle::spawn(engine, events_rx, cancel.clone());

    // Start the discovery session
    handle
        .start_discovery(config.service.service_type.clone())
        .await?;

    // Advertise the configured number of instances
    for _ in 0..config.advertise.instances {
        let candidate = handle
            .register_one(config.service.service_type.clone())
            .await?;
        tracing::debug!("Submitted advertisement {}", candidate.name);
    }

    // Spawn the peer resolver task
    let resolver_handle = handle.clone();
    let resolver_cancel = cancel.clone();
    let resolver_task = tokio::spawn(async move {
        if let Err(e) = resolve_new_peers(resolver_handle, resolver_cancel).await {
            tracing::error!("Peer resolver error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation; the engine stops discovery and unregisters
    // every advertisement on its way out
    cancel.cancel();
    let _ = tokio::join!(engine_task, resolver_task);

    // Shutdown mDNS daemon
    if let Err(e) = mdns_daemon.shutdown() {
        tracing::error!("Failed to shutdown mDNS daemon: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Request resolution once for each peer that shows up without an
/// endpoint, standing in for a user selecting the entry.
async fn resolve_new_peers(handle: EngineHandle, cancel: CancellationToken) -> Result<()> {
    let mut requested: HashSet<String> = HashSet::new();
    let mut poll = tokio::time::interval(Duration::from_secs(RESOLVE_POLL_SECS));

    loop {
        tokio::select! {
            _ = poll.tick() => {
                for peer in handle.snapshot().await? {
                    if peer.is_resolved() || !requested.insert(peer.name.clone()) {
                        continue;
                    }
                    handle.resolve(peer).await?;
                }
            }
            _ = cancel.cancelled() => {
                break;
            }
        }
    }

    Ok(())
}
