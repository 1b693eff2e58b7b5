use shared::types::ServiceDescriptor;
use crate::resolve::ResolveOutcome;

/// Consumer-facing surface of the engine. Implementations get whole
/// replacement snapshots plus one callback per resolution request; they
/// never see or touch live engine state.
pub trait Presenter: Send + Sync + 'static {
    /// Full, ordered peer set after a registry change
    fn services_updated(&self, snapshot: &[ServiceDescriptor]);

    /// Terminal outcome of one resolve request
    fn resolve_completed(&self, outcome: &ResolveOutcome);
}

/// Presenter used by the daemon: one JSON line per peer-set change and one
/// line per resolve outcome.
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn services_updated(&self, snapshot: &[ServiceDescriptor]) {
        match serde_json::to_string(snapshot) {
            Ok(json) => tracing::info!("Peers ({}): {}", snapshot.len(), json),
            Err(e) => tracing::error!("Failed to serialize peer snapshot: {}", e),
        }
    }

    fn resolve_completed(&self, outcome: &ResolveOutcome) {
        match outcome {
            ResolveOutcome::Resolved(descriptor) => {
                tracing::info!(
                    "Peer {} reachable at {:?} port {:?}",
                    descriptor.name,
                    descriptor.host,
                    descriptor.port
                );
            }
            ResolveOutcome::Failed { descriptor, code } => {
                tracing::warn!(
                    "Peer {} could not be resolved (code {})",
                    descriptor.name,
                    code
                );
            }
        }
    }
}
