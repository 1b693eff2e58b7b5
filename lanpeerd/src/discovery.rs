use std::sync::Arc;
use shared::types::ServiceDescriptor;
use crate::registry::ServiceRegistry;
use crate::stack::DnsSdStack;

/// Lifecycle of the single browse session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// start() has not been called
    Idle,
    /// Browse submitted; found/lost events are live
    Active,
    /// The stack reported a start failure; terminal, never retried
    Failed,
    /// Stop submitted, or the stack ended the session
    Stopped,
}

/// Owns the one discovery session and applies its found/lost stream to the
/// registry. Lives on the engine task.
pub struct DiscoveryController {
    stack: Arc<dyn DnsSdStack>,
    state: SessionState,
    service_type: Option<String>,
}

impl DiscoveryController {
    pub fn new(stack: Arc<dyn DnsSdStack>) -> Self {
        Self {
            stack,
            state: SessionState::Idle,
            service_type: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Submit the browse. At most one session per controller; repeated
    /// calls are logged and ignored.
    pub fn start(&mut self, service_type: &str) {
        if self.state != SessionState::Idle {
            tracing::warn!(
                "Discovery already started for {:?}, ignoring start for {}",
                self.service_type,
                service_type
            );
            return;
        }

        tracing::info!("Starting discovery for {}", service_type);
        self.service_type = Some(service_type.to_string());
        self.state = SessionState::Active;
        self.stack.start_browse(service_type);
    }

    /// Submit stop at most once. Safe in any state, any number of calls;
    /// a session that never became active has nothing to stop.
    pub fn stop(&mut self) {
        match self.state {
            SessionState::Active => {
                if let Some(ty) = self.service_type.clone() {
                    tracing::info!("Stopping discovery for {}", ty);
                    self.stack.stop_browse(&ty);
                }
                self.state = SessionState::Stopped;
            }
            _ => {
                tracing::debug!("Discovery not active, stop is a no-op");
            }
        }
    }

    pub fn on_started(&self, service_type: &str) {
        tracing::debug!("Discovery started for {}", service_type);
    }

    /// Terminal: the session never becomes active again and is not retried
    pub fn on_start_failed(&mut self, service_type: &str, code: i32) {
        tracing::error!("Discovery start failed for {} (code {})", service_type, code);
        if self.state == SessionState::Active {
            self.state = SessionState::Failed;
        }
    }

    pub fn on_stopped(&mut self, service_type: &str) {
        tracing::debug!("Discovery stopped for {}", service_type);
        if self.state == SessionState::Active {
            self.state = SessionState::Stopped;
        }
    }

    pub fn on_stop_failed(&self, service_type: &str, code: i32) {
        tracing::error!("Discovery stop failed for {} (code {})", service_type, code);
    }

    /// Apply a found event. Returns true when the registry changed and a
    /// new snapshot should go out.
    pub fn apply_found(&self, registry: &mut ServiceRegistry, descriptor: ServiceDescriptor) -> bool {
        if registry.contains(&descriptor.name) {
            // A name we already track keeps its entry and its place.
            tracing::debug!("Service found again, already tracked: {}", descriptor.name);
            return false;
        }

        tracing::info!("Service found: {} ({})", descriptor.name, descriptor.service_type);
        registry.upsert(descriptor);
        true
    }

    /// Apply a lost event. Unknown names leave the registry untouched.
    pub fn apply_lost(&self, registry: &mut ServiceRegistry, name: &str) -> bool {
        if registry.remove(name) {
            tracing::info!("Service lost: {}", name);
            true
        } else {
            tracing::debug!("Lost event for unknown service {}, ignoring", name);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{found, FakeStack, StackCall};

    fn controller() -> (DiscoveryController, Arc<FakeStack>) {
        let stack = Arc::new(FakeStack::new());
        (DiscoveryController::new(stack.clone()), stack)
    }

    #[test]
    fn test_start_submits_once() {
        let (mut discovery, stack) = controller();

        discovery.start("_http._tcp.");
        discovery.start("_http._tcp.");

        assert_eq!(discovery.state(), SessionState::Active);
        assert_eq!(
            stack.count(|c| matches!(c, StackCall::StartBrowse(_))),
            1
        );
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut discovery, stack) = controller();

        discovery.start("_http._tcp.");
        discovery.stop();
        discovery.stop();
        discovery.stop();

        assert_eq!(discovery.state(), SessionState::Stopped);
        assert_eq!(stack.count(|c| matches!(c, StackCall::StopBrowse(_))), 1);
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let (mut discovery, stack) = controller();

        discovery.stop();

        assert_eq!(discovery.state(), SessionState::Idle);
        assert!(stack.calls().is_empty());
    }

    #[test]
    fn test_start_failure_is_terminal() {
        let (mut discovery, stack) = controller();

        discovery.start("_http._tcp.");
        discovery.on_start_failed("_http._tcp.", 3);

        assert_eq!(discovery.state(), SessionState::Failed);

        // Not retried, and a later start is still refused.
        discovery.start("_http._tcp.");
        assert_eq!(
            stack.count(|c| matches!(c, StackCall::StartBrowse(_))),
            1
        );

        // Nothing active to stop.
        discovery.stop();
        assert_eq!(stack.count(|c| matches!(c, StackCall::StopBrowse(_))), 0);
    }

    #[test]
    fn test_found_for_known_name_keeps_entry() {
        let (discovery, _stack) = controller();
        let mut registry = ServiceRegistry::new();

        assert!(discovery.apply_found(&mut registry, found("peer-1")));

        let mut refound = found("peer-1");
        refound.port = Some(9000);
        assert!(!discovery.apply_found(&mut registry, refound));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        // The original entry survives untouched.
        assert_eq!(snapshot[0].port, None);
    }

    #[test]
    fn test_lost_unknown_name_is_noop() {
        let (discovery, _stack) = controller();
        let mut registry = ServiceRegistry::new();

        discovery.apply_found(&mut registry, found("peer-1"));
        assert!(!discovery.apply_lost(&mut registry, "peer-2"));
        assert_eq!(registry.len(), 1);

        assert!(discovery.apply_lost(&mut registry, "peer-1"));
        assert!(registry.is_empty());
    }
}
