use std::sync::Arc;
use shared::types::ServiceDescriptor;
use crate::stack::DnsSdStack;

/// Terminal result of one resolution request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Connection details filled in
    Resolved(ServiceDescriptor),
    /// The request failed; the descriptor is the one originally submitted
    Failed { descriptor: ServiceDescriptor, code: i32 },
}

impl ResolveOutcome {
    /// The descriptor the outcome is about, resolved or not
    pub fn descriptor(&self) -> &ServiceDescriptor {
        match self {
            ResolveOutcome::Resolved(descriptor) => descriptor,
            ResolveOutcome::Failed { descriptor, .. } => descriptor,
        }
    }
}

/// Issues per-request resolutions. Requests are independent even when they
/// target the same descriptor, and their outcomes never touch the registry.
/// Nothing bounds how long a request may stay in flight.
pub struct ResolutionClient {
    stack: Arc<dyn DnsSdStack>,
    next_request: u64,
    in_flight: usize,
}

impl ResolutionClient {
    pub fn new(stack: Arc<dyn DnsSdStack>) -> Self {
        Self {
            stack,
            next_request: 0,
            in_flight: 0,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Submit one resolution; the outcome arrives later under the returned
    /// request id.
    pub fn resolve(&mut self, descriptor: &ServiceDescriptor) -> u64 {
        let request = self.next_request;
        self.next_request += 1;
        self.in_flight += 1;

        tracing::info!(
            "Resolving {} (request {}, {} in flight)",
            descriptor.name,
            request,
            self.in_flight
        );
        self.stack.resolve(request, descriptor);

        request
    }

    pub fn on_resolved(&mut self, request: u64, descriptor: ServiceDescriptor) -> ResolveOutcome {
        self.in_flight = self.in_flight.saturating_sub(1);
        tracing::info!(
            "Resolved {} to {:?} port {:?} (request {})",
            descriptor.name,
            descriptor.host,
            descriptor.port,
            request
        );
        ResolveOutcome::Resolved(descriptor)
    }

    pub fn on_failed(&mut self, request: u64, descriptor: ServiceDescriptor, code: i32) -> ResolveOutcome {
        self.in_flight = self.in_flight.saturating_sub(1);
        tracing::error!(
            "Resolve failed for {} (request {}, code {})",
            descriptor.name,
            request,
            code
        );
        ResolveOutcome::Failed { descriptor, code }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use crate::testutil::{found, FakeStack, StackCall};

    fn client() -> (ResolutionClient, Arc<FakeStack>) {
        let stack = Arc::new(FakeStack::new());
        (ResolutionClient::new(stack.clone()), stack)
    }

    #[test]
    fn test_requests_get_distinct_ids() {
        let (mut resolver, stack) = client();
        let descriptor = found("peer-1");

        let first = resolver.resolve(&descriptor);
        let second = resolver.resolve(&descriptor);

        assert_ne!(first, second);
        assert_eq!(resolver.in_flight(), 2);
        assert_eq!(
            stack.calls(),
            vec![
                StackCall::Resolve(first, "peer-1".to_string()),
                StackCall::Resolve(second, "peer-1".to_string()),
            ]
        );
    }

    #[test]
    fn test_success_outcome_carries_endpoint() {
        let (mut resolver, _stack) = client();
        let descriptor = found("peer-1");

        let request = resolver.resolve(&descriptor);
        let filled =
            descriptor.with_endpoint(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 9)), 8080);
        let outcome = resolver.on_resolved(request, filled.clone());

        assert_eq!(outcome, ResolveOutcome::Resolved(filled));
        assert!(outcome.descriptor().is_resolved());
        assert_eq!(resolver.in_flight(), 0);
    }

    #[test]
    fn test_failure_outcome_keeps_original_descriptor() {
        let (mut resolver, _stack) = client();
        let descriptor = found("peer-1");

        let request = resolver.resolve(&descriptor);
        let outcome = resolver.on_failed(request, descriptor.clone(), 7);

        match outcome {
            ResolveOutcome::Failed { descriptor: original, code } => {
                assert_eq!(original, descriptor);
                assert_eq!(code, 7);
                assert!(!original.is_resolved());
            }
            other => panic!("expected failure outcome, got {:?}", other),
        }
        assert_eq!(resolver.in_flight(), 0);
    }
}
