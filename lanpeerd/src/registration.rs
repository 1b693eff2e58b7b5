use std::sync::Arc;
use rand::Rng;
use shared::protocol::CANDIDATE_RANGE;
use shared::types::{DescriptorError, ServiceDescriptor};
use crate::stack::DnsSdStack;

/// Advertisement lifecycle of one locally generated instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Submitted, no announcement yet
    Pending,
    /// The stack announced the instance
    Registered,
    /// The stack rejected the instance; kept for teardown, never retried
    Failed(i32),
}

/// A locally advertised instance paired with what teardown needs
#[derive(Debug, Clone)]
pub struct RegistrationRecord {
    pub descriptor: ServiceDescriptor,
    pub state: RegistrationState,
    unregister_requested: bool,
}

/// Owns every self-advertisement. Instances are independent: one failing
/// never touches its siblings. Lives on the engine task.
pub struct RegistrationController {
    stack: Arc<dyn DnsSdStack>,
    records: Vec<RegistrationRecord>,
}

impl RegistrationController {
    pub fn new(stack: Arc<dyn DnsSdStack>) -> Self {
        Self {
            stack,
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[RegistrationRecord] {
        &self.records
    }

    /// Generate a fresh candidate and submit it. The returned descriptor is
    /// the caller's handle for a later unregister_one. Name collisions are
    /// not pre-checked; the stack's failure callback is the collision
    /// signal.
    pub fn register_one(&mut self, service_type: &str) -> Result<ServiceDescriptor, DescriptorError> {
        let descriptor = generate_candidate(service_type)?;
        tracing::info!(
            "Advertising {} on port {}",
            descriptor.name,
            descriptor.port.unwrap_or(0)
        );

        self.records.push(RegistrationRecord {
            descriptor: descriptor.clone(),
            state: RegistrationState::Pending,
            unregister_requested: false,
        });
        self.stack.register(&descriptor);

        Ok(descriptor)
    }

    /// First call per record submits unregistration; repeats and unknown
    /// names are no-ops.
    pub fn unregister_one(&mut self, name: &str) {
        match self.records.iter_mut().find(|r| r.descriptor.name == name) {
            Some(record) => {
                submit_unregister(self.stack.as_ref(), record);
            }
            None => {
                tracing::debug!("No registration named {}, unregister is a no-op", name);
            }
        }
    }

    /// Teardown: one unregistration per record that has not had one yet,
    /// whatever state the record is in.
    pub fn unregister_all(&mut self) {
        for record in &mut self.records {
            submit_unregister(self.stack.as_ref(), record);
        }
    }

    pub fn on_registered(&mut self, name: &str) {
        match self.records.iter_mut().find(|r| r.descriptor.name == name) {
            Some(record) if record.state == RegistrationState::Pending => {
                record.state = RegistrationState::Registered;
                tracing::info!("Registered {}", name);
            }
            Some(_) => {
                tracing::debug!("Repeat announcement for {}", name);
            }
            None => {
                tracing::debug!("Announcement for unknown instance {}", name);
            }
        }
    }

    pub fn on_registration_failed(&mut self, descriptor: &ServiceDescriptor, code: i32) {
        tracing::error!(
            "Registration failed for {} (code {})",
            descriptor.name,
            code
        );
        if let Some(record) = self
            .records
            .iter_mut()
            .find(|r| r.descriptor.name == descriptor.name)
        {
            record.state = RegistrationState::Failed(code);
        }
    }

    /// The record's job is done once the stack confirms withdrawal
    pub fn on_unregistered(&mut self, name: &str) {
        let before = self.records.len();
        self.records.retain(|r| r.descriptor.name != name);
        if self.records.len() != before {
            tracing::info!("Unregistered {}", name);
        } else {
            tracing::debug!("Unregistration confirmed for unknown instance {}", name);
        }
    }

    pub fn on_unregistration_failed(&self, name: &str, code: i32) {
        tracing::error!("Unregistration failed for {} (code {})", name, code);
    }
}

fn submit_unregister(stack: &dyn DnsSdStack, record: &mut RegistrationRecord) {
    if record.unregister_requested {
        tracing::debug!(
            "Unregistration already requested for {}",
            record.descriptor.name
        );
        return;
    }
    record.unregister_requested = true;
    tracing::info!("Unregistering {}", record.descriptor.name);
    stack.unregister(&record.descriptor);
}

/// Random name and port inside the protocol's constraints
fn generate_candidate(service_type: &str) -> Result<ServiceDescriptor, DescriptorError> {
    let mut rng = rand::thread_rng();
    let token: u16 = rng.gen_range(CANDIDATE_RANGE);
    let port: u16 = rng.gen_range(CANDIDATE_RANGE);
    ServiceDescriptor::advertised(format!("peer-{}", token), service_type, port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::MAX_INSTANCE_NAME_LEN;
    use crate::testutil::{FakeStack, StackCall};

    fn controller() -> (RegistrationController, Arc<FakeStack>) {
        let stack = Arc::new(FakeStack::new());
        (RegistrationController::new(stack.clone()), stack)
    }

    #[test]
    fn test_candidates_stay_within_constraints() {
        let (mut registrations, stack) = controller();

        for _ in 0..100 {
            let descriptor = registrations.register_one("_http._tcp.").unwrap();
            assert!(!descriptor.name.is_empty());
            assert!(descriptor.name.len() <= MAX_INSTANCE_NAME_LEN);
            assert!(descriptor.name.starts_with("peer-"));
            let port = descriptor.port.unwrap();
            assert!((10_000..60_000).contains(&port));
        }

        assert_eq!(stack.count(|c| matches!(c, StackCall::Register(_))), 100);
    }

    #[test]
    fn test_invalid_type_never_reaches_stack() {
        let (mut registrations, stack) = controller();

        let err = registrations.register_one("http").unwrap_err();

        assert_eq!(err, DescriptorError::ServiceType("http".to_string()));
        assert!(stack.calls().is_empty());
        assert!(registrations.records().is_empty());
    }

    #[test]
    fn test_one_failure_leaves_siblings_alone() {
        let (mut registrations, _stack) = controller();

        let mut names = Vec::new();
        for _ in 0..10 {
            names.push(registrations.register_one("_http._tcp.").unwrap().name);
        }

        let failed = registrations.records()[3].descriptor.clone();
        registrations.on_registration_failed(&failed, 3);
        for name in &names {
            if *name != failed.name {
                registrations.on_registered(name);
            }
        }

        let records = registrations.records();
        assert_eq!(records.len(), 10);
        assert_eq!(
            records
                .iter()
                .filter(|r| r.state == RegistrationState::Registered)
                .count(),
            9
        );
        assert_eq!(
            records
                .iter()
                .filter(|r| r.state == RegistrationState::Failed(3))
                .count(),
            1
        );
    }

    #[test]
    fn test_unregister_one_is_idempotent() {
        let (mut registrations, stack) = controller();
        let name = registrations.register_one("_http._tcp.").unwrap().name;

        registrations.unregister_one(&name);
        registrations.unregister_one(&name);

        assert_eq!(stack.count(|c| matches!(c, StackCall::Unregister(_))), 1);
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let (mut registrations, stack) = controller();
        registrations.register_one("_http._tcp.").unwrap();

        registrations.unregister_one("peer-unknown");

        assert_eq!(stack.count(|c| matches!(c, StackCall::Unregister(_))), 0);
    }

    #[test]
    fn test_unregister_all_covers_every_record_once() {
        let (mut registrations, stack) = controller();

        let mut names = Vec::new();
        for _ in 0..4 {
            names.push(registrations.register_one("_http._tcp.").unwrap().name);
        }

        // One record failed and one was already unregistered by hand; both
        // still get exactly one submission in total.
        let failed = registrations.records()[1].descriptor.clone();
        registrations.on_registration_failed(&failed, 3);
        registrations.unregister_one(&names[0]);

        registrations.unregister_all();
        registrations.unregister_all();

        assert_eq!(stack.count(|c| matches!(c, StackCall::Unregister(_))), 4);
    }

    #[test]
    fn test_unregistered_destroys_record() {
        let (mut registrations, _stack) = controller();
        let name = registrations.register_one("_http._tcp.").unwrap().name;

        registrations.on_registered(&name);
        registrations.unregister_one(&name);
        registrations.on_unregistered(&name);

        assert!(registrations.records().is_empty());
    }
}
