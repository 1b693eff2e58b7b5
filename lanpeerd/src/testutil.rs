use std::sync::Mutex;
use shared::protocol::PEER_SERVICE_TYPE;
use shared::types::ServiceDescriptor;
use crate::presenter::Presenter;
use crate::resolve::ResolveOutcome;
use crate::stack::DnsSdStack;

/// One submitted stack operation, as recorded by FakeStack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackCall {
    StartBrowse(String),
    StopBrowse(String),
    Register(ServiceDescriptor),
    Unregister(String),
    Resolve(u64, String),
}

/// Records submissions without touching any network. Tests drive outcomes
/// by feeding StackEvents to the engine themselves.
#[derive(Default)]
pub struct FakeStack {
    calls: Mutex<Vec<StackCall>>,
}

impl FakeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<StackCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&StackCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: StackCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DnsSdStack for FakeStack {
    fn start_browse(&self, service_type: &str) {
        self.record(StackCall::StartBrowse(service_type.to_string()));
    }

    fn stop_browse(&self, service_type: &str) {
        self.record(StackCall::StopBrowse(service_type.to_string()));
    }

    fn register(&self, descriptor: &ServiceDescriptor) {
        self.record(StackCall::Register(descriptor.clone()));
    }

    fn unregister(&self, descriptor: &ServiceDescriptor) {
        self.record(StackCall::Unregister(descriptor.name.clone()));
    }

    fn resolve(&self, request: u64, descriptor: &ServiceDescriptor) {
        self.record(StackCall::Resolve(request, descriptor.name.clone()));
    }
}

/// Captures everything the engine publishes
#[derive(Default)]
pub struct RecordingPresenter {
    snapshots: Mutex<Vec<Vec<ServiceDescriptor>>>,
    outcomes: Mutex<Vec<ResolveOutcome>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<Vec<ServiceDescriptor>> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn last_snapshot(&self) -> Option<Vec<ServiceDescriptor>> {
        self.snapshots.lock().unwrap().last().cloned()
    }

    pub fn outcomes(&self) -> Vec<ResolveOutcome> {
        self.outcomes.lock().unwrap().clone()
    }
}

impl Presenter for RecordingPresenter {
    fn services_updated(&self, snapshot: &[ServiceDescriptor]) {
        self.snapshots.lock().unwrap().push(snapshot.to_vec());
    }

    fn resolve_completed(&self, outcome: &ResolveOutcome) {
        self.outcomes.lock().unwrap().push(outcome.clone());
    }
}

/// Descriptor as the stack would report it from a found event
pub fn found(name: &str) -> ServiceDescriptor {
    ServiceDescriptor::discovered(name, PEER_SERVICE_TYPE)
}
