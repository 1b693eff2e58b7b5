use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use shared::types::{DescriptorError, ServiceDescriptor};
use crate::discovery::DiscoveryController;
use crate::presenter::Presenter;
use crate::registration::RegistrationController;
use crate::registry::ServiceRegistry;
use crate::resolve::ResolutionClient;
use crate::stack::{DnsSdStack, StackEvent};

/// Commands sent to the engine task
pub enum Command {
    StartDiscovery(String),
    StopDiscovery,
    RegisterOne(String, oneshot::Sender<Result<ServiceDescriptor, DescriptorError>>),
    UnregisterOne(String),
    Resolve(ServiceDescriptor),
    Snapshot(oneshot::Sender<Vec<ServiceDescriptor>>),
}

/// The coordinating context. Exactly one task owns an Engine; commands and
/// stack events are applied to it in arrival order, so none of the state
/// below needs locking.
pub struct Engine {
    registry: ServiceRegistry,
    discovery: DiscoveryController,
    registrations: RegistrationController,
    resolver: ResolutionClient,
    presenter: Arc<dyn Presenter>,
}

impl Engine {
    pub fn new(stack: Arc<dyn DnsSdStack>, presenter: Arc<dyn Presenter>) -> Self {
        Self {
            registry: ServiceRegistry::new(),
            discovery: DiscoveryController::new(stack.clone()),
            registrations: RegistrationController::new(stack.clone()),
            resolver: ResolutionClient::new(stack),
            presenter,
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartDiscovery(service_type) => {
                self.discovery.start(&service_type);
            }
            Command::StopDiscovery => {
                self.discovery.stop();
            }
            Command::RegisterOne(service_type, reply) => {
                let _ = reply.send(self.registrations.register_one(&service_type));
            }
            Command::UnregisterOne(name) => {
                self.registrations.unregister_one(&name);
            }
            Command::Resolve(descriptor) => {
                self.resolver.resolve(&descriptor);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.registry.snapshot());
            }
        }
    }

    pub fn handle_event(&mut self, event: StackEvent) {
        match event {
            StackEvent::DiscoveryStarted { service_type } => {
                self.discovery.on_started(&service_type);
            }
            StackEvent::DiscoveryStartFailed { service_type, code } => {
                self.discovery.on_start_failed(&service_type, code);
            }
            StackEvent::ServiceFound(descriptor) => {
                if self.discovery.apply_found(&mut self.registry, descriptor) {
                    self.publish();
                }
            }
            StackEvent::ServiceLost { name } => {
                if self.discovery.apply_lost(&mut self.registry, &name) {
                    self.publish();
                }
            }
            StackEvent::DiscoveryStopped { service_type } => {
                self.discovery.on_stopped(&service_type);
            }
            StackEvent::DiscoveryStopFailed { service_type, code } => {
                self.discovery.on_stop_failed(&service_type, code);
            }
            StackEvent::ServiceRegistered { name } => {
                self.registrations.on_registered(&name);
            }
            StackEvent::ServiceRegistrationFailed { descriptor, code } => {
                self.registrations.on_registration_failed(&descriptor, code);
            }
            StackEvent::ServiceUnregistered { name } => {
                self.registrations.on_unregistered(&name);
            }
            StackEvent::ServiceUnregistrationFailed { name, code } => {
                self.registrations.on_unregistration_failed(&name, code);
            }
            StackEvent::ServiceResolved { request, descriptor } => {
                let outcome = self.resolver.on_resolved(request, descriptor);
                self.presenter.resolve_completed(&outcome);
            }
            StackEvent::ResolveFailed { request, descriptor, code } => {
                let outcome = self.resolver.on_failed(request, descriptor, code);
                self.presenter.resolve_completed(&outcome);
            }
        }
    }

    /// Teardown: stop the browse once and withdraw every advertisement
    /// once. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.discovery.stop();
        self.registrations.unregister_all();
    }

    fn publish(&self) {
        self.presenter.services_updated(&self.registry.snapshot());
    }
}

/// Engine event loop. Commands and stack events are applied in arrival
/// order until cancellation, then teardown runs and the task ends.
pub async fn run(
    mut engine: Engine,
    mut commands: mpsc::Receiver<Command>,
    mut events: mpsc::UnboundedReceiver<StackEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            Some(command) = commands.recv() => {
                engine.handle_command(command);
            }
            Some(event) = events.recv() => {
                engine.handle_event(event);
            }
            _ = cancel.cancelled() => {
                tracing::info!("Engine shutting down");
                engine.shutdown();
                break;
            }
        }
    }
}

/// Handle used by the owning process to drive the engine task
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    /// Spawn the engine task over the given stack-event inbox
    pub fn spawn(
        engine: Engine,
        events: mpsc::UnboundedReceiver<StackEvent>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(32);
        let task = tokio::spawn(run(engine, rx, events, cancel));
        (Self { tx }, task)
    }

    pub async fn start_discovery(&self, service_type: String) -> Result<()> {
        self.tx.send(Command::StartDiscovery(service_type)).await?;
        Ok(())
    }

    pub async fn stop_discovery(&self) -> Result<()> {
        self.tx.send(Command::StopDiscovery).await?;
        Ok(())
    }

    /// Generate and advertise one instance; returns the candidate handle
    pub async fn register_one(&self, service_type: String) -> Result<ServiceDescriptor> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::RegisterOne(service_type, reply)).await?;
        Ok(rx.await??)
    }

    pub async fn unregister_one(&self, name: String) -> Result<()> {
        self.tx.send(Command::UnregisterOne(name)).await?;
        Ok(())
    }

    /// Request connection details; the outcome goes to the presenter
    pub async fn resolve(&self, descriptor: ServiceDescriptor) -> Result<()> {
        self.tx.send(Command::Resolve(descriptor)).await?;
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<Vec<ServiceDescriptor>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Snapshot(reply)).await?;
        Ok(rx.await?)
    }
}
