use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use mdns_sd::{DaemonEvent, ServiceDaemon, ServiceEvent, ServiceInfo, UnregisterStatus};
use anyhow::{Context, Result};
use shared::protocol;
use shared::types::ServiceDescriptor;
use crate::stack::{codes, DnsSdStack, StackEvent};

/// Live browses keyed by qualified type, shared between submit calls and
/// the pump tasks
type BrowseTable = Arc<Mutex<HashMap<String, BrowseState>>>;

/// DNS-SD stack backed by an mdns-sd ServiceDaemon. Callbacks arrive on
/// the daemon's flume channels and are pumped onto the engine inbox as
/// StackEvents; submit errors surface the same way.
///
/// The daemon keeps exactly one listener per browsed type; a second browse
/// of the same type replaces the first listener. The adapter therefore
/// opens at most one browse per type, and discovery and resolution share it.
pub struct MdnsStack {
    daemon: ServiceDaemon,
    events: mpsc::UnboundedSender<StackEvent>,
    browses: BrowseTable,
}

impl MdnsStack {
    /// Wrap a daemon and start the announcement monitor pump
    pub fn new(daemon: ServiceDaemon, events: mpsc::UnboundedSender<StackEvent>) -> Result<Self> {
        let monitor = daemon.monitor().context("Failed to monitor mDNS daemon")?;
        tokio::spawn(pump_monitor(monitor, events.clone()));
        Ok(Self {
            daemon,
            events,
            browses: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn submit_registration(&self, descriptor: &ServiceDescriptor) -> Result<()> {
        let hostname = hostname::get()
            .context("Failed to get system hostname")?
            .to_string_lossy()
            .to_string();

        let port = descriptor
            .port
            .context("Advertised descriptor is missing a port")?;

        let service_info = ServiceInfo::new(
            &protocol::qualified_type(&descriptor.service_type),
            &descriptor.name,
            &format!("{}.local.", hostname),
            (),
            port,
            None,
        )
        .context("Failed to create ServiceInfo")?
        .enable_addr_auto();

        self.daemon
            .register(service_info)
            .context("Failed to register mDNS service")?;

        tracing::info!("Submitted registration for {}", descriptor.fullname());
        Ok(())
    }
}

impl DnsSdStack for MdnsStack {
    fn start_browse(&self, service_type: &str) {
        let ty = protocol::qualified_type(service_type);
        match self.daemon.browse(&ty) {
            Ok(receiver) => {
                self.browses
                    .lock()
                    .unwrap()
                    .insert(ty.clone(), BrowseState::default());
                tokio::spawn(pump_browse(
                    receiver,
                    ty,
                    self.events.clone(),
                    self.browses.clone(),
                ));
            }
            Err(e) => {
                tracing::error!("Failed to start browse for {}: {}", ty, e);
                let _ = self.events.send(StackEvent::DiscoveryStartFailed {
                    service_type: service_type.to_string(),
                    code: codes::INTERNAL,
                });
            }
        }
    }

    fn stop_browse(&self, service_type: &str) {
        let ty = protocol::qualified_type(service_type);
        if let Err(e) = self.daemon.stop_browse(&ty) {
            tracing::error!("Failed to stop browse for {}: {}", ty, e);
            let _ = self.events.send(StackEvent::DiscoveryStopFailed {
                service_type: service_type.to_string(),
                code: codes::INTERNAL,
            });
        }
    }

    fn register(&self, descriptor: &ServiceDescriptor) {
        if let Err(e) = self.submit_registration(descriptor) {
            tracing::error!("Failed to register {}: {:#}", descriptor.name, e);
            let _ = self.events.send(StackEvent::ServiceRegistrationFailed {
                descriptor: descriptor.clone(),
                code: codes::INTERNAL,
            });
        }
    }

    fn unregister(&self, descriptor: &ServiceDescriptor) {
        let fullname = descriptor.fullname();
        match self.daemon.unregister(&fullname) {
            Ok(status) => {
                tokio::spawn(pump_unregister(
                    status,
                    descriptor.name.clone(),
                    self.events.clone(),
                ));
            }
            Err(e) => {
                tracing::error!("Failed to unregister {}: {}", fullname, e);
                let _ = self.events.send(StackEvent::ServiceUnregistrationFailed {
                    name: descriptor.name.clone(),
                    code: codes::INTERNAL,
                });
            }
        }
    }

    fn resolve(&self, request: u64, descriptor: &ServiceDescriptor) {
        let ty = protocol::qualified_type(&descriptor.service_type);

        // An active session's listener must not be replaced, so a resolve
        // for a browsed type rides the existing browse.
        let route = {
            let mut browses = self.browses.lock().unwrap();
            route_resolve(&mut browses, &ty, request, descriptor)
        };

        match route {
            ResolveRoute::Answered(event) => {
                let _ = self.events.send(event);
            }
            ResolveRoute::Parked => {}
            ResolveRoute::Scoped => match self.daemon.browse(&ty) {
                Ok(receiver) => {
                    tokio::spawn(pump_resolve(
                        receiver,
                        request,
                        descriptor.clone(),
                        self.events.clone(),
                    ));
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to start resolve browse for {}: {}",
                        descriptor.name,
                        e
                    );
                    let _ = self.events.send(StackEvent::ResolveFailed {
                        request,
                        descriptor: descriptor.clone(),
                        code: codes::INTERNAL,
                    });
                }
            },
        }
    }
}

/// How one resolve request gets served
#[derive(Debug)]
enum ResolveRoute {
    /// The browse already learned the endpoint; the outcome is ready
    Answered(StackEvent),
    /// Waiting on the active browse to resolve the instance
    Parked,
    /// No live browse for the type; a scoped one serves this request alone
    Scoped,
}

fn route_resolve(
    browses: &mut HashMap<String, BrowseState>,
    ty: &str,
    request: u64,
    descriptor: &ServiceDescriptor,
) -> ResolveRoute {
    match browses.get_mut(ty) {
        Some(state) => match state.submit(request, descriptor.clone()) {
            Some(event) => ResolveRoute::Answered(event),
            None => ResolveRoute::Parked,
        },
        None => ResolveRoute::Scoped,
    }
}

/// Endpoints learned and resolves parked on one live browse
#[derive(Default)]
struct BrowseState {
    pending: Vec<(u64, ServiceDescriptor)>,
    endpoints: HashMap<String, (IpAddr, u16)>,
}

impl BrowseState {
    /// Answer from a learned endpoint, or park until the browse learns one
    fn submit(&mut self, request: u64, descriptor: ServiceDescriptor) -> Option<StackEvent> {
        match self.endpoints.get(&descriptor.name) {
            Some((host, port)) => Some(StackEvent::ServiceResolved {
                request,
                descriptor: descriptor.with_endpoint(*host, *port),
            }),
            None => {
                self.pending.push((request, descriptor));
                None
            }
        }
    }

    /// Record an endpoint and complete every request parked on the instance
    fn learn(&mut self, name: &str, host: IpAddr, port: u16) -> Vec<StackEvent> {
        self.endpoints.insert(name.to_string(), (host, port));
        let (done, parked): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|(_, descriptor)| descriptor.name == name);
        self.pending = parked;
        done.into_iter()
            .map(|(request, descriptor)| StackEvent::ServiceResolved {
                request,
                descriptor: descriptor.with_endpoint(host, port),
            })
            .collect()
    }

    /// The instance left the network; requests parked on it cannot complete
    fn forget(&mut self, name: &str) -> Vec<StackEvent> {
        self.endpoints.remove(name);
        let (dead, parked): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|(_, descriptor)| descriptor.name == name);
        self.pending = parked;
        dead.into_iter()
            .map(|(request, descriptor)| StackEvent::ResolveFailed {
                request,
                descriptor,
                code: codes::NOT_FOUND,
            })
            .collect()
    }

    /// Outcomes owed when the browse ends
    fn close(self) -> Vec<StackEvent> {
        self.pending
            .into_iter()
            .map(|(request, descriptor)| StackEvent::ResolveFailed {
                request,
                descriptor,
                code: codes::ABORTED,
            })
            .collect()
    }
}

/// Forward browse callbacks until the stack ends the search. The one pump
/// per type also completes resolves parked on its browse.
async fn pump_browse(
    receiver: flume::Receiver<ServiceEvent>,
    service_type: String,
    events: mpsc::UnboundedSender<StackEvent>,
    browses: BrowseTable,
) {
    while let Ok(event) = receiver.recv_async().await {
        match event {
            ServiceEvent::SearchStarted(ty) => {
                let _ = events.send(StackEvent::DiscoveryStarted { service_type: ty });
            }
            ServiceEvent::ServiceFound(ty, fullname) => {
                if let Some(name) = protocol::split_instance(&fullname, &ty) {
                    let _ = events.send(StackEvent::ServiceFound(
                        ServiceDescriptor::discovered(name, protocol::relative_type(&ty)),
                    ));
                }
            }
            ServiceEvent::ServiceResolved(info) => {
                if let Some(name) = protocol::split_instance(info.get_fullname(), info.get_type())
                {
                    if let Some(host) = pick_address(info.get_addresses()) {
                        let completed = match browses.lock().unwrap().get_mut(&service_type) {
                            Some(state) => state.learn(name, host, info.get_port()),
                            None => Vec::new(),
                        };
                        for event in completed {
                            let _ = events.send(event);
                        }
                    }
                }
                if let Some(descriptor) = convert_resolved(&info) {
                    let _ = events.send(StackEvent::ServiceFound(descriptor));
                }
            }
            ServiceEvent::ServiceRemoved(ty, fullname) => {
                if let Some(name) = protocol::split_instance(&fullname, &ty) {
                    let failed = match browses.lock().unwrap().get_mut(&service_type) {
                        Some(state) => state.forget(name),
                        None => Vec::new(),
                    };
                    for event in failed {
                        let _ = events.send(event);
                    }
                    let _ = events.send(StackEvent::ServiceLost {
                        name: name.to_string(),
                    });
                }
            }
            ServiceEvent::SearchStopped(ty) => {
                let _ = events.send(StackEvent::DiscoveryStopped { service_type: ty });
                break;
            }
        }
    }

    // Whichever way the browse ended, parked resolves still get an outcome.
    let closed = browses.lock().unwrap().remove(&service_type);
    if let Some(state) = closed {
        for event in state.close() {
            let _ = events.send(event);
        }
    }
    tracing::debug!("Browse pump for {} ended", service_type);
}

/// Scoped browse serving one resolve for a type with no live browse. Ends
/// at the first matching answer; a channel that closes without one still
/// reports a failure so the request cannot vanish.
async fn pump_resolve(
    receiver: flume::Receiver<ServiceEvent>,
    request: u64,
    descriptor: ServiceDescriptor,
    events: mpsc::UnboundedSender<StackEvent>,
) {
    loop {
        match receiver.recv_async().await {
            Ok(ServiceEvent::ServiceResolved(info)) => {
                let name = protocol::split_instance(info.get_fullname(), info.get_type());
                if name != Some(descriptor.name.as_str()) {
                    continue;
                }
                let Some(host) = pick_address(info.get_addresses()) else {
                    continue;
                };
                let _ = events.send(StackEvent::ServiceResolved {
                    request,
                    descriptor: descriptor.with_endpoint(host, info.get_port()),
                });
                return;
            }
            Ok(ServiceEvent::SearchStopped(_)) | Err(_) => {
                let _ = events.send(StackEvent::ResolveFailed {
                    request,
                    descriptor,
                    code: codes::ABORTED,
                });
                return;
            }
            Ok(_) => {}
        }
    }
}

/// Announcements confirm our own registrations
async fn pump_monitor(
    receiver: flume::Receiver<DaemonEvent>,
    events: mpsc::UnboundedSender<StackEvent>,
) {
    while let Ok(event) = receiver.recv_async().await {
        match event {
            DaemonEvent::Announce(fullname, addresses) => {
                tracing::debug!("Announced {} on {}", fullname, addresses);
                let name = own_instance_name(&fullname);
                if events.send(StackEvent::ServiceRegistered { name }).is_err() {
                    break;
                }
            }
            other => {
                tracing::debug!("mDNS daemon event: {:?}", other);
            }
        }
    }
}

async fn pump_unregister(
    status: flume::Receiver<UnregisterStatus>,
    name: String,
    events: mpsc::UnboundedSender<StackEvent>,
) {
    let event = match status.recv_async().await {
        Ok(UnregisterStatus::OK) => StackEvent::ServiceUnregistered { name },
        Ok(UnregisterStatus::NotFound) => StackEvent::ServiceUnregistrationFailed {
            name,
            code: codes::NOT_FOUND,
        },
        Err(_) => StackEvent::ServiceUnregistrationFailed {
            name,
            code: codes::ABORTED,
        },
    };
    let _ = events.send(event);
}

/// Resolved details from a browse. The engine treats a name it already
/// tracks as informational, so this arrives as a found event with the
/// endpoint filled.
fn convert_resolved(info: &ServiceInfo) -> Option<ServiceDescriptor> {
    let ty = info.get_type();
    let name = protocol::split_instance(info.get_fullname(), ty)?;
    let host = pick_address(info.get_addresses());

    let mut descriptor = ServiceDescriptor::discovered(name, protocol::relative_type(ty));
    descriptor.host = host;
    descriptor.port = Some(info.get_port());
    Some(descriptor)
}

/// Prefer IPv4 for the presented endpoint, fall back to any address
fn pick_address(addresses: &HashSet<IpAddr>) -> Option<IpAddr> {
    addresses
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addresses.iter().next())
        .copied()
}

/// Instance label of one of our own fullnames. Locally generated names
/// never contain dots, so the first label is the name.
fn own_instance_name(fullname: &str) -> String {
    fullname.split('.').next().unwrap_or(fullname).to_string()
}
