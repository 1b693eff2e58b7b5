use shared::types::ServiceDescriptor;

/// Opaque failure codes attached to stack events by the adapter in use
pub mod codes {
    /// The stack rejected or failed an operation internally
    pub const INTERNAL: i32 = 0;
    /// The operation's channel ended before the stack produced an answer
    pub const ABORTED: i32 = 1;
    /// The stack has no record of the named instance
    pub const NOT_FOUND: i32 = 2;
}

/// Callback vocabulary of the DNS-SD stack. Every submitted operation
/// reports its outcome as one of these on the engine inbox, success and
/// failure alike.
#[derive(Debug, Clone)]
pub enum StackEvent {
    DiscoveryStarted { service_type: String },
    DiscoveryStartFailed { service_type: String, code: i32 },
    ServiceFound(ServiceDescriptor),
    ServiceLost { name: String },
    DiscoveryStopped { service_type: String },
    DiscoveryStopFailed { service_type: String, code: i32 },
    ServiceRegistered { name: String },
    ServiceRegistrationFailed { descriptor: ServiceDescriptor, code: i32 },
    ServiceUnregistered { name: String },
    ServiceUnregistrationFailed { name: String, code: i32 },
    ServiceResolved { request: u64, descriptor: ServiceDescriptor },
    ResolveFailed { request: u64, descriptor: ServiceDescriptor, code: i32 },
}

/// Submit-only face of the DNS-SD stack. Implementations answer on the
/// event inbox they were built with; callers never block on the wire and
/// never see a synchronous failure.
pub trait DnsSdStack: Send + Sync + 'static {
    /// Begin browsing for instances of `service_type`
    fn start_browse(&self, service_type: &str);

    /// End the browse for `service_type`
    fn stop_browse(&self, service_type: &str);

    /// Advertise a locally generated instance
    fn register(&self, descriptor: &ServiceDescriptor);

    /// Withdraw a previously submitted advertisement
    fn unregister(&self, descriptor: &ServiceDescriptor);

    /// Resolve connection details for one instance; the outcome carries
    /// `request` so concurrent resolutions stay independent
    fn resolve(&self, request: u64, descriptor: &ServiceDescriptor);
}
