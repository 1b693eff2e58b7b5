use std::net::IpAddr;
use serde::{Serialize, Deserialize};
use crate::protocol;

/// One advertised or discovered service instance.
/// This is the canonical data model shared by the engine, presenter, and
/// stack adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Instance name, unique per service type on the segment, e.g. "peer-12345"
    pub name: String,

    /// Service type, e.g. "_http._tcp."
    pub service_type: String,

    /// Resolved address; absent until resolution supplies it
    pub host: Option<IpAddr>,

    /// Service port; absent until the stack supplies it
    pub port: Option<u16>,
}

/// Rejections raised while constructing a descriptor for self-advertisement.
/// These are synchronous and keep bad names/ports off the network stack.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("instance name {0:?} is empty or too long")]
    NameLength(String),

    #[error("instance name {0:?} contains whitespace or special characters")]
    NameCharset(String),

    #[error("service type {0:?} is not a DNS-SD type like \"_http._tcp.\"")]
    ServiceType(String),

    #[error("port 0 is outside the valid service port range")]
    PortZero,
}

impl ServiceDescriptor {
    /// Descriptor for a peer reported by the stack. Foreign names are kept
    /// as delivered; local naming rules do not apply to them.
    pub fn discovered(name: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            host: None,
            port: None,
        }
    }

    /// Validated descriptor for a locally advertised instance.
    pub fn advertised(
        name: impl Into<String>,
        service_type: impl Into<String>,
        port: u16,
    ) -> Result<Self, DescriptorError> {
        let name = name.into();
        let service_type = service_type.into();

        if name.is_empty() || name.len() > protocol::MAX_INSTANCE_NAME_LEN {
            return Err(DescriptorError::NameLength(name));
        }
        if !name.chars().all(protocol::is_valid_name_char) {
            return Err(DescriptorError::NameCharset(name));
        }
        if !protocol::is_valid_service_type(&service_type) {
            return Err(DescriptorError::ServiceType(service_type));
        }
        if port == 0 {
            return Err(DescriptorError::PortZero);
        }

        Ok(Self {
            name,
            service_type,
            host: None,
            port: Some(port),
        })
    }

    /// Copy of this descriptor with the endpoint resolution filled in
    pub fn with_endpoint(&self, host: IpAddr, port: u16) -> Self {
        Self {
            host: Some(host),
            port: Some(port),
            ..self.clone()
        }
    }

    /// Full DNS-SD instance name, e.g. "peer-12345._http._tcp.local."
    pub fn fullname(&self) -> String {
        protocol::instance_fullname(&self.name, &self.service_type)
    }

    pub fn is_resolved(&self) -> bool {
        self.host.is_some() && self.port.is_some()
    }
}
