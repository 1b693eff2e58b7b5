use shared::types::ServiceDescriptor;

/// In-memory set of currently visible peers, in insertion order.
/// Instance names are unique within the registry; only the engine task
/// touches it, so there is no locking.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    entries: Vec<ServiceDescriptor>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Insert at the end, or replace in place when the name is already
    /// present. Returns true when the name was new.
    pub fn upsert(&mut self, descriptor: ServiceDescriptor) -> bool {
        match self.entries.iter_mut().find(|e| e.name == descriptor.name) {
            Some(existing) => {
                *existing = descriptor;
                false
            }
            None => {
                self.entries.push(descriptor);
                true
            }
        }
    }

    /// Remove by name. Returns false for unknown names.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        self.entries.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Owned, ordered copy safe to hand outside the engine task
    pub fn snapshot(&self) -> Vec<ServiceDescriptor> {
        self.entries.clone()
    }
}
