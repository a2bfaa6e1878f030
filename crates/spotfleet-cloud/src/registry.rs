//! Region → client mapping
//!
//! Built once at startup and shared read-only by every fleet manager.

use crate::error::{CloudError, Result};
use crate::provider::RegionClient;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Region-scoped API clients, keyed by region name
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<String, Arc<dyn RegionClient>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under its own region; replaces any previous one
    pub fn insert(&mut self, client: Arc<dyn RegionClient>) {
        tracing::debug!("Registering client for region {}", client.region());
        self.clients.insert(client.region().to_string(), client);
    }

    pub fn get(&self, region: &str) -> Result<Arc<dyn RegionClient>> {
        self.clients
            .get(region)
            .cloned()
            .ok_or_else(|| CloudError::RegionNotFound(region.to_string()))
    }

    pub fn contains(&self, region: &str) -> bool {
        self.clients.contains_key(region)
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("regions", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}
