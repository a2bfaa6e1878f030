//! Fleet state reader
//!
//! Membership is the fleet tag; nothing read here is kept across ticks.

use crate::error::Result;
use spotfleet_cloud::{InstanceRecord, RegionClient};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reads the live members of one fleet
#[derive(Clone)]
pub struct FleetStateReader {
    client: Arc<dyn RegionClient>,
    tag_key: String,
    tag_value: String,
}

impl FleetStateReader {
    pub fn new(
        client: Arc<dyn RegionClient>,
        tag_key: impl Into<String>,
        tag_value: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tag_key: tag_key.into(),
            tag_value: tag_value.into(),
        }
    }

    /// Number of live instances
    pub async fn count(&self) -> Result<u32> {
        Ok(self
            .client
            .count_instances(&self.tag_key, &self.tag_value)
            .await?)
    }

    /// Fresh view of the fleet's live instances
    pub async fn snapshot(&self) -> Result<FleetSnapshot> {
        let instances = self
            .client
            .list_instances(&self.tag_key, &self.tag_value)
            .await?
            .into_iter()
            .filter(InstanceRecord::is_alive)
            .collect();
        Ok(FleetSnapshot { instances })
    }
}

/// Live instances of a fleet at one point in time
#[derive(Debug, Clone, Default)]
pub struct FleetSnapshot {
    pub instances: Vec<InstanceRecord>,
}

impl FleetSnapshot {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instance_ids(&self) -> Vec<String> {
        self.instances.iter().map(|i| i.id.clone()).collect()
    }

    /// Instances that already have at least one public IP
    pub fn ready_count(&self) -> usize {
        self.instances
            .iter()
            .filter(|i| !i.public_ips.is_empty())
            .count()
    }

    /// Public IP → instance ID for every addressed instance
    pub fn ip_map(&self) -> BTreeMap<String, String> {
        self.instances
            .iter()
            .flat_map(|i| i.public_ips.iter().map(move |ip| (ip.clone(), i.id.clone())))
            .collect()
    }
}
