//! Shared data types exchanged with cloud collaborators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Charge type used for spot-priced (preemptible) capacity
pub const SPOT_CHARGE_TYPE: &str = "SPOTPAID";

/// Only "A" records are managed by the DNS synchronizer
pub const A_RECORD: &str = "A";

/// A resource tag (key/value pair)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Availability zone reported by the compute API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneInfo {
    /// Zone identifier (e.g. "ap-guangzhou-3")
    pub zone: String,

    /// Region the zone belongs to (e.g. "ap-guangzhou")
    pub region: String,

    /// Whether the zone currently accepts new instances
    pub available: bool,
}

/// Parameters of a unit price inquiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuery {
    pub zone: String,
    pub image_id: String,
    pub instance_type: String,
    pub charge_type: String,
}

/// Lifecycle state of a compute instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Pending,
    LaunchFailed,
    Running,
    Stopped,
    Starting,
    Stopping,
    Rebooting,
    Shutdown,
    Terminating,
    Unknown,
}

impl InstanceState {
    /// Parse the provider's state string; unrecognised values map to `Unknown`
    pub fn parse(s: &str) -> Self {
        match s {
            "PENDING" => Self::Pending,
            "LAUNCH_FAILED" => Self::LaunchFailed,
            "RUNNING" => Self::Running,
            "STOPPED" => Self::Stopped,
            "STARTING" => Self::Starting,
            "STOPPING" => Self::Stopping,
            "REBOOTING" => Self::Rebooting,
            "SHUTDOWN" => Self::Shutdown,
            "TERMINATING" => Self::Terminating,
            _ => Self::Unknown,
        }
    }

    /// Whether an instance in this state still counts as a fleet member
    pub fn is_alive(&self) -> bool {
        !matches!(self, Self::LaunchFailed | Self::Shutdown | Self::Terminating)
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::LaunchFailed => "LAUNCH_FAILED",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Starting => "STARTING",
            Self::Stopping => "STOPPING",
            Self::Rebooting => "REBOOTING",
            Self::Shutdown => "SHUTDOWN",
            Self::Terminating => "TERMINATING",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Observed state of one instance, read fresh from the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: String,
    pub name: String,
    pub public_ips: Vec<String>,
    pub zone: String,
    pub region: String,
    pub state: InstanceState,
    pub instance_type: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl InstanceRecord {
    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }
}

/// Everything needed to launch a batch of identical instances
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceLaunch {
    pub region: String,
    pub zone: String,
    pub image_id: String,
    pub instance_type: String,
    pub instance_charge_type: String,
    pub instance_name: String,
    pub instance_count: u32,
    pub disk_type: String,
    pub disk_size: i64,
    pub vpc_id: String,
    pub subnet_id: String,
    pub security_group_ids: Vec<String>,
    pub internet_charge_type: String,
    pub internet_max_bandwidth_out: i64,
    pub password: String,
    /// Maximum spot bid; empty means provider default
    pub max_price: String,
    pub tags: BTreeMap<String, String>,
}

impl std::fmt::Debug for InstanceLaunch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceLaunch")
            .field("region", &self.region)
            .field("zone", &self.zone)
            .field("image_id", &self.image_id)
            .field("instance_type", &self.instance_type)
            .field("instance_charge_type", &self.instance_charge_type)
            .field("instance_count", &self.instance_count)
            .field("vpc_id", &self.vpc_id)
            .field("subnet_id", &self.subnet_id)
            .field("security_group_ids", &self.security_group_ids)
            .field("max_price", &self.max_price)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// VPC creation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpcSpec {
    pub name: String,
    pub cidr_block: String,
}

/// Subnet creation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub vpc_id: String,
    pub zone: String,
    pub name: String,
    pub cidr_block: String,
}

/// Direction of a security group rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDirection {
    Ingress,
    Egress,
}

/// One security group policy entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub direction: RuleDirection,
    pub protocol: String,
    pub port: String,
    pub cidr_block: String,
    pub action: String,
    pub description: String,
}

/// Security group creation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupSpec {
    pub name: String,
    pub description: String,
    pub rules: Vec<SecurityRule>,
}

impl SecurityGroupSpec {
    pub fn rules_for(&self, direction: RuleDirection) -> impl Iterator<Item = &SecurityRule> {
        self.rules.iter().filter(move |r| r.direction == direction)
    }
}

/// Existing DNS record (A records only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: u64,
    /// Record value, an IPv4 address for A records
    pub value: String,
    pub record_type: String,
}

/// DNS record to be created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDnsRecord {
    pub domain: String,
    pub subdomain: String,
    pub record_type: String,
    pub record_line: String,
    pub value: String,
    pub ttl: u64,
}

/// A resource found through the tag API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedResource {
    /// Service owning the resource (e.g. "cvm")
    pub service_type: String,

    /// Resource kind within the service (e.g. "instance")
    pub resource_prefix: String,

    pub resource_id: String,
    pub region: String,
    pub tags: BTreeMap<String, String>,
}

impl TaggedResource {
    /// Whether this resource is a compute instance located in `region`
    pub fn is_instance_in(&self, region: &str) -> bool {
        self.service_type == "cvm" && self.resource_prefix == "instance" && self.region == region
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_state_parse() {
        assert_eq!(InstanceState::parse("RUNNING"), InstanceState::Running);
        assert_eq!(InstanceState::parse("TERMINATING"), InstanceState::Terminating);
        assert_eq!(InstanceState::parse("whatever"), InstanceState::Unknown);
        assert_eq!(InstanceState::Running.to_string(), "RUNNING");
    }

    #[test]
    fn test_instance_state_alive() {
        assert!(InstanceState::Pending.is_alive());
        assert!(InstanceState::Running.is_alive());
        assert!(InstanceState::Stopped.is_alive());
        assert!(!InstanceState::Terminating.is_alive());
        assert!(!InstanceState::Shutdown.is_alive());
        assert!(!InstanceState::LaunchFailed.is_alive());
    }

    #[test]
    fn test_tagged_resource_is_instance_in() {
        let res = TaggedResource {
            service_type: "cvm".to_string(),
            resource_prefix: "instance".to_string(),
            resource_id: "ins-1".to_string(),
            region: "ap-guangzhou".to_string(),
            tags: BTreeMap::new(),
        };
        assert!(res.is_instance_in("ap-guangzhou"));
        assert!(!res.is_instance_in("ap-hongkong"));

        let disk = TaggedResource {
            resource_prefix: "disk".to_string(),
            ..res
        };
        assert!(!disk.is_instance_in("ap-guangzhou"));
    }

    #[test]
    fn test_launch_debug_hides_password() {
        let launch = InstanceLaunch {
            region: "ap-guangzhou".to_string(),
            zone: "ap-guangzhou-3".to_string(),
            image_id: "img-1".to_string(),
            instance_type: "SA2.MEDIUM4".to_string(),
            instance_charge_type: SPOT_CHARGE_TYPE.to_string(),
            instance_name: "web".to_string(),
            instance_count: 1,
            disk_type: "CLOUD_PREMIUM".to_string(),
            disk_size: 50,
            vpc_id: "vpc-1".to_string(),
            subnet_id: "subnet-1".to_string(),
            security_group_ids: vec!["sg-1".to_string()],
            internet_charge_type: "TRAFFIC_POSTPAID_BY_HOUR".to_string(),
            internet_max_bandwidth_out: 10,
            password: "hunter2-secret".to_string(),
            max_price: "0.5".to_string(),
            tags: BTreeMap::new(),
        };
        let rendered = format!("{launch:?}");
        assert!(!rendered.contains("hunter2-secret"));
        assert!(rendered.contains("ap-guangzhou-3"));
    }
}
