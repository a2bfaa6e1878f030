//! Cloud API trait definitions
//!
//! Each provider implements the four API traits for one region and is exposed
//! to the engine as a [`RegionClient`].

use crate::error::Result;
use crate::model::{
    DnsRecord, InstanceLaunch, InstanceRecord, NewDnsRecord, PriceQuery, SecurityGroupSpec,
    SubnetSpec, Tag, TaggedResource, VpcSpec, ZoneInfo,
};
use async_trait::async_trait;
use std::time::Duration;

/// Compute instances: zones, prices, membership and lifecycle
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// List the availability zones of this client's region
    async fn describe_zones(&self) -> Result<Vec<ZoneInfo>>;

    /// Discounted unit price for launching one instance with `query`
    async fn price_quote(&self, query: &PriceQuery) -> Result<f64>;

    /// Number of live (non-terminal) instances carrying `tag_key=tag_value`
    async fn count_instances(&self, tag_key: &str, tag_value: &str) -> Result<u32>;

    /// All instances carrying `tag_key=tag_value`
    async fn list_instances(&self, tag_key: &str, tag_value: &str) -> Result<Vec<InstanceRecord>>;

    /// Launch instances, returning the new instance IDs
    async fn create_instances(&self, launch: &InstanceLaunch) -> Result<Vec<String>>;

    /// Terminate the given instances
    async fn terminate_instances(&self, ids: &[String]) -> Result<()>;
}

/// Virtual networks, subnets and security groups
#[async_trait]
pub trait NetworkApi: Send + Sync {
    async fn find_vpc(&self, tag_key: &str, tag_value: &str) -> Result<Option<String>>;

    async fn create_vpc(&self, spec: &VpcSpec, tag: &Tag) -> Result<String>;

    async fn find_subnet(
        &self,
        vpc_id: &str,
        zone: &str,
        tag_key: &str,
        tag_value: &str,
    ) -> Result<Option<String>>;

    async fn create_subnet(&self, spec: &SubnetSpec, tag: &Tag) -> Result<String>;

    /// IDs of every security group carrying `tag_key=tag_value`
    async fn find_security_groups(&self, tag_key: &str, tag_value: &str) -> Result<Vec<String>>;

    async fn create_security_group(&self, spec: &SecurityGroupSpec, tag: &Tag) -> Result<String>;

    async fn delete_security_group(&self, id: &str) -> Result<()>;
}

/// DNS records of a hosted domain
#[async_trait]
pub trait DnsApi: Send + Sync {
    /// A records of `subdomain.domain`
    async fn list_records(&self, domain: &str, subdomain: &str) -> Result<Vec<DnsRecord>>;

    /// Create a record, returning its ID
    async fn create_record(&self, record: &NewDnsRecord) -> Result<u64>;

    async fn delete_record(&self, domain: &str, record_id: u64) -> Result<()>;
}

/// Resource tagging
#[async_trait]
pub trait TagApi: Send + Sync {
    /// Resources tagged with `key` (and `value` when given)
    async fn find_resources_by_tag(
        &self,
        key: &str,
        value: Option<&str>,
    ) -> Result<Vec<TaggedResource>>;

    /// Attach `tag` to the compute instance `instance_id` in this region
    async fn add_instance_tag(&self, tag: &Tag, instance_id: &str) -> Result<()>;
}

/// All cloud APIs for one region
pub trait RegionClient: ComputeApi + NetworkApi + DnsApi + TagApi {
    /// Region this client is bound to
    fn region(&self) -> &str;
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Delay to wait after the given (zero-based) failed attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let delay = self.initial_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}
