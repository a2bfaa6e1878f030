//! tccli response bodies
//!
//! Only the fields spotfleet reads are modelled; everything else is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spotfleet_cloud::{InstanceRecord, InstanceState, TaggedResource};

/// Zone state reported for zones that accept new instances
pub const ZONE_AVAILABLE: &str = "AVAILABLE";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeZonesResponse {
    #[serde(default)]
    pub zone_set: Vec<ZoneEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ZoneEntry {
    pub zone: String,
    #[serde(default)]
    pub zone_state: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InquiryPriceResponse {
    pub price: PriceSet,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PriceSet {
    pub instance_price: ItemPrice,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemPrice {
    pub unit_price_discount: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeInstancesResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub instance_set: Vec<InstanceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceEntry {
    pub instance_id: String,
    #[serde(default)]
    pub instance_name: String,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default)]
    pub instance_state: String,
    pub public_ip_addresses: Option<Vec<String>>,
    pub placement: Option<Placement>,
    pub created_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Placement {
    pub zone: String,
}

impl InstanceEntry {
    pub fn into_record(self, region: &str) -> InstanceRecord {
        let created_at = self
            .created_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));

        InstanceRecord {
            id: self.instance_id,
            name: self.instance_name,
            public_ips: self.public_ip_addresses.unwrap_or_default(),
            zone: self.placement.map(|p| p.zone).unwrap_or_default(),
            region: region.to_string(),
            state: InstanceState::parse(&self.instance_state),
            instance_type: self.instance_type,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunInstancesResponse {
    #[serde(default)]
    pub instance_id_set: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeVpcsResponse {
    #[serde(default)]
    pub vpc_set: Vec<VpcEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateVpcResponse {
    pub vpc: VpcEntry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcEntry {
    pub vpc_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeSubnetsResponse {
    #[serde(default)]
    pub subnet_set: Vec<SubnetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateSubnetResponse {
    pub subnet: SubnetEntry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubnetEntry {
    pub subnet_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeSecurityGroupsResponse {
    #[serde(default)]
    pub security_group_set: Vec<SecurityGroupEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateSecurityGroupResponse {
    pub security_group: SecurityGroupEntry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityGroupEntry {
    pub security_group_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeRecordListResponse {
    #[serde(default)]
    pub record_list: Vec<RecordEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordEntry {
    pub record_id: u64,
    pub value: String,
    #[serde(rename = "Type")]
    pub record_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRecordResponse {
    pub record_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeResourcesByTagsResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub rows: Vec<ResourceTagRow>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceTagRow {
    #[serde(default)]
    pub service_type: String,
    #[serde(default)]
    pub resource_prefix: String,
    pub resource_id: String,
    #[serde(default)]
    pub resource_region: String,
    #[serde(default)]
    pub tags: Vec<TagEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TagEntry {
    pub tag_key: String,
    #[serde(default)]
    pub tag_value: String,
}

impl From<ResourceTagRow> for TaggedResource {
    fn from(row: ResourceTagRow) -> Self {
        TaggedResource {
            service_type: row.service_type,
            resource_prefix: row.resource_prefix,
            resource_id: row.resource_id,
            region: row.resource_region,
            tags: row
                .tags
                .into_iter()
                .map(|t| (t.tag_key, t.tag_value))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetUserAppIdResponse {
    pub uin: String,
}
