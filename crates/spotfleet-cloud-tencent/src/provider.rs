//! Tencent Cloud region client

use crate::error::{Result, TencentError};
use crate::tccli::{Credentials, Tccli};
use crate::types::{
    CreateRecordResponse, CreateSecurityGroupResponse, CreateSubnetResponse, CreateVpcResponse,
    DescribeInstancesResponse, DescribeRecordListResponse, DescribeResourcesByTagsResponse,
    DescribeSecurityGroupsResponse, DescribeSubnetsResponse, DescribeVpcsResponse,
    DescribeZonesResponse, InquiryPriceResponse, RunInstancesResponse, ZONE_AVAILABLE,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use spotfleet_cloud::{
    A_RECORD, ComputeApi, DnsApi, DnsRecord, InstanceLaunch, InstanceRecord, NetworkApi,
    NewDnsRecord, PriceQuery, RegionClient, RuleDirection, SecurityGroupSpec, SubnetSpec, Tag,
    TagApi, TaggedResource, VpcSpec, ZoneInfo,
};

/// Page size used by every paginated describe call
pub const PAGE_SIZE: u64 = 100;

/// All Tencent Cloud APIs for one region
#[derive(Debug, Clone)]
pub struct TencentCloudClient {
    tccli: Tccli,
    region: String,
    uin: String,
}

impl TencentCloudClient {
    pub fn new(region: impl Into<String>, credentials: Credentials, uin: impl Into<String>) -> Self {
        let region = region.into();
        Self {
            tccli: Tccli::new(&region, credentials),
            region,
            uin: uin.into(),
        }
    }

    pub fn uin(&self) -> &str {
        &self.uin
    }

    /// Resource name used by the tag API for a compute instance
    pub fn instance_resource_name(&self, instance_id: &str) -> String {
        format!(
            "qcs::cvm:{}:uin/{}:instance/{}",
            self.region, self.uin, instance_id
        )
    }

    async fn describe_instances_page(
        &self,
        filters: &Value,
        offset: u64,
    ) -> Result<DescribeInstancesResponse> {
        self.tccli
            .call(
                "cvm",
                "DescribeInstances",
                json!({ "Filters": filters, "Limit": PAGE_SIZE, "Offset": offset }),
            )
            .await
    }

    async fn describe_tagged_instances(
        &self,
        tag_key: &str,
        tag_value: &str,
    ) -> Result<Vec<InstanceRecord>> {
        let filters = tag_filter(tag_key, tag_value);
        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.describe_instances_page(&filters, offset).await?;
            let fetched = page.instance_set.len() as u64;
            records.extend(
                page.instance_set
                    .into_iter()
                    .map(|entry| entry.into_record(&self.region)),
            );
            offset += fetched;
            if fetched == 0 || offset >= page.total_count {
                break;
            }
        }

        Ok(records)
    }

    async fn describe_resources_by_tags(&self, filter: Value) -> Result<Vec<TaggedResource>> {
        let mut resources = Vec::new();
        let mut offset = 0;

        loop {
            let page: DescribeResourcesByTagsResponse = self
                .tccli
                .call(
                    "tag",
                    "DescribeResourcesByTags",
                    json!({
                        "TagFilters": [filter.clone()],
                        "Limit": PAGE_SIZE,
                        "Offset": offset,
                    }),
                )
                .await?;
            let fetched = page.rows.len() as u64;
            resources.extend(page.rows.into_iter().map(TaggedResource::from));
            offset += fetched;
            if fetched == 0 || offset >= page.total_count {
                break;
            }
        }

        Ok(resources)
    }
}

fn tag_filter(tag_key: &str, tag_value: &str) -> Value {
    json!([{ "Name": format!("tag:{tag_key}"), "Values": [tag_value] }])
}

fn vpc_tags(tag: &Tag) -> Value {
    json!([{ "Key": tag.key, "Value": tag.value }])
}

fn security_policies(spec: &SecurityGroupSpec, direction: RuleDirection) -> Vec<Value> {
    spec.rules_for(direction)
        .map(|rule| {
            json!({
                "Protocol": rule.protocol,
                "Port": rule.port,
                "CidrBlock": rule.cidr_block,
                "Action": rule.action,
                "PolicyDescription": rule.description,
            })
        })
        .collect()
}

/// Request body of a RunInstances call
pub(crate) fn run_instances_params(launch: &InstanceLaunch) -> Value {
    let tags: Vec<Value> = launch
        .tags
        .iter()
        .map(|(k, v)| json!({ "Key": k, "Value": v }))
        .collect();

    let mut params = json!({
        "Placement": { "Zone": launch.zone },
        "ImageId": launch.image_id,
        "InstanceType": launch.instance_type,
        "InstanceChargeType": launch.instance_charge_type,
        "InstanceCount": launch.instance_count,
        "InstanceName": launch.instance_name,
        "SystemDisk": { "DiskType": launch.disk_type, "DiskSize": launch.disk_size },
        "VirtualPrivateCloud": { "VpcId": launch.vpc_id, "SubnetId": launch.subnet_id },
        "InternetAccessible": {
            "InternetChargeType": launch.internet_charge_type,
            "InternetMaxBandwidthOut": launch.internet_max_bandwidth_out,
            "PublicIpAssigned": true,
        },
        "SecurityGroupIds": launch.security_group_ids,
        "LoginSettings": { "Password": launch.password },
        "TagSpecification": [{ "ResourceType": "instance", "Tags": tags }],
    });

    if !launch.max_price.is_empty() {
        params["InstanceMarketOptions"] = json!({
            "MarketType": "spot",
            "SpotOptions": { "MaxPrice": launch.max_price, "SpotInstanceType": "one-time" },
        });
    }
    params
}

#[async_trait]
impl ComputeApi for TencentCloudClient {
    async fn describe_zones(&self) -> spotfleet_cloud::Result<Vec<ZoneInfo>> {
        let resp: DescribeZonesResponse = self
            .tccli
            .call("cvm", "DescribeZones", Value::Null)
            .await?;

        Ok(resp
            .zone_set
            .into_iter()
            .map(|z| ZoneInfo {
                available: z.zone_state == ZONE_AVAILABLE,
                zone: z.zone,
                region: self.region.clone(),
            })
            .collect())
    }

    async fn price_quote(&self, query: &PriceQuery) -> spotfleet_cloud::Result<f64> {
        let resp: InquiryPriceResponse = self
            .tccli
            .call(
                "cvm",
                "InquiryPriceRunInstances",
                json!({
                    "Placement": { "Zone": query.zone },
                    "ImageId": query.image_id,
                    "InstanceType": query.instance_type,
                    "InstanceChargeType": query.charge_type,
                }),
            )
            .await?;

        resp.price.instance_price.unit_price_discount.ok_or_else(|| {
            TencentError::invalid("InquiryPriceRunInstances", "UnitPriceDiscount missing").into()
        })
    }

    async fn count_instances(&self, tag_key: &str, tag_value: &str) -> spotfleet_cloud::Result<u32> {
        let records = self.describe_tagged_instances(tag_key, tag_value).await?;
        Ok(records.iter().filter(|r| r.is_alive()).count() as u32)
    }

    async fn list_instances(
        &self,
        tag_key: &str,
        tag_value: &str,
    ) -> spotfleet_cloud::Result<Vec<InstanceRecord>> {
        Ok(self.describe_tagged_instances(tag_key, tag_value).await?)
    }

    async fn create_instances(&self, launch: &InstanceLaunch) -> spotfleet_cloud::Result<Vec<String>> {
        tracing::debug!(region = %self.region, launch = ?launch, "RunInstances request");

        let resp: RunInstancesResponse = self
            .tccli
            .call("cvm", "RunInstances", run_instances_params(launch))
            .await?;
        Ok(resp.instance_id_set)
    }

    async fn terminate_instances(&self, ids: &[String]) -> spotfleet_cloud::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.tccli
            .call_unit("cvm", "TerminateInstances", json!({ "InstanceIds": ids }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NetworkApi for TencentCloudClient {
    async fn find_vpc(&self, tag_key: &str, tag_value: &str) -> spotfleet_cloud::Result<Option<String>> {
        let resp: DescribeVpcsResponse = self
            .tccli
            .call(
                "vpc",
                "DescribeVpcs",
                json!({ "Filters": tag_filter(tag_key, tag_value) }),
            )
            .await?;
        Ok(resp.vpc_set.into_iter().next().map(|v| v.vpc_id))
    }

    async fn create_vpc(&self, spec: &VpcSpec, tag: &Tag) -> spotfleet_cloud::Result<String> {
        let resp: CreateVpcResponse = self
            .tccli
            .call(
                "vpc",
                "CreateVpc",
                json!({
                    "VpcName": spec.name,
                    "CidrBlock": spec.cidr_block,
                    "Tags": vpc_tags(tag),
                }),
            )
            .await?;
        Ok(resp.vpc.vpc_id)
    }

    async fn find_subnet(
        &self,
        vpc_id: &str,
        zone: &str,
        tag_key: &str,
        tag_value: &str,
    ) -> spotfleet_cloud::Result<Option<String>> {
        let resp: DescribeSubnetsResponse = self
            .tccli
            .call(
                "vpc",
                "DescribeSubnets",
                json!({
                    "Filters": [
                        { "Name": "vpc-id", "Values": [vpc_id] },
                        { "Name": "zone", "Values": [zone] },
                        { "Name": format!("tag:{tag_key}"), "Values": [tag_value] },
                    ],
                }),
            )
            .await?;
        Ok(resp.subnet_set.into_iter().next().map(|s| s.subnet_id))
    }

    async fn create_subnet(&self, spec: &SubnetSpec, tag: &Tag) -> spotfleet_cloud::Result<String> {
        let resp: CreateSubnetResponse = self
            .tccli
            .call(
                "vpc",
                "CreateSubnet",
                json!({
                    "VpcId": spec.vpc_id,
                    "SubnetName": spec.name,
                    "CidrBlock": spec.cidr_block,
                    "Zone": spec.zone,
                    "Tags": vpc_tags(tag),
                }),
            )
            .await?;
        Ok(resp.subnet.subnet_id)
    }

    async fn find_security_groups(
        &self,
        tag_key: &str,
        tag_value: &str,
    ) -> spotfleet_cloud::Result<Vec<String>> {
        let resp: DescribeSecurityGroupsResponse = self
            .tccli
            .call(
                "vpc",
                "DescribeSecurityGroups",
                json!({ "Filters": tag_filter(tag_key, tag_value), "Limit": PAGE_SIZE.to_string() }),
            )
            .await?;
        Ok(resp
            .security_group_set
            .into_iter()
            .map(|sg| sg.security_group_id)
            .collect())
    }

    async fn create_security_group(
        &self,
        spec: &SecurityGroupSpec,
        tag: &Tag,
    ) -> spotfleet_cloud::Result<String> {
        let resp: CreateSecurityGroupResponse = self
            .tccli
            .call(
                "vpc",
                "CreateSecurityGroupWithPolicies",
                json!({
                    "GroupName": spec.name,
                    "GroupDescription": spec.description,
                    "SecurityGroupPolicySet": {
                        "Ingress": security_policies(spec, RuleDirection::Ingress),
                        "Egress": security_policies(spec, RuleDirection::Egress),
                    },
                    "Tags": vpc_tags(tag),
                }),
            )
            .await?;
        Ok(resp.security_group.security_group_id)
    }

    async fn delete_security_group(&self, id: &str) -> spotfleet_cloud::Result<()> {
        self.tccli
            .call_unit(
                "vpc",
                "DeleteSecurityGroup",
                json!({ "SecurityGroupId": id }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DnsApi for TencentCloudClient {
    async fn list_records(
        &self,
        domain: &str,
        subdomain: &str,
    ) -> spotfleet_cloud::Result<Vec<DnsRecord>> {
        let result: Result<DescribeRecordListResponse> = self
            .tccli
            .call(
                "dnspod",
                "DescribeRecordList",
                json!({ "Domain": domain, "Subdomain": subdomain, "RecordType": A_RECORD }),
            )
            .await;

        let resp = match result {
            Ok(resp) => resp,
            // An empty record list is reported as an error
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(resp
            .record_list
            .into_iter()
            .filter(|r| r.record_type == A_RECORD)
            .map(|r| DnsRecord {
                id: r.record_id,
                value: r.value,
                record_type: r.record_type,
            })
            .collect())
    }

    async fn create_record(&self, record: &NewDnsRecord) -> spotfleet_cloud::Result<u64> {
        let resp: CreateRecordResponse = self
            .tccli
            .call(
                "dnspod",
                "CreateRecord",
                json!({
                    "Domain": record.domain,
                    "SubDomain": record.subdomain,
                    "RecordType": record.record_type,
                    "RecordLine": record.record_line,
                    "Value": record.value,
                    "TTL": record.ttl,
                }),
            )
            .await?;
        Ok(resp.record_id)
    }

    async fn delete_record(&self, domain: &str, record_id: u64) -> spotfleet_cloud::Result<()> {
        self.tccli
            .call_unit(
                "dnspod",
                "DeleteRecord",
                json!({ "Domain": domain, "RecordId": record_id }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TagApi for TencentCloudClient {
    async fn find_resources_by_tag(
        &self,
        key: &str,
        value: Option<&str>,
    ) -> spotfleet_cloud::Result<Vec<TaggedResource>> {
        let filter = match value {
            Some(v) => json!({ "TagKey": key, "TagValue": [v] }),
            None => json!({ "TagKey": key }),
        };
        Ok(self.describe_resources_by_tags(filter).await?)
    }

    async fn add_instance_tag(&self, tag: &Tag, instance_id: &str) -> spotfleet_cloud::Result<()> {
        self.tccli
            .call_unit(
                "tag",
                "AddResourceTag",
                json!({
                    "TagKey": tag.key,
                    "TagValue": tag.value,
                    "Resource": self.instance_resource_name(instance_id),
                }),
            )
            .await?;
        Ok(())
    }
}

impl RegionClient for TencentCloudClient {
    fn region(&self) -> &str {
        &self.region
    }
}
