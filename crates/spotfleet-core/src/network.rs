//! Network prerequisite resolution
//!
//! VPC and subnet are found by tag or created; the security group is always
//! deleted and recreated so its rules match the configuration exactly. There
//! is a window without the group while it is recreated.

use crate::error::{FleetError, Result};
use crate::zone::subnet_cidr;
use spotfleet_cloud::{
    RegionClient, RuleDirection, SecurityGroupSpec, SecurityRule, SubnetSpec, Tag, VpcSpec,
};
use spotfleet_config::{FleetSpec, RuleType, SecurityGroupConfig};

/// Network identifiers every instance of a fleet is launched into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningContext {
    pub vpc_id: String,
    pub subnet_id: String,
    pub security_group_id: String,
}

/// Resolves a fleet's networking in one region
pub struct NetworkResolver<'a> {
    client: &'a dyn RegionClient,
    tag_key: &'a str,
}

impl<'a> NetworkResolver<'a> {
    pub fn new(client: &'a dyn RegionClient, tag_key: &'a str) -> Self {
        Self { client, tag_key }
    }

    /// Resolve VPC, subnet and security group for `zone`
    ///
    /// IDs preset in the fleet configuration are used verbatim.
    pub async fn resolve(&self, fleet: &FleetSpec, zone: &str) -> Result<ProvisioningContext> {
        let instance = &fleet.instance;

        let vpc_id = if instance.vpc.vpc_id.is_empty() {
            self.find_or_create_vpc(fleet).await?
        } else {
            instance.vpc.vpc_id.clone()
        };

        let subnet_id = if instance.subnet.subnet_id.is_empty() {
            self.find_or_create_subnet(fleet, &vpc_id, zone).await?
        } else {
            instance.subnet.subnet_id.clone()
        };

        let security_group_id = if instance.security_groups.security_group_id.is_empty() {
            self.recreate_security_group(fleet).await?
        } else {
            instance.security_groups.security_group_id.clone()
        };

        tracing::info!(
            fleet = %fleet.name,
            region = %self.client.region(),
            zone = %zone,
            vpc_id = %vpc_id,
            subnet_id = %subnet_id,
            security_group_id = %security_group_id,
            "Resolved network prerequisites"
        );

        Ok(ProvisioningContext {
            vpc_id,
            subnet_id,
            security_group_id,
        })
    }

    async fn find_or_create_vpc(&self, fleet: &FleetSpec) -> Result<String> {
        let tag = Tag::new(self.tag_key, fleet.vpc_tag_value());
        if let Some(id) = self
            .client
            .find_vpc(&tag.key, &tag.value)
            .await
            .map_err(FleetError::network("vpc"))?
        {
            tracing::debug!(fleet = %fleet.name, vpc_id = %id, "Reusing tagged VPC");
            return Ok(id);
        }

        let spec = VpcSpec {
            name: fleet.instance.vpc.vpc_name.clone(),
            cidr_block: fleet.instance.vpc.cidr_block.clone(),
        };
        let id = self
            .client
            .create_vpc(&spec, &tag)
            .await
            .map_err(FleetError::network("vpc"))?;
        tracing::info!(fleet = %fleet.name, vpc_id = %id, cidr = %spec.cidr_block, "Created VPC");
        Ok(id)
    }

    async fn find_or_create_subnet(
        &self,
        fleet: &FleetSpec,
        vpc_id: &str,
        zone: &str,
    ) -> Result<String> {
        let tag = Tag::new(self.tag_key, fleet.subnet_tag_value());
        if let Some(id) = self
            .client
            .find_subnet(vpc_id, zone, &tag.key, &tag.value)
            .await
            .map_err(FleetError::network("subnet"))?
        {
            tracing::debug!(fleet = %fleet.name, subnet_id = %id, "Reusing tagged subnet");
            return Ok(id);
        }

        let spec = SubnetSpec {
            vpc_id: vpc_id.to_string(),
            zone: zone.to_string(),
            name: fleet.instance.subnet.subnet_name.clone(),
            cidr_block: subnet_cidr(&fleet.instance.subnet.cidr_block, zone)?,
        };
        let id = self
            .client
            .create_subnet(&spec, &tag)
            .await
            .map_err(FleetError::network("subnet"))?;
        tracing::info!(fleet = %fleet.name, subnet_id = %id, cidr = %spec.cidr_block, "Created subnet");
        Ok(id)
    }

    async fn recreate_security_group(&self, fleet: &FleetSpec) -> Result<String> {
        let tag = Tag::new(self.tag_key, fleet.security_group_tag_value());

        let existing = self
            .client
            .find_security_groups(&tag.key, &tag.value)
            .await
            .map_err(FleetError::network("security group"))?;
        for id in existing {
            match self.client.delete_security_group(&id).await {
                Ok(()) => tracing::info!(fleet = %fleet.name, security_group_id = %id, "Deleted old security group"),
                Err(e) => tracing::warn!(
                    fleet = %fleet.name,
                    security_group_id = %id,
                    error = %e,
                    "Failed to delete old security group"
                ),
            }
        }

        let spec = security_group_spec(&fleet.instance.security_groups);
        let id = self
            .client
            .create_security_group(&spec, &tag)
            .await
            .map_err(FleetError::network("security group"))?;
        tracing::info!(
            fleet = %fleet.name,
            security_group_id = %id,
            rules = spec.rules.len(),
            "Created security group"
        );
        Ok(id)
    }
}

pub(crate) fn security_group_spec(config: &SecurityGroupConfig) -> SecurityGroupSpec {
    SecurityGroupSpec {
        name: config.security_name.clone(),
        description: config.group_description.clone(),
        rules: config
            .rules
            .iter()
            .map(|rule| SecurityRule {
                direction: match rule.rule_type {
                    RuleType::Ingress => RuleDirection::Ingress,
                    RuleType::Egress => RuleDirection::Egress,
                },
                protocol: rule.protocol.clone(),
                port: rule.port.clone(),
                cidr_block: rule.cidr_ip.clone(),
                action: rule.action.clone(),
                description: rule.desc.clone(),
            })
            .collect(),
    }
}
