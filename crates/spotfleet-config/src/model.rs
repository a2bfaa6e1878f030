//! Configuration data model
//!
//! Mirrors the YAML layout of `config.yaml`. Every section has serde defaults
//! so a minimal file only names what differs.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Root of the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tencentcloud: CloudConfig,
    pub log: LogConfig,
    pub instance_managers: Vec<FleetSpec>,
}

/// Provider credentials and fleet-wide tagging
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub secret_id: String,
    pub secret_key: String,

    /// Tag key marking fleet membership; the value is the fleet name
    pub tag_key: String,

    /// Tag written to an instance after its one-time initialization
    pub init_flag: InitFlag,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            secret_id: String::new(),
            secret_key: String::new(),
            tag_key: "spotfleet".to_string(),
            init_flag: InitFlag::default(),
        }
    }
}

impl std::fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudConfig")
            .field("secret_id", &self.secret_id)
            .field("tag_key", &self.tag_key)
            .field("init_flag", &self.init_flag)
            .finish_non_exhaustive()
    }
}

/// Idempotency marker tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitFlag {
    pub key: String,
    pub value: String,
}

impl Default for InitFlag {
    fn default() -> Self {
        Self {
            key: "exec".to_string(),
            value: "true".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub log_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_path: None,
        }
    }
}

/// One managed fleet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSpec {
    pub name: String,
    pub instance: InstanceConfig,
    pub feature: FeatureConfig,
    pub domain_binding: DomainBindingConfig,
    pub auto_maintenance: AutoMaintenanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub instance_name: String,
    pub regions: Vec<String>,
    pub image_id: String,
    pub instance_type: String,
    pub instance_charge_type: String,
    pub system_disk: SystemDisk,
    pub internet: InternetConfig,
    pub vpc: VpcConfig,
    pub subnet: SubnetConfig,
    pub security_groups: SecurityGroupConfig,
    pub user: UserConfig,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            instance_name: String::new(),
            regions: Vec::new(),
            image_id: String::new(),
            instance_type: String::new(),
            instance_charge_type: "SPOTPAID".to_string(),
            system_disk: SystemDisk::default(),
            internet: InternetConfig::default(),
            vpc: VpcConfig::default(),
            subnet: SubnetConfig::default(),
            security_groups: SecurityGroupConfig::default(),
            user: UserConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemDisk {
    #[serde(rename = "type")]
    pub disk_type: String,
    pub size: i64,
}

impl Default for SystemDisk {
    fn default() -> Self {
        Self {
            disk_type: "CLOUD_PREMIUM".to_string(),
            size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InternetConfig {
    pub charge_type: String,
    pub bandwidth_out: i64,
}

impl Default for InternetConfig {
    fn default() -> Self {
        Self {
            charge_type: "TRAFFIC_POSTPAID_BY_HOUR".to_string(),
            bandwidth_out: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VpcConfig {
    /// Use this VPC as-is instead of find-or-create
    pub vpc_id: String,
    pub vpc_name: String,
    pub cidr_block: String,
    pub tag_val: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubnetConfig {
    pub subnet_id: String,
    pub subnet_name: String,
    /// CIDR template; `n` is replaced with the chosen zone's index
    pub cidr_block: String,
    pub tag_val: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityGroupConfig {
    pub security_group_id: String,
    pub security_name: String,
    pub group_description: String,
    pub tag_val: String,
    pub rules: Vec<RuleConfig>,
}

/// Rule direction, written `I`/`E` (or `ingress`/`egress`) in YAML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleType {
    #[serde(rename = "I", alias = "ingress")]
    Ingress,
    #[serde(rename = "E", alias = "egress")]
    Egress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_cidr")]
    pub cidr_ip: String,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub desc: String,
}

fn default_protocol() -> String {
    "ALL".to_string()
}

fn default_port() -> String {
    "ALL".to_string()
}

fn default_cidr() -> String {
    "0.0.0.0/0".to_string()
}

fn default_action() -> String {
    "ACCEPT".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            username: "root".to_string(),
            password: String::new(),
        }
    }
}

impl std::fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserConfig")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub file_transfer: FileTransferConfig,
    pub command_exec: CommandExecConfig,
}

impl FeatureConfig {
    /// Whether any one-time initialization step is configured
    pub fn any_enabled(&self) -> bool {
        self.file_transfer.enabled || self.command_exec.enabled
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTransferConfig {
    pub enabled: bool,
    pub local_path: PathBuf,
    pub remote_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandExecConfig {
    pub enabled: bool,
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainBindingConfig {
    pub enabled: bool,

    /// Instance tag recording the bound domain (optional)
    pub tag_key: String,
    pub domain: String,
    pub subdomain: String,
    pub record_line: String,
    pub record_type: String,

    /// Maximum number of records kept for the subdomain
    pub prase_num: usize,
    pub ttl: u64,
}

impl Default for DomainBindingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tag_key: String::new(),
            domain: String::new(),
            subdomain: "@".to_string(),
            record_line: "默认".to_string(),
            record_type: "A".to_string(),
            prase_num: 1,
            ttl: 600,
        }
    }
}

impl DomainBindingConfig {
    /// Fully qualified name, e.g. `www.example.com`
    pub fn fqdn(&self) -> String {
        if self.subdomain.is_empty() || self.subdomain == "@" {
            self.domain.clone()
        } else {
            format!("{}.{}", self.subdomain, self.domain)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoMaintenanceConfig {
    pub enabled: bool,

    /// Seconds between reconciliation ticks
    pub check_interval: u64,
    pub desired_count: u32,

    /// Maximum spot bid price
    pub lowest_price: String,
    pub auto_remove: bool,
}

impl Default for AutoMaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval: 60,
            desired_count: 1,
            lowest_price: String::new(),
            auto_remove: false,
        }
    }
}

impl AutoMaintenanceConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }
}

impl FleetSpec {
    /// Tag value for the fleet's VPC (falls back to the fleet name)
    pub fn vpc_tag_value(&self) -> &str {
        non_empty_or(&self.instance.vpc.tag_val, &self.name)
    }

    pub fn subnet_tag_value(&self) -> &str {
        non_empty_or(&self.instance.subnet.tag_val, &self.name)
    }

    pub fn security_group_tag_value(&self) -> &str {
        non_empty_or(&self.instance.security_groups.tag_val, &self.name)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| ConfigError::Invalid(format!("fleet '{}': {}", self.name, msg));

        if self.instance.regions.is_empty() {
            return Err(invalid("instance.regions must not be empty"));
        }
        if self.instance.image_id.trim().is_empty() {
            return Err(invalid("instance.image_id must be set"));
        }
        if self.auto_maintenance.enabled && self.auto_maintenance.check_interval == 0 {
            return Err(invalid("auto_maintenance.check_interval must be greater than 0"));
        }
        if self.domain_binding.enabled && self.domain_binding.domain.trim().is_empty() {
            return Err(invalid("domain_binding.domain must be set when enabled"));
        }
        if self.domain_binding.enabled && !self.domain_binding.record_type.eq_ignore_ascii_case("A")
        {
            return Err(invalid("domain_binding.record_type must be A"));
        }
        let transfer = &self.feature.file_transfer;
        if transfer.enabled
            && (transfer.local_path.as_os_str().is_empty() || transfer.remote_path.is_empty())
        {
            return Err(invalid(
                "feature.file_transfer needs local_path and remote_path when enabled",
            ));
        }
        if self.feature.command_exec.enabled && self.feature.command_exec.command.trim().is_empty()
        {
            return Err(invalid("feature.command_exec.command must be set when enabled"));
        }
        Ok(())
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

impl Config {
    /// Fleets with auto-maintenance enabled
    pub fn maintained_fleets(&self) -> impl Iterator<Item = &FleetSpec> {
        self.instance_managers
            .iter()
            .filter(|f| f.auto_maintenance.enabled)
    }

    /// Every region referenced by any fleet, deduplicated in first-seen order
    pub fn regions(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.instance_managers
            .iter()
            .flat_map(|f| f.instance.regions.iter())
            .filter(|r| seen.insert(r.as_str()))
            .cloned()
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.tencentcloud.tag_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "tencentcloud.tag_key must not be empty".to_string(),
            ));
        }
        if self.tencentcloud.init_flag.key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "tencentcloud.init_flag.key must not be empty".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for fleet in &self.instance_managers {
            if fleet.name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "every instance manager needs a name".to_string(),
                ));
            }
            if !names.insert(fleet.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate instance manager name '{}'",
                    fleet.name
                )));
            }
            fleet.validate()?;
        }
        Ok(())
    }
}
