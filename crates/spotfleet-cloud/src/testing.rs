//! In-memory fakes of the cloud and remote-shell collaborators
//!
//! Enabled for this crate's tests and, through the `testing` feature, for
//! downstream crates' tests. Every mutating call is appended to a call log so
//! tests can assert exactly which requests were issued.

use crate::error::{CloudError, Result};
use crate::model::{
    A_RECORD, DnsRecord, InstanceLaunch, InstanceRecord, InstanceState, NewDnsRecord, PriceQuery,
    SecurityGroupSpec, SubnetSpec, Tag, TaggedResource, VpcSpec, ZoneInfo,
};
use crate::provider::{ComputeApi, DnsApi, NetworkApi, RegionClient, TagApi};
use crate::remote::{RemoteSession, RemoteShell, RemoteTarget};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct FakeInstance {
    pub record: InstanceRecord,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct FakeNetworkResource {
    id: String,
    vpc_id: Option<String>,
    zone: Option<String>,
    tag: Tag,
}

#[derive(Debug, Clone)]
struct FakeDnsRecord {
    domain: String,
    subdomain: String,
    record: DnsRecord,
}

#[derive(Debug)]
struct FakeState {
    zones: Vec<ZoneInfo>,
    prices: HashMap<String, f64>,
    instances: Vec<FakeInstance>,
    vpcs: Vec<FakeNetworkResource>,
    subnets: Vec<FakeNetworkResource>,
    security_groups: Vec<FakeNetworkResource>,
    records: Vec<FakeDnsRecord>,
    failures: HashSet<String>,
    calls: Vec<String>,
    assign_public_ips: bool,
    next_id: u64,
}

/// In-memory region client
pub struct FakeCloud {
    region: String,
    state: Mutex<FakeState>,
}

impl FakeCloud {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            state: Mutex::new(FakeState {
                zones: Vec::new(),
                prices: HashMap::new(),
                instances: Vec::new(),
                vpcs: Vec::new(),
                subnets: Vec::new(),
                security_groups: Vec::new(),
                records: Vec::new(),
                failures: HashSet::new(),
                calls: Vec::new(),
                assign_public_ips: true,
                next_id: 1,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Add an available zone with an optional spot price
    pub fn with_zone(self, zone: &str, price: Option<f64>) -> Self {
        {
            let mut state = self.state();
            state.zones.push(ZoneInfo {
                zone: zone.to_string(),
                region: self.region.clone(),
                available: true,
            });
            if let Some(price) = price {
                state.prices.insert(zone.to_string(), price);
            }
        }
        self
    }

    /// Add a zone that is reported but sold out
    pub fn with_unavailable_zone(self, zone: &str, price: f64) -> Self {
        {
            let mut state = self.state();
            state.zones.push(ZoneInfo {
                zone: zone.to_string(),
                region: self.region.clone(),
                available: false,
            });
            state.prices.insert(zone.to_string(), price);
        }
        self
    }

    /// Insert a running instance with the given public IPs and tags
    pub fn add_instance(&self, id: &str, public_ips: &[&str], tags: &[(&str, &str)]) {
        let mut state = self.state();
        state.instances.push(FakeInstance {
            record: InstanceRecord {
                id: id.to_string(),
                name: id.to_string(),
                public_ips: public_ips.iter().map(|ip| ip.to_string()).collect(),
                zone: format!("{}-1", self.region),
                region: self.region.clone(),
                state: InstanceState::Running,
                instance_type: "S5.SMALL2".to_string(),
                created_at: None,
            },
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }

    pub fn set_instance_state(&self, id: &str, instance_state: InstanceState) {
        let mut state = self.state();
        if let Some(instance) = state.instances.iter_mut().find(|i| i.record.id == id) {
            instance.record.state = instance_state;
        }
    }

    /// Assign a public IP to an instance that has none yet
    pub fn assign_ip(&self, id: &str, ip: &str) {
        let mut state = self.state();
        if let Some(instance) = state.instances.iter_mut().find(|i| i.record.id == id) {
            instance.record.public_ips.push(ip.to_string());
        }
    }

    /// Whether newly created instances get a public IP immediately
    pub fn set_assign_public_ips(&self, assign: bool) {
        self.state().assign_public_ips = assign;
    }

    pub fn add_record(&self, domain: &str, subdomain: &str, id: u64, value: &str) {
        self.state().records.push(FakeDnsRecord {
            domain: domain.to_string(),
            subdomain: subdomain.to_string(),
            record: DnsRecord {
                id,
                value: value.to_string(),
                record_type: A_RECORD.to_string(),
            },
        });
    }

    pub fn add_security_group(&self, id: &str, tag: Tag) {
        self.state().security_groups.push(FakeNetworkResource {
            id: id.to_string(),
            vpc_id: None,
            zone: None,
            tag,
        });
    }

    pub fn add_vpc(&self, id: &str, tag: Tag) {
        self.state().vpcs.push(FakeNetworkResource {
            id: id.to_string(),
            vpc_id: None,
            zone: None,
            tag,
        });
    }

    /// Make every call identified by `key` fail (e.g. `terminate_instances:ins-2`)
    pub fn fail_on(&self, key: impl Into<String>) {
        self.state().failures.insert(key.into());
    }

    pub fn clear_failure(&self, key: &str) {
        self.state().failures.remove(key);
    }

    /// Full call log, in order
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Number of logged calls starting with `prefix`
    pub fn call_count(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn instances(&self) -> Vec<FakeInstance> {
        self.state().instances.clone()
    }

    pub fn instance_tags(&self, id: &str) -> Option<BTreeMap<String, String>> {
        self.state()
            .instances
            .iter()
            .find(|i| i.record.id == id)
            .map(|i| i.tags.clone())
    }

    /// Current record values of `subdomain.domain`, sorted
    pub fn record_values(&self, domain: &str, subdomain: &str) -> Vec<String> {
        let mut values: Vec<String> = self
            .state()
            .records
            .iter()
            .filter(|r| r.domain == domain && r.subdomain == subdomain)
            .map(|r| r.record.value.clone())
            .collect();
        values.sort();
        values
    }

    pub fn security_group_ids(&self) -> Vec<String> {
        self.state()
            .security_groups
            .iter()
            .map(|sg| sg.id.clone())
            .collect()
    }

    fn check(state: &FakeState, key: &str) -> Result<()> {
        if state.failures.contains(key) {
            return Err(CloudError::ApiError(format!("injected failure: {key}")));
        }
        Ok(())
    }

    fn next_id(state: &mut FakeState) -> u64 {
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    fn has_tag(tags: &BTreeMap<String, String>, key: &str, value: Option<&str>) -> bool {
        match (tags.get(key), value) {
            (Some(v), Some(want)) => v == want,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

#[async_trait]
impl ComputeApi for FakeCloud {
    async fn describe_zones(&self) -> Result<Vec<ZoneInfo>> {
        let state = self.state();
        Self::check(&state, "describe_zones")?;
        Ok(state.zones.clone())
    }

    async fn price_quote(&self, query: &PriceQuery) -> Result<f64> {
        let mut state = self.state();
        state.calls.push(format!("price_quote:{}", query.zone));
        Self::check(&state, &format!("price_quote:{}", query.zone))?;
        state
            .prices
            .get(&query.zone)
            .copied()
            .ok_or_else(|| CloudError::ApiError(format!("no price for {}", query.zone)))
    }

    async fn count_instances(&self, tag_key: &str, tag_value: &str) -> Result<u32> {
        let mut state = self.state();
        state.calls.push("count_instances".to_string());
        Self::check(&state, "count_instances")?;
        Ok(state
            .instances
            .iter()
            .filter(|i| i.record.is_alive() && Self::has_tag(&i.tags, tag_key, Some(tag_value)))
            .count() as u32)
    }

    async fn list_instances(&self, tag_key: &str, tag_value: &str) -> Result<Vec<InstanceRecord>> {
        let mut state = self.state();
        state.calls.push("list_instances".to_string());
        Self::check(&state, "list_instances")?;
        Ok(state
            .instances
            .iter()
            .filter(|i| Self::has_tag(&i.tags, tag_key, Some(tag_value)))
            .map(|i| i.record.clone())
            .collect())
    }

    async fn create_instances(&self, launch: &InstanceLaunch) -> Result<Vec<String>> {
        let mut state = self.state();
        state
            .calls
            .push(format!("create_instances:{}", launch.instance_count));
        Self::check(&state, "create_instances")?;

        let mut ids = Vec::new();
        for _ in 0..launch.instance_count {
            let n = Self::next_id(&mut state);
            let id = format!("ins-{n}");
            let public_ips = if state.assign_public_ips {
                vec![format!("203.0.113.{n}")]
            } else {
                Vec::new()
            };
            state.instances.push(FakeInstance {
                record: InstanceRecord {
                    id: id.clone(),
                    name: launch.instance_name.clone(),
                    public_ips,
                    zone: launch.zone.clone(),
                    region: launch.region.clone(),
                    state: InstanceState::Running,
                    instance_type: launch.instance_type.clone(),
                    created_at: None,
                },
                tags: launch.tags.clone(),
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn terminate_instances(&self, ids: &[String]) -> Result<()> {
        let mut state = self.state();
        for id in ids {
            state.calls.push(format!("terminate_instances:{id}"));
            Self::check(&state, &format!("terminate_instances:{id}"))?;
        }
        state.instances.retain(|i| !ids.contains(&i.record.id));
        Ok(())
    }
}

#[async_trait]
impl NetworkApi for FakeCloud {
    async fn find_vpc(&self, tag_key: &str, tag_value: &str) -> Result<Option<String>> {
        let state = self.state();
        Self::check(&state, "find_vpc")?;
        Ok(state
            .vpcs
            .iter()
            .find(|v| v.tag.key == tag_key && v.tag.value == tag_value)
            .map(|v| v.id.clone()))
    }

    async fn create_vpc(&self, spec: &VpcSpec, tag: &Tag) -> Result<String> {
        let mut state = self.state();
        state.calls.push(format!("create_vpc:{}", spec.cidr_block));
        Self::check(&state, "create_vpc")?;
        let id = format!("vpc-{}", Self::next_id(&mut state));
        state.vpcs.push(FakeNetworkResource {
            id: id.clone(),
            vpc_id: None,
            zone: None,
            tag: tag.clone(),
        });
        Ok(id)
    }

    async fn find_subnet(
        &self,
        vpc_id: &str,
        zone: &str,
        tag_key: &str,
        tag_value: &str,
    ) -> Result<Option<String>> {
        let state = self.state();
        Self::check(&state, "find_subnet")?;
        Ok(state
            .subnets
            .iter()
            .find(|s| {
                s.vpc_id.as_deref() == Some(vpc_id)
                    && s.zone.as_deref() == Some(zone)
                    && s.tag.key == tag_key
                    && s.tag.value == tag_value
            })
            .map(|s| s.id.clone()))
    }

    async fn create_subnet(&self, spec: &SubnetSpec, tag: &Tag) -> Result<String> {
        let mut state = self.state();
        state.calls.push(format!("create_subnet:{}", spec.cidr_block));
        Self::check(&state, "create_subnet")?;
        let id = format!("subnet-{}", Self::next_id(&mut state));
        state.subnets.push(FakeNetworkResource {
            id: id.clone(),
            vpc_id: Some(spec.vpc_id.clone()),
            zone: Some(spec.zone.clone()),
            tag: tag.clone(),
        });
        Ok(id)
    }

    async fn find_security_groups(&self, tag_key: &str, tag_value: &str) -> Result<Vec<String>> {
        let state = self.state();
        Self::check(&state, "find_security_groups")?;
        Ok(state
            .security_groups
            .iter()
            .filter(|sg| sg.tag.key == tag_key && sg.tag.value == tag_value)
            .map(|sg| sg.id.clone())
            .collect())
    }

    async fn create_security_group(&self, spec: &SecurityGroupSpec, tag: &Tag) -> Result<String> {
        let mut state = self.state();
        state
            .calls
            .push(format!("create_security_group:{}", spec.rules.len()));
        Self::check(&state, "create_security_group")?;
        let id = format!("sg-{}", Self::next_id(&mut state));
        state.security_groups.push(FakeNetworkResource {
            id: id.clone(),
            vpc_id: None,
            zone: None,
            tag: tag.clone(),
        });
        Ok(id)
    }

    async fn delete_security_group(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("delete_security_group:{id}"));
        Self::check(&state, &format!("delete_security_group:{id}"))?;
        state.security_groups.retain(|sg| sg.id != id);
        Ok(())
    }
}

#[async_trait]
impl DnsApi for FakeCloud {
    async fn list_records(&self, domain: &str, subdomain: &str) -> Result<Vec<DnsRecord>> {
        let mut state = self.state();
        state.calls.push("list_records".to_string());
        Self::check(&state, "list_records")?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.domain == domain && r.subdomain == subdomain)
            .map(|r| r.record.clone())
            .collect())
    }

    async fn create_record(&self, record: &NewDnsRecord) -> Result<u64> {
        let mut state = self.state();
        state.calls.push(format!("create_record:{}", record.value));
        Self::check(&state, &format!("create_record:{}", record.value))?;
        let id = 1000 + Self::next_id(&mut state);
        state.records.push(FakeDnsRecord {
            domain: record.domain.clone(),
            subdomain: record.subdomain.clone(),
            record: DnsRecord {
                id,
                value: record.value.clone(),
                record_type: record.record_type.clone(),
            },
        });
        Ok(id)
    }

    async fn delete_record(&self, domain: &str, record_id: u64) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("delete_record:{record_id}"));
        Self::check(&state, &format!("delete_record:{record_id}"))?;
        state
            .records
            .retain(|r| !(r.domain == domain && r.record.id == record_id));
        Ok(())
    }
}

#[async_trait]
impl TagApi for FakeCloud {
    async fn find_resources_by_tag(
        &self,
        key: &str,
        value: Option<&str>,
    ) -> Result<Vec<TaggedResource>> {
        let mut state = self.state();
        state.calls.push(format!("find_resources_by_tag:{key}"));
        Self::check(&state, "find_resources_by_tag")?;
        Ok(state
            .instances
            .iter()
            .filter(|i| Self::has_tag(&i.tags, key, value))
            .map(|i| TaggedResource {
                service_type: "cvm".to_string(),
                resource_prefix: "instance".to_string(),
                resource_id: i.record.id.clone(),
                region: i.record.region.clone(),
                tags: i.tags.clone(),
            })
            .collect())
    }

    async fn add_instance_tag(&self, tag: &Tag, instance_id: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("add_instance_tag:{instance_id}"));
        Self::check(&state, &format!("add_instance_tag:{instance_id}"))?;
        let instance = state
            .instances
            .iter_mut()
            .find(|i| i.record.id == instance_id)
            .ok_or_else(|| CloudError::ResourceNotFound(instance_id.to_string()))?;
        instance.tags.insert(tag.key.clone(), tag.value.clone());
        Ok(())
    }
}

impl RegionClient for FakeCloud {
    fn region(&self) -> &str {
        &self.region
    }
}

/// Recorded remote-shell activity
#[derive(Debug, Default)]
pub struct ShellLog {
    pub connects: Vec<String>,
    pub uploads: Vec<(String, String)>,
    pub commands: Vec<(String, String)>,
    pub closes: Vec<String>,
    failures: HashSet<String>,
}

/// Remote shell that records every call instead of connecting anywhere
#[derive(Clone, Default)]
pub struct FakeShell {
    log: Arc<Mutex<ShellLog>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `connect:<host>`, `upload:<host>` or `exec:<host>`
    pub fn fail_on(&self, key: impl Into<String>) {
        self.log.lock().unwrap().failures.insert(key.into());
    }

    pub fn connects(&self) -> Vec<String> {
        self.log.lock().unwrap().connects.clone()
    }

    pub fn uploads(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().uploads.clone()
    }

    pub fn commands(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().commands.clone()
    }

    pub fn closes(&self) -> Vec<String> {
        self.log.lock().unwrap().closes.clone()
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn connect(&self, target: &RemoteTarget) -> Result<Box<dyn RemoteSession>> {
        let mut log = self.log.lock().unwrap();
        log.connects.push(target.host.clone());
        if log.failures.contains(&format!("connect:{}", target.host)) {
            return Err(CloudError::remote(&target.host, "connection refused"));
        }
        Ok(Box::new(FakeSession {
            host: target.host.clone(),
            log: self.log.clone(),
        }))
    }
}

struct FakeSession {
    host: String,
    log: Arc<Mutex<ShellLog>>,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if log.failures.contains(&format!("upload:{}", self.host)) {
            return Err(CloudError::remote(&self.host, "upload failed"));
        }
        log.uploads
            .push((self.host.clone(), format!("{}:{}", local_path.display(), remote_path)));
        Ok(())
    }

    async fn exec(&mut self, command: &str) -> Result<String> {
        let mut log = self.log.lock().unwrap();
        if log.failures.contains(&format!("exec:{}", self.host)) {
            return Err(CloudError::remote(&self.host, "exit status 1"));
        }
        log.commands.push((self.host.clone(), command.to_string()));
        Ok(String::from("ok\n"))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.log.lock().unwrap().closes.push(self.host.clone());
        Ok(())
    }
}
