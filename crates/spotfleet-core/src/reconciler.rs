//! Fleet reconciler
//!
//! One tick compares the live instance count with the desired count and
//! issues the corrective action:
//!
//! | observed                         | action                                  |
//! |----------------------------------|-----------------------------------------|
//! | current < desired                | create the difference, then converge    |
//! | current > desired, auto-remove   | terminate a random surplus              |
//! | current > desired, no auto-remove| nothing                                 |
//! | current == desired               | converge when init features are enabled |
//!
//! "Converge" means waiting for public IPs, syncing DNS and initializing new
//! instances. Nothing is carried from one tick to the next.

use crate::dns::{DnsSyncReport, DnsSynchronizer, PollConfig};
use crate::error::{FleetError, Result};
use crate::init::{InitReport, Initializer};
use crate::network::{NetworkResolver, ProvisioningContext};
use crate::state::FleetStateReader;
use crate::zone::{PriceRequest, ZonePrice, select_zone};
use rand::seq::IndexedRandom;
use spotfleet_cloud::{ClientRegistry, InstanceLaunch, RegionClient, RemoteShell, Tag};
use spotfleet_config::FleetSpec;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Corrective action for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ScaleUp(u32),
    ScaleDown(u32),
    /// Surplus instances, but auto-remove is disabled
    Hold(u32),
    Steady,
}

/// Decide the action for the observed and desired counts
pub fn decide(current: u32, desired: u32, auto_remove: bool) -> Action {
    if current < desired {
        Action::ScaleUp(desired - current)
    } else if current > desired {
        if auto_remove {
            Action::ScaleDown(current - desired)
        } else {
            Action::Hold(current - desired)
        }
    } else {
        Action::Steady
    }
}

/// What one tick did
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub action: Action,
    pub created: Vec<String>,
    pub terminated: Vec<String>,
    pub dns: Option<DnsSyncReport>,
    pub init: Option<InitReport>,
}

impl TickOutcome {
    fn new(action: Action) -> Self {
        Self {
            action,
            created: Vec::new(),
            terminated: Vec::new(),
            dns: None,
            init: None,
        }
    }
}

/// Fleet-wide settings shared by every reconciler
#[derive(Debug, Clone)]
pub struct FleetDefaults {
    /// Tag key identifying fleet membership
    pub tag_key: String,
    /// Tag marking completed initialization
    pub init_flag: Tag,
    pub poll: PollConfig,
}

/// Drives one fleet toward its desired size
pub struct FleetReconciler {
    spec: FleetSpec,
    tag_key: String,
    zone: ZonePrice,
    context: ProvisioningContext,
    client: Arc<dyn RegionClient>,
    reader: FleetStateReader,
    dns: DnsSynchronizer,
    initializer: Initializer,
}

impl FleetReconciler {
    /// Pick the cheapest zone and resolve networking, once
    pub async fn setup(
        spec: FleetSpec,
        defaults: &FleetDefaults,
        registry: &ClientRegistry,
        shell: Arc<dyn RemoteShell>,
    ) -> Result<Self> {
        let request = PriceRequest {
            image_id: spec.instance.image_id.clone(),
            instance_type: spec.instance.instance_type.clone(),
            charge_type: spec.instance.instance_charge_type.clone(),
        };
        let zone = select_zone(registry, &spec.instance.regions, &request).await?;
        let client = registry
            .get(&zone.region)
            .map_err(|_| FleetError::MissingRegionClient(zone.region.clone()))?;

        let context = NetworkResolver::new(client.as_ref(), &defaults.tag_key)
            .resolve(&spec, &zone.zone)
            .await?;

        Ok(Self::new(spec, defaults, zone, context, client, shell))
    }

    /// Assemble a reconciler from an already resolved zone and network
    pub fn new(
        spec: FleetSpec,
        defaults: &FleetDefaults,
        zone: ZonePrice,
        context: ProvisioningContext,
        client: Arc<dyn RegionClient>,
        shell: Arc<dyn RemoteShell>,
    ) -> Self {
        let reader = FleetStateReader::new(client.clone(), &defaults.tag_key, &spec.name);
        let dns = DnsSynchronizer::new(client.clone(), reader.clone(), defaults.poll);
        let initializer = Initializer::new(
            client.clone(),
            shell,
            defaults.init_flag.clone(),
            spec.feature.clone(),
            spec.instance.user.clone(),
        );

        Self {
            spec,
            tag_key: defaults.tag_key.clone(),
            zone,
            context,
            client,
            reader,
            dns,
            initializer,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn zone(&self) -> &ZonePrice {
        &self.zone
    }

    pub fn context(&self) -> &ProvisioningContext {
        &self.context
    }

    fn desired(&self) -> u32 {
        self.spec.auto_maintenance.desired_count
    }

    /// Span carrying the fleet's identity on every log line
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "fleet",
            fleet = %self.spec.name,
            region = %self.zone.region,
            zone = %self.zone.zone
        )
    }

    /// Launch parameters for `count` new instances
    pub fn launch_template(&self, count: u32) -> InstanceLaunch {
        let instance = &self.spec.instance;
        let mut tags = BTreeMap::from([(self.tag_key.clone(), self.spec.name.clone())]);
        let binding = &self.spec.domain_binding;
        if !binding.tag_key.is_empty() {
            tags.insert(binding.tag_key.clone(), binding.fqdn());
        }

        InstanceLaunch {
            region: self.zone.region.clone(),
            zone: self.zone.zone.clone(),
            image_id: instance.image_id.clone(),
            instance_type: instance.instance_type.clone(),
            instance_charge_type: instance.instance_charge_type.clone(),
            instance_name: instance.instance_name.clone(),
            instance_count: count,
            disk_type: instance.system_disk.disk_type.clone(),
            disk_size: instance.system_disk.size,
            vpc_id: self.context.vpc_id.clone(),
            subnet_id: self.context.subnet_id.clone(),
            security_group_ids: vec![self.context.security_group_id.clone()],
            internet_charge_type: instance.internet.charge_type.clone(),
            internet_max_bandwidth_out: instance.internet.bandwidth_out,
            password: instance.user.password.clone(),
            max_price: self.spec.auto_maintenance.lowest_price.clone(),
            tags,
        }
    }

    /// Run one reconciliation tick
    pub async fn reconcile_once(&self, cancel: &CancellationToken) -> Result<TickOutcome> {
        let current = self.reader.count().await?;
        let desired = self.desired();
        let action = decide(current, desired, self.spec.auto_maintenance.auto_remove);
        tracing::info!(current, desired, action = ?action, "Reconciling");

        let mut outcome = TickOutcome::new(action);
        match action {
            Action::ScaleUp(missing) => {
                let launch = self.launch_template(missing);
                outcome.created = self.client.create_instances(&launch).await?;
                tracing::info!(
                    requested = missing,
                    created = outcome.created.len(),
                    ids = ?outcome.created,
                    "Created instances"
                );
                self.converge(cancel, &mut outcome).await?;
            }
            Action::ScaleDown(surplus) => {
                outcome.terminated = self.scale_down(surplus).await?;
            }
            Action::Hold(surplus) => {
                tracing::warn!(surplus, "Fleet above desired size; auto_remove is disabled");
            }
            Action::Steady => {
                if self.initializer.is_enabled() {
                    self.converge(cancel, &mut outcome).await?;
                }
            }
        }

        Ok(outcome)
    }

    /// Wait for public IPs, then sync DNS and initialize new instances
    async fn converge(&self, cancel: &CancellationToken, outcome: &mut TickOutcome) -> Result<()> {
        let ips = self.dns.wait_for_ips(self.desired() as usize, cancel).await?;

        let binding = &self.spec.domain_binding;
        if binding.enabled {
            match self.dns.sync_records(binding, &ips).await {
                Ok(report) => outcome.dns = Some(report),
                Err(e) => tracing::warn!(error = %e, "Skipping DNS sync; failed to list records"),
            }
        }

        if self.initializer.is_enabled() {
            outcome.init = Some(self.initializer.run(&ips).await?);
        }
        Ok(())
    }

    /// Terminate `surplus` randomly chosen fleet members, one at a time
    async fn scale_down(&self, surplus: u32) -> Result<Vec<String>> {
        let candidates = self.reader.snapshot().await?.instance_ids();
        let victims: Vec<String> = {
            let mut rng = rand::rng();
            candidates
                .choose_multiple(&mut rng, surplus as usize)
                .cloned()
                .collect()
        };

        let mut terminated = Vec::with_capacity(victims.len());
        for id in victims {
            match self.client.terminate_instances(std::slice::from_ref(&id)).await {
                Ok(()) => {
                    tracing::info!(instance_id = %id, "Terminated instance");
                    terminated.push(id);
                }
                Err(e) => {
                    tracing::error!(instance_id = %id, error = %e, "Failed to terminate instance");
                }
            }
        }
        Ok(terminated)
    }

    /// Reconcile immediately, then every check interval until cancelled
    ///
    /// Cancellation is observed between ticks and while polling for IPs; a tick
    /// that is already running otherwise completes.
    pub async fn run(self, cancel: CancellationToken) {
        let span = self.span();
        async move {
            let period = self.spec.auto_maintenance.check_interval();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(interval_secs = period.as_secs(), "Fleet manager started");

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match self.reconcile_once(&cancel).await {
                    Ok(outcome) => tracing::debug!(outcome = ?outcome, "Tick finished"),
                    Err(FleetError::Cancelled) => break,
                    Err(e) => tracing::error!(error = %e, "Tick failed"),
                }
            }

            tracing::info!("Fleet manager stopped");
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotfleet_cloud::testing::{FakeCloud, FakeShell};
    use std::collections::HashSet;
    use std::time::Duration;

    fn spec(desired: u32, auto_remove: bool) -> FleetSpec {
        let mut spec = FleetSpec {
            name: "web".to_string(),
            ..Default::default()
        };
        spec.instance.regions = vec!["ap-guangzhou".to_string()];
        spec.instance.image_id = "img-487zeit5".to_string();
        spec.instance.instance_type = "SA2.MEDIUM4".to_string();
        spec.instance.instance_name = "web-node".to_string();
        spec.instance.user.password = "Passw0rd!".to_string();
        spec.auto_maintenance.enabled = true;
        spec.auto_maintenance.desired_count = desired;
        spec.auto_maintenance.auto_remove = auto_remove;
        spec.auto_maintenance.lowest_price = "0.08".to_string();
        spec
    }

    fn defaults() -> FleetDefaults {
        FleetDefaults {
            tag_key: "spotfleet".to_string(),
            init_flag: Tag::new("exec", "true"),
            poll: PollConfig {
                attempts: 2,
                interval: Duration::ZERO,
            },
        }
    }

    fn context() -> ProvisioningContext {
        ProvisioningContext {
            vpc_id: "vpc-1".to_string(),
            subnet_id: "subnet-1".to_string(),
            security_group_id: "sg-1".to_string(),
        }
    }

    fn reconciler(spec: FleetSpec, cloud: &Arc<FakeCloud>, shell: &FakeShell) -> FleetReconciler {
        let zone = ZonePrice {
            region: "ap-guangzhou".to_string(),
            zone: "ap-guangzhou-3".to_string(),
            price: 0.05,
        };
        FleetReconciler::new(
            spec,
            &defaults(),
            zone,
            context(),
            cloud.clone(),
            Arc::new(shell.clone()),
        )
    }

    fn with_features(mut spec: FleetSpec) -> FleetSpec {
        spec.feature.file_transfer.enabled = true;
        spec.feature.file_transfer.local_path = "./dist".into();
        spec.feature.file_transfer.remote_path = "/opt/web".to_string();
        spec.feature.command_exec.enabled = true;
        spec.feature.command_exec.command = "sh /opt/web/install.sh".to_string();
        spec.domain_binding.enabled = true;
        spec.domain_binding.domain = "example.com".to_string();
        spec.domain_binding.subdomain = "www".to_string();
        spec.domain_binding.prase_num = 2;
        spec
    }

    #[test]
    fn test_decide() {
        assert_eq!(decide(0, 3, false), Action::ScaleUp(3));
        assert_eq!(decide(5, 2, true), Action::ScaleDown(3));
        assert_eq!(decide(5, 2, false), Action::Hold(3));
        assert_eq!(decide(2, 2, true), Action::Steady);
    }

    #[test]
    fn test_launch_template() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        let mut spec = spec(1, false);
        spec.domain_binding.tag_key = "domain".to_string();
        spec.domain_binding.domain = "example.com".to_string();
        spec.domain_binding.subdomain = "www".to_string();

        let launch = reconciler(spec, &cloud, &FakeShell::new()).launch_template(2);
        assert_eq!(launch.instance_count, 2);
        assert_eq!(launch.zone, "ap-guangzhou-3");
        assert_eq!(launch.subnet_id, "subnet-1");
        assert_eq!(launch.security_group_ids, vec!["sg-1"]);
        assert_eq!(launch.max_price, "0.08");
        assert_eq!(launch.tags.get("spotfleet").map(String::as_str), Some("web"));
        assert_eq!(
            launch.tags.get("domain").map(String::as_str),
            Some("www.example.com")
        );
    }

    #[tokio::test]
    async fn test_scale_up_from_zero() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        let shell = FakeShell::new();
        let reconciler = reconciler(with_features(spec(3, false)), &cloud, &shell);

        let outcome = reconciler
            .reconcile_once(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.action, Action::ScaleUp(3));
        assert_eq!(outcome.created.len(), 3);
        assert_eq!(cloud.call_count("create_instances:3"), 1);
        assert_eq!(cloud.call_count("create_instances"), 1);

        // DNS capped at prase_num
        assert_eq!(outcome.dns.as_ref().unwrap().created, 2);
        assert_eq!(cloud.record_values("example.com", "www").len(), 2);

        // Every new instance uploaded, executed and tagged
        let init = outcome.init.unwrap();
        assert_eq!(init.initialized.len(), 3);
        assert_eq!(shell.uploads().len(), 3);
        assert_eq!(shell.commands().len(), 3);
        for instance in cloud.instances() {
            assert_eq!(instance.tags.get("exec").map(String::as_str), Some("true"));
            assert_eq!(instance.record.zone, "ap-guangzhou-3");
        }
    }

    #[tokio::test]
    async fn test_scale_up_creates_only_the_difference() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.add_instance("ins-a", &["1.1.1.1"], &[("spotfleet", "web")]);
        let reconciler = reconciler(spec(3, false), &cloud, &FakeShell::new());

        let outcome = reconciler
            .reconcile_once(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.action, Action::ScaleUp(2));
        assert_eq!(cloud.call_count("create_instances"), 1);
        assert_eq!(cloud.call_count("create_instances:2"), 1);
        assert_eq!(cloud.instances().len(), 3);
    }

    #[tokio::test]
    async fn test_scale_up_timeout_is_a_tick_error() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.set_assign_public_ips(false);
        let shell = FakeShell::new();
        let reconciler = reconciler(with_features(spec(2, false)), &cloud, &shell);

        let err = reconciler
            .reconcile_once(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::ProvisioningTimeout { .. }));
        assert_eq!(cloud.call_count("create_instances"), 1);
        assert_eq!(cloud.call_count("create_record"), 0);
        assert!(shell.connects().is_empty());
    }

    #[tokio::test]
    async fn test_scale_down_terminates_exact_surplus() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        for i in 1..=5 {
            cloud.add_instance(&format!("ins-{i}"), &[], &[("spotfleet", "web")]);
        }
        cloud.add_instance("other", &[], &[("spotfleet", "api")]);
        let reconciler = reconciler(spec(2, true), &cloud, &FakeShell::new());

        let outcome = reconciler
            .reconcile_once(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.action, Action::ScaleDown(3));
        assert_eq!(outcome.terminated.len(), 3);

        let distinct: HashSet<_> = outcome.terminated.iter().collect();
        assert_eq!(distinct.len(), 3);
        assert!(!outcome.terminated.contains(&"other".to_string()));
        assert_eq!(cloud.instances().len(), 3);
    }

    #[tokio::test]
    async fn test_scale_down_isolates_failures() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        for i in 1..=3 {
            cloud.add_instance(&format!("ins-{i}"), &[], &[("spotfleet", "web")]);
        }
        cloud.fail_on("terminate_instances:ins-2");
        let reconciler = reconciler(spec(0, true), &cloud, &FakeShell::new());

        let outcome = reconciler
            .reconcile_once(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(cloud.call_count("terminate_instances"), 3);
        assert_eq!(outcome.terminated.len(), 2);
        assert!(!outcome.terminated.contains(&"ins-2".to_string()));
    }

    #[tokio::test]
    async fn test_surplus_without_auto_remove_is_noop() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        for i in 1..=3 {
            cloud.add_instance(&format!("ins-{i}"), &["1.1.1.1"], &[("spotfleet", "web")]);
        }
        let shell = FakeShell::new();
        let reconciler = reconciler(with_features(spec(1, false)), &cloud, &shell);

        let outcome = reconciler
            .reconcile_once(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.action, Action::Hold(2));
        assert_eq!(cloud.calls(), vec!["count_instances"]);
        assert!(shell.connects().is_empty());
    }

    #[tokio::test]
    async fn test_steady_state_is_idempotent() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.add_instance("ins-1", &["1.1.1.1"], &[("spotfleet", "web"), ("exec", "true")]);
        cloud.add_instance("ins-2", &["2.2.2.2"], &[("spotfleet", "web"), ("exec", "true")]);
        cloud.add_record("example.com", "www", 1, "1.1.1.1");
        cloud.add_record("example.com", "www", 2, "2.2.2.2");
        let shell = FakeShell::new();
        let reconciler = reconciler(with_features(spec(2, true)), &cloud, &shell);

        for _ in 0..2 {
            let outcome = reconciler
                .reconcile_once(&CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(outcome.action, Action::Steady);
            assert_eq!(outcome.init.unwrap().already_done, 2);
        }

        assert!(shell.connects().is_empty());
        for mutating in [
            "create_instances",
            "terminate_instances",
            "create_record",
            "delete_record",
            "add_instance_tag",
        ] {
            assert_eq!(cloud.call_count(mutating), 0, "{mutating}");
        }
    }

    #[tokio::test]
    async fn test_steady_without_features_reads_count_only() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.add_instance("ins-1", &["1.1.1.1"], &[("spotfleet", "web")]);
        let reconciler = reconciler(spec(1, false), &cloud, &FakeShell::new());

        let outcome = reconciler
            .reconcile_once(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.action, Action::Steady);
        assert_eq!(cloud.calls(), vec!["count_instances"]);
    }

    #[tokio::test]
    async fn test_count_failure_aborts_tick() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.fail_on("count_instances");
        let reconciler = reconciler(spec(1, false), &cloud, &FakeShell::new());

        assert!(reconciler
            .reconcile_once(&CancellationToken::new())
            .await
            .is_err());
        assert_eq!(cloud.call_count("create_instances"), 0);
    }

    #[tokio::test]
    async fn test_failed_create_is_retried_from_fresh_count() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.fail_on("create_instances");
        let reconciler = reconciler(spec(2, false), &cloud, &FakeShell::new());
        let cancel = CancellationToken::new();

        assert!(reconciler.reconcile_once(&cancel).await.is_err());
        cloud.clear_failure("create_instances");

        let outcome = reconciler.reconcile_once(&cancel).await.unwrap();
        assert_eq!(outcome.action, Action::ScaleUp(2));
        assert_eq!(cloud.instances().len(), 2);

        let outcome = reconciler.reconcile_once(&cancel).await.unwrap();
        assert_eq!(outcome.action, Action::Steady);
    }

    #[tokio::test]
    async fn test_setup_resolves_zone_and_network() {
        let cloud = Arc::new(
            FakeCloud::new("ap-guangzhou")
                .with_zone("ap-guangzhou-3", Some(0.2))
                .with_zone("ap-guangzhou-6", Some(0.1)),
        );
        let mut registry = ClientRegistry::new();
        registry.insert(cloud.clone());
        let mut spec = spec(1, false);
        spec.instance.subnet.cidr_block = "10.0.n.0/24".to_string();

        let reconciler =
            FleetReconciler::setup(spec, &defaults(), &registry, Arc::new(FakeShell::new()))
                .await
                .unwrap();
        assert_eq!(reconciler.zone().zone, "ap-guangzhou-6");
        assert!(cloud.calls().contains(&"create_subnet:10.0.6.0/24".to_string()));

        reconciler
            .reconcile_once(&CancellationToken::new())
            .await
            .unwrap();
        let created = cloud.instances();
        assert_eq!(created[0].record.zone, "ap-guangzhou-6");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_on_interval_until_cancelled() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        let mut spec = spec(0, false);
        spec.auto_maintenance.check_interval = 60;
        let reconciler = reconciler(spec, &cloud, &FakeShell::new());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(reconciler.run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();
        handle.await.unwrap();

        // t=0, t=60, t=120
        assert_eq!(cloud.call_count("count_instances"), 3);
    }
}
