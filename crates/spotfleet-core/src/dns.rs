//! DNS record synchronization
//!
//! Waits until the fleet's instances have public IPs, then converges the A
//! records of the bound name: records pointing at IPs outside the fleet are
//! removed first, after which new records are added until `prase_num`
//! distinct fleet IPs are published.

use crate::error::{FleetError, Result};
use crate::state::{FleetSnapshot, FleetStateReader};
use spotfleet_cloud::{A_RECORD, DnsRecord, NewDnsRecord, RegionClient};
use spotfleet_config::DomainBindingConfig;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long to wait for instances to report a public IP
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_secs(5),
        }
    }
}

/// Record changes needed to converge one name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsPlan {
    pub delete: Vec<DnsRecord>,
    /// Unpublished fleet IPs, in IP order, tried until `needed` records exist
    pub create: Vec<String>,
    pub needed: usize,
}

impl DnsPlan {
    pub fn is_empty(&self) -> bool {
        self.delete.is_empty() && self.create.is_empty()
    }
}

/// Outcome of one record synchronization
#[derive(Debug, Clone, Default)]
pub struct DnsSyncReport {
    pub deleted: usize,
    pub created: usize,
    pub failed: usize,
}

/// Compute the record changes for the current fleet IPs
///
/// Stale records (IP not in the fleet) are always deleted. Valid records beyond
/// `limit` are deleted too, so the name never carries more than `limit`
/// records. Every unpublished IP is a creation candidate; only `needed` of
/// them are added.
pub fn plan_dns_changes(
    existing: &[DnsRecord],
    ips: &BTreeMap<String, String>,
    limit: usize,
) -> DnsPlan {
    let mut plan = DnsPlan::default();
    let mut published = HashSet::new();

    for record in existing {
        let keep = ips.contains_key(&record.value)
            && published.len() < limit
            && published.insert(record.value.as_str());
        if !keep {
            plan.delete.push(record.clone());
        }
    }

    plan.needed = limit.saturating_sub(published.len());
    if plan.needed > 0 {
        plan.create = ips
            .keys()
            .filter(|ip| !published.contains(ip.as_str()))
            .cloned()
            .collect();
    }
    plan
}

/// Keeps one fleet's DNS name in sync with its instances
#[derive(Clone)]
pub struct DnsSynchronizer {
    client: Arc<dyn RegionClient>,
    reader: FleetStateReader,
    poll: PollConfig,
}

impl DnsSynchronizer {
    pub fn new(client: Arc<dyn RegionClient>, reader: FleetStateReader, poll: PollConfig) -> Self {
        Self {
            client,
            reader,
            poll,
        }
    }

    /// Poll until at least `desired` instances have a public IP
    ///
    /// Returns the public IP → instance ID map of the last snapshot.
    pub async fn wait_for_ips(
        &self,
        desired: usize,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, String>> {
        let mut last = FleetSnapshot::default();

        for attempt in 0..self.poll.attempts {
            match self.reader.snapshot().await {
                Ok(snapshot) => {
                    if snapshot.ready_count() >= desired {
                        return Ok(snapshot.ip_map());
                    }
                    tracing::debug!(
                        attempt = attempt + 1,
                        ready = snapshot.ready_count(),
                        desired,
                        "Waiting for public IPs"
                    );
                    last = snapshot;
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "Failed to read fleet state");
                }
            }

            if attempt + 1 < self.poll.attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(FleetError::Cancelled),
                    _ = tokio::time::sleep(self.poll.interval) => {}
                }
            }
        }

        Err(FleetError::ProvisioningTimeout {
            ready: last.ready_count(),
            desired,
            attempts: self.poll.attempts,
        })
    }

    /// Converge the bound name's A records onto `ips`
    ///
    /// Individual add/delete failures are logged and counted; failing to list
    /// the existing records aborts before any mutation.
    pub async fn sync_records(
        &self,
        binding: &DomainBindingConfig,
        ips: &BTreeMap<String, String>,
    ) -> Result<DnsSyncReport> {
        let existing: Vec<DnsRecord> = self
            .client
            .list_records(&binding.domain, &binding.subdomain)
            .await?
            .into_iter()
            .filter(|r| r.record_type == A_RECORD)
            .collect();

        let plan = plan_dns_changes(&existing, ips, binding.prase_num);
        let mut report = DnsSyncReport::default();
        if plan.is_empty() {
            tracing::debug!(name = %binding.fqdn(), records = existing.len(), "DNS records up to date");
            return Ok(report);
        }

        for record in &plan.delete {
            match self.client.delete_record(&binding.domain, record.id).await {
                Ok(()) => {
                    report.deleted += 1;
                    tracing::info!(name = %binding.fqdn(), ip = %record.value, record_id = record.id, "Deleted DNS record");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(name = %binding.fqdn(), ip = %record.value, record_id = record.id, error = %e, "Failed to delete DNS record");
                }
            }
        }

        // A failed add moves on to the next candidate
        for ip in &plan.create {
            if report.created >= plan.needed {
                break;
            }
            let record = NewDnsRecord {
                domain: binding.domain.clone(),
                subdomain: binding.subdomain.clone(),
                record_type: A_RECORD.to_string(),
                record_line: binding.record_line.clone(),
                value: ip.clone(),
                ttl: binding.ttl,
            };
            match self.client.create_record(&record).await {
                Ok(record_id) => {
                    report.created += 1;
                    tracing::info!(
                        name = %binding.fqdn(),
                        ip = %ip,
                        instance_id = %ips.get(ip).map(String::as_str).unwrap_or_default(),
                        record_id,
                        "Added DNS record"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(name = %binding.fqdn(), ip = %ip, error = %e, "Failed to add DNS record");
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotfleet_cloud::testing::FakeCloud;

    fn record(id: u64, ip: &str) -> DnsRecord {
        DnsRecord {
            id,
            value: ip.to_string(),
            record_type: A_RECORD.to_string(),
        }
    }

    fn ips(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(ip, id)| (ip.to_string(), id.to_string()))
            .collect()
    }

    fn binding(limit: usize) -> DomainBindingConfig {
        DomainBindingConfig {
            enabled: true,
            domain: "example.com".to_string(),
            subdomain: "www".to_string(),
            prase_num: limit,
            ..Default::default()
        }
    }

    fn synchronizer(cloud: &Arc<FakeCloud>, poll: PollConfig) -> DnsSynchronizer {
        let reader = FleetStateReader::new(cloud.clone(), "spotfleet", "web");
        DnsSynchronizer::new(cloud.clone(), reader, poll)
    }

    fn fast_poll(attempts: u32) -> PollConfig {
        PollConfig {
            attempts,
            interval: Duration::ZERO,
        }
    }

    #[test]
    fn test_plan_removes_stale_and_fills_quota() {
        let existing = vec![record(1, "9.9.9.9"), record(2, "1.1.1.1")];
        let plan = plan_dns_changes(
            &existing,
            &ips(&[("1.1.1.1", "ins-1"), ("2.2.2.2", "ins-2"), ("3.3.3.3", "ins-3")]),
            2,
        );
        assert_eq!(plan.delete, vec![record(1, "9.9.9.9")]);
        assert_eq!(plan.create, vec!["2.2.2.2", "3.3.3.3"]);
        assert_eq!(plan.needed, 1);
    }

    #[test]
    fn test_plan_never_exceeds_limit() {
        let existing = vec![record(1, "1.1.1.1"), record(2, "2.2.2.2"), record(3, "2.2.2.2")];
        let plan = plan_dns_changes(
            &existing,
            &ips(&[("1.1.1.1", "ins-1"), ("2.2.2.2", "ins-2")]),
            1,
        );
        assert_eq!(plan.delete, vec![record(2, "2.2.2.2"), record(3, "2.2.2.2")]);
        assert!(plan.create.is_empty());
        assert_eq!(plan.needed, 0);
    }

    #[test]
    fn test_plan_in_sync_is_empty() {
        let existing = vec![record(1, "1.1.1.1"), record(2, "2.2.2.2")];
        let plan = plan_dns_changes(
            &existing,
            &ips(&[("1.1.1.1", "ins-1"), ("2.2.2.2", "ins-2")]),
            2,
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_empty_fleet_removes_everything() {
        let existing = vec![record(1, "1.1.1.1")];
        let plan = plan_dns_changes(&existing, &BTreeMap::new(), 3);
        assert_eq!(plan.delete.len(), 1);
        assert!(plan.create.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_ips_ready() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.add_instance("ins-1", &["1.1.1.1"], &[("spotfleet", "web")]);
        cloud.add_instance("ins-2", &["2.2.2.2"], &[("spotfleet", "web")]);

        let map = synchronizer(&cloud, fast_poll(3))
            .wait_for_ips(2, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(map, ips(&[("1.1.1.1", "ins-1"), ("2.2.2.2", "ins-2")]));
        assert_eq!(cloud.call_count("list_instances"), 1);
    }

    #[tokio::test]
    async fn test_wait_for_ips_timeout() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.add_instance("ins-1", &["1.1.1.1"], &[("spotfleet", "web")]);
        cloud.add_instance("ins-2", &[], &[("spotfleet", "web")]);

        let err = synchronizer(&cloud, fast_poll(4))
            .wait_for_ips(2, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            FleetError::ProvisioningTimeout {
                ready,
                desired,
                attempts,
            } => {
                assert_eq!((ready, desired, attempts), (1, 2, 4));
            }
            other => panic!("Expected ProvisioningTimeout, got {other:?}"),
        }
        assert_eq!(cloud.call_count("list_instances"), 4);
    }

    #[tokio::test]
    async fn test_wait_for_ips_cancelled() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.add_instance("ins-1", &[], &[("spotfleet", "web")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let poll = PollConfig {
            attempts: 10,
            interval: Duration::from_secs(3600),
        };
        let err = synchronizer(&cloud, poll)
            .wait_for_ips(1, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Cancelled));
    }

    #[tokio::test]
    async fn test_sync_records_converges() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.add_record("example.com", "www", 1, "9.9.9.9");
        cloud.add_record("example.com", "www", 2, "1.1.1.1");

        let report = synchronizer(&cloud, fast_poll(1))
            .sync_records(
                &binding(2),
                &ips(&[("1.1.1.1", "ins-1"), ("2.2.2.2", "ins-2"), ("3.3.3.3", "ins-3")]),
            )
            .await
            .unwrap();

        assert_eq!((report.deleted, report.created, report.failed), (1, 1, 0));
        assert_eq!(
            cloud.record_values("example.com", "www"),
            vec!["1.1.1.1", "2.2.2.2"]
        );

        // Deletions happen before additions
        let calls = cloud.calls();
        let delete = calls.iter().position(|c| c == "delete_record:1").unwrap();
        let create = calls.iter().position(|c| c == "create_record:2.2.2.2").unwrap();
        assert!(delete < create);
    }

    #[tokio::test]
    async fn test_sync_records_partial_failure() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.fail_on("create_record:1.1.1.1");

        let report = synchronizer(&cloud, fast_poll(1))
            .sync_records(&binding(2), &ips(&[("1.1.1.1", "ins-1"), ("2.2.2.2", "ins-2")]))
            .await
            .unwrap();
        assert_eq!((report.created, report.failed), (1, 1));
        assert_eq!(cloud.record_values("example.com", "www"), vec!["2.2.2.2"]);
    }

    #[tokio::test]
    async fn test_sync_records_failed_add_tries_next_ip() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.fail_on("create_record:1.1.1.1");

        let report = synchronizer(&cloud, fast_poll(1))
            .sync_records(&binding(1), &ips(&[("1.1.1.1", "ins-1"), ("2.2.2.2", "ins-2")]))
            .await
            .unwrap();
        assert_eq!((report.created, report.failed), (1, 1));
        assert_eq!(cloud.record_values("example.com", "www"), vec!["2.2.2.2"]);
    }

    #[tokio::test]
    async fn test_sync_records_stops_once_quota_is_met() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));

        let report = synchronizer(&cloud, fast_poll(1))
            .sync_records(
                &binding(2),
                &ips(&[("1.1.1.1", "ins-1"), ("2.2.2.2", "ins-2"), ("3.3.3.3", "ins-3")]),
            )
            .await
            .unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(cloud.call_count("create_record"), 2);
        assert_eq!(
            cloud.record_values("example.com", "www"),
            vec!["1.1.1.1", "2.2.2.2"]
        );
    }

    #[tokio::test]
    async fn test_sync_records_always_writes_a_records() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        let mut binding = binding(1);
        binding.record_type = "a".to_string();
        let sync = synchronizer(&cloud, fast_poll(1));
        let fleet = ips(&[("1.1.1.1", "ins-1")]);

        for _ in 0..3 {
            sync.sync_records(&binding, &fleet).await.unwrap();
        }
        assert_eq!(cloud.record_values("example.com", "www"), vec!["1.1.1.1"]);
        assert_eq!(cloud.call_count("create_record"), 1);
    }

    #[tokio::test]
    async fn test_sync_records_listing_failure_skips_mutation() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.fail_on("list_records");

        let result = synchronizer(&cloud, fast_poll(1))
            .sync_records(&binding(1), &ips(&[("1.1.1.1", "ins-1")]))
            .await;
        assert!(result.is_err());
        assert_eq!(cloud.call_count("create_record"), 0);
    }
}
