//! One-time instance initialization
//!
//! An instance is initialized at most once: the init flag tag is written only
//! after every enabled step succeeded, and instances that carry it are never
//! contacted again. The tag is the only record of completion, so restarts
//! behave exactly like the next tick.

use crate::error::{FleetError, Result};
use spotfleet_cloud::{CloudError, RegionClient, RemoteSession, RemoteShell, RemoteTarget, Tag};
use spotfleet_config::{FeatureConfig, UserConfig};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

pub const SSH_PORT: u16 = 22;

/// Outcome of one initialization pass
#[derive(Debug, Clone, Default)]
pub struct InitReport {
    /// Instances initialized and tagged in this pass
    pub initialized: Vec<String>,

    /// Instances skipped because they already carry the flag
    pub already_done: usize,

    /// Instances whose initialization failed, with the reason
    pub failed: Vec<(String, String)>,
}

/// Runs the configured file transfer / command once per instance
#[derive(Clone)]
pub struct Initializer {
    client: Arc<dyn RegionClient>,
    shell: Arc<dyn RemoteShell>,
    init_flag: Tag,
    features: FeatureConfig,
    user: UserConfig,
    port: u16,
}

impl Initializer {
    pub fn new(
        client: Arc<dyn RegionClient>,
        shell: Arc<dyn RemoteShell>,
        init_flag: Tag,
        features: FeatureConfig,
        user: UserConfig,
    ) -> Self {
        Self {
            client,
            shell,
            init_flag,
            features,
            user,
            port: SSH_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.features.any_enabled()
    }

    /// Initialize every instance in `ips` (public IP → instance ID) that has
    /// not been initialized yet
    ///
    /// Fails only when the set of initialized instances cannot be read;
    /// per-instance failures are reported and retried on a later tick.
    pub async fn run(&self, ips: &BTreeMap<String, String>) -> Result<InitReport> {
        let mut report = InitReport::default();
        if !self.is_enabled() || ips.is_empty() {
            return Ok(report);
        }

        let region = self.client.region();
        let done: HashSet<String> = self
            .client
            .find_resources_by_tag(&self.init_flag.key, Some(&self.init_flag.value))
            .await?
            .into_iter()
            .filter(|r| r.is_instance_in(region))
            .map(|r| r.resource_id)
            .collect();

        let mut seen = HashSet::new();
        for (ip, instance_id) in ips {
            if !seen.insert(instance_id.as_str()) {
                continue;
            }
            if done.contains(instance_id) {
                report.already_done += 1;
                continue;
            }

            match self.initialize(ip, instance_id).await {
                Ok(()) => {
                    tracing::info!(instance_id = %instance_id, host = %ip, "Instance initialized");
                    report.initialized.push(instance_id.clone());
                }
                Err(e) => {
                    tracing::error!(instance_id = %instance_id, host = %ip, error = %e, "Instance initialization failed");
                    report.failed.push((instance_id.clone(), e.to_string()));
                }
            }
        }

        Ok(report)
    }

    async fn initialize(&self, host: &str, instance_id: &str) -> Result<()> {
        let remote = |source: CloudError| FleetError::Remote {
            instance_id: instance_id.to_string(),
            host: host.to_string(),
            source,
        };

        let target = RemoteTarget::new(host, self.port, &self.user.username, &self.user.password);
        let mut session = self.shell.connect(&target).await.map_err(remote)?;
        let outcome = self.run_steps(session.as_mut(), host).await;
        if let Err(e) = session.close().await {
            tracing::debug!(host = %host, error = %e, "Failed to close remote session");
        }
        outcome.map_err(remote)?;

        self.client
            .add_instance_tag(&self.init_flag, instance_id)
            .await
            .map_err(remote)
    }

    async fn run_steps(
        &self,
        session: &mut dyn RemoteSession,
        host: &str,
    ) -> spotfleet_cloud::Result<()> {
        let transfer = &self.features.file_transfer;
        if transfer.enabled {
            session
                .upload(&transfer.local_path, &transfer.remote_path)
                .await?;
            tracing::info!(
                host = %host,
                local = %transfer.local_path.display(),
                remote = %transfer.remote_path,
                "Uploaded files"
            );
        }

        let exec = &self.features.command_exec;
        if exec.enabled {
            let output = session.exec(&exec.command).await?;
            for line in output.lines().filter(|l| !l.trim().is_empty()) {
                tracing::info!(host = %host, "{}", line);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotfleet_cloud::testing::{FakeCloud, FakeShell};
    use std::path::PathBuf;

    fn features(upload: bool, exec: bool) -> FeatureConfig {
        let mut features = FeatureConfig::default();
        features.file_transfer.enabled = upload;
        features.file_transfer.local_path = PathBuf::from("./dist");
        features.file_transfer.remote_path = "/opt/app".to_string();
        features.command_exec.enabled = exec;
        features.command_exec.command = "sh /opt/app/install.sh".to_string();
        features
    }

    fn initializer(cloud: &Arc<FakeCloud>, shell: &FakeShell, features: FeatureConfig) -> Initializer {
        Initializer::new(
            cloud.clone(),
            Arc::new(shell.clone()),
            Tag::new("exec", "true"),
            features,
            UserConfig {
                username: "root".to_string(),
                password: "Passw0rd!".to_string(),
            },
        )
    }

    fn ips(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(ip, id)| (ip.to_string(), id.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_initializes_and_tags_new_instances() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.add_instance("ins-1", &["1.1.1.1"], &[("spotfleet", "web")]);
        let shell = FakeShell::new();

        let report = initializer(&cloud, &shell, features(true, true))
            .run(&ips(&[("1.1.1.1", "ins-1")]))
            .await
            .unwrap();

        assert_eq!(report.initialized, vec!["ins-1"]);
        assert_eq!(shell.connects(), vec!["1.1.1.1"]);
        assert_eq!(
            shell.uploads(),
            vec![("1.1.1.1".to_string(), "./dist:/opt/app".to_string())]
        );
        assert_eq!(
            shell.commands(),
            vec![("1.1.1.1".to_string(), "sh /opt/app/install.sh".to_string())]
        );
        assert_eq!(shell.closes(), vec!["1.1.1.1"]);
        assert_eq!(
            cloud.instance_tags("ins-1").unwrap().get("exec").map(String::as_str),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_tagged_instances_are_never_contacted() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.add_instance("ins-1", &["1.1.1.1"], &[("spotfleet", "web"), ("exec", "true")]);
        let shell = FakeShell::new();

        let report = initializer(&cloud, &shell, features(true, true))
            .run(&ips(&[("1.1.1.1", "ins-1")]))
            .await
            .unwrap();

        assert_eq!(report.already_done, 1);
        assert!(report.initialized.is_empty());
        assert!(shell.connects().is_empty());
        assert_eq!(cloud.call_count("add_instance_tag"), 0);
    }

    #[tokio::test]
    async fn test_failed_step_leaves_instance_untagged() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.add_instance("ins-1", &["1.1.1.1"], &[]);
        cloud.add_instance("ins-2", &["2.2.2.2"], &[]);
        let shell = FakeShell::new();
        shell.fail_on("exec:1.1.1.1");

        let report = initializer(&cloud, &shell, features(false, true))
            .run(&ips(&[("1.1.1.1", "ins-1"), ("2.2.2.2", "ins-2")]))
            .await
            .unwrap();

        assert_eq!(report.initialized, vec!["ins-2"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "ins-1");
        assert!(!cloud.instance_tags("ins-1").unwrap().contains_key("exec"));
        assert!(cloud.instance_tags("ins-2").unwrap().contains_key("exec"));
        // The session is closed even when a step fails
        assert_eq!(shell.closes(), vec!["1.1.1.1", "2.2.2.2"]);
    }

    #[tokio::test]
    async fn test_connection_failure_is_retried_next_pass() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.add_instance("ins-1", &["1.1.1.1"], &[]);
        let shell = FakeShell::new();
        shell.fail_on("connect:1.1.1.1");
        let init = initializer(&cloud, &shell, features(true, false));

        let first = init.run(&ips(&[("1.1.1.1", "ins-1")])).await.unwrap();
        assert_eq!(first.failed.len(), 1);
        assert!(shell.uploads().is_empty());

        let healthy = FakeShell::new();
        let init = initializer(&cloud, &healthy, features(true, false));
        let second = init.run(&ips(&[("1.1.1.1", "ins-1")])).await.unwrap();
        assert_eq!(second.initialized, vec!["ins-1"]);
    }

    #[tokio::test]
    async fn test_instance_with_two_ips_is_initialized_once() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.add_instance("ins-1", &["1.1.1.1", "1.1.1.2"], &[]);
        let shell = FakeShell::new();

        let report = initializer(&cloud, &shell, features(false, true))
            .run(&ips(&[("1.1.1.1", "ins-1"), ("1.1.1.2", "ins-1")]))
            .await
            .unwrap();
        assert_eq!(report.initialized, vec!["ins-1"]);
        assert_eq!(shell.connects().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_features_do_nothing() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        let shell = FakeShell::new();

        let report = initializer(&cloud, &shell, features(false, false))
            .run(&ips(&[("1.1.1.1", "ins-1")]))
            .await
            .unwrap();
        assert!(report.initialized.is_empty());
        assert!(cloud.calls().is_empty());
        assert!(shell.connects().is_empty());
    }

    #[tokio::test]
    async fn test_tag_lookup_failure_fails_the_pass() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou"));
        cloud.add_instance("ins-1", &["1.1.1.1"], &[]);
        cloud.fail_on("find_resources_by_tag");
        let shell = FakeShell::new();

        let result = initializer(&cloud, &shell, features(false, true))
            .run(&ips(&[("1.1.1.1", "ins-1")]))
            .await;
        assert!(result.is_err());
        assert!(shell.connects().is_empty());
    }
}
