//! Manager group scheduler
//!
//! Sets up one reconciler per maintained fleet, then runs each on its own
//! task until the shared cancellation token fires.

use crate::error::{FleetError, Result};
use crate::reconciler::{FleetDefaults, FleetReconciler};
use spotfleet_cloud::{ClientRegistry, RemoteShell, RetryConfig};
use spotfleet_config::{Config, FleetSpec};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Reconcilers of every fleet that could be set up
pub struct ManagerGroup {
    reconcilers: Vec<FleetReconciler>,
}

impl ManagerGroup {
    /// Set up every fleet with auto-maintenance enabled
    ///
    /// A fleet whose setup keeps failing after `retry` is skipped; the group
    /// fails only when no fleet could be set up at all.
    pub async fn build(
        config: &Config,
        defaults: &FleetDefaults,
        registry: &ClientRegistry,
        shell: Arc<dyn RemoteShell>,
        retry: &RetryConfig,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let mut reconcilers = Vec::new();

        for spec in config.maintained_fleets() {
            match setup_with_retry(spec, defaults, registry, shell.clone(), retry, cancel).await {
                Ok(reconciler) => {
                    tracing::info!(
                        fleet = %spec.name,
                        region = %reconciler.zone().region,
                        zone = %reconciler.zone().zone,
                        price = reconciler.zone().price,
                        "Fleet manager ready"
                    );
                    reconcilers.push(reconciler);
                }
                Err(FleetError::Cancelled) => return Err(FleetError::Cancelled),
                Err(e) => {
                    tracing::error!(fleet = %spec.name, error = %e, "Fleet setup failed; skipping fleet");
                }
            }
        }

        if reconcilers.is_empty() {
            return Err(FleetError::NoActiveFleets);
        }
        Ok(Self { reconcilers })
    }

    pub fn from_reconcilers(reconcilers: Vec<FleetReconciler>) -> Self {
        Self { reconcilers }
    }

    pub fn len(&self) -> usize {
        self.reconcilers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reconcilers.is_empty()
    }

    pub fn fleet_names(&self) -> Vec<&str> {
        self.reconcilers.iter().map(FleetReconciler::name).collect()
    }

    /// Run every fleet until `cancel` fires, then wait for all of them
    pub async fn run(self, cancel: CancellationToken) {
        let mut tasks = JoinSet::new();
        for reconciler in self.reconcilers {
            tasks.spawn(reconciler.run(cancel.clone()));
        }
        tracing::info!(fleets = tasks.len(), "Manager group running");

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Fleet task ended abnormally");
            }
        }
        tracing::info!("Manager group stopped");
    }
}

async fn setup_with_retry(
    spec: &FleetSpec,
    defaults: &FleetDefaults,
    registry: &ClientRegistry,
    shell: Arc<dyn RemoteShell>,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<FleetReconciler> {
    let attempts = retry.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match FleetReconciler::setup(spec.clone(), defaults, registry, shell.clone()).await {
            Ok(reconciler) => return Ok(reconciler),
            Err(e) if attempt + 1 >= attempts => return Err(e),
            Err(e) => {
                let delay = retry.delay_for_attempt(attempt);
                tracing::warn!(
                    fleet = %spec.name,
                    attempt = attempt + 1,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Fleet setup failed; retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(FleetError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
        attempt += 1;
    }
}
