use crate::ssh::SshShell;
use colored::Colorize;
use spotfleet_cloud::{RetryConfig, Tag};
use spotfleet_config::Config;
use spotfleet_core::{FleetDefaults, FleetError, ManagerGroup, PollConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn handle(config: &Config) -> anyhow::Result<()> {
    config.validate()?;
    if config.maintained_fleets().next().is_none() {
        println!(
            "{}",
            "No instance manager has auto_maintenance enabled; nothing to do".yellow()
        );
        return Ok(());
    }

    let registry = super::connect(config).await?;
    let flag = &config.tencentcloud.init_flag;
    let defaults = FleetDefaults {
        tag_key: config.tencentcloud.tag_key.clone(),
        init_flag: Tag::new(&flag.key, &flag.value),
        poll: PollConfig::default(),
    };

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let group = match ManagerGroup::build(
        config,
        &defaults,
        &registry,
        Arc::new(SshShell::new()),
        &RetryConfig::default(),
        &cancel,
    )
    .await
    {
        Ok(group) => group,
        Err(FleetError::Cancelled) => {
            tracing::info!("Interrupted during fleet setup");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(fleets = ?group.fleet_names(), "Starting fleet reconciliation");
    group.run(cancel).await;
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping fleets");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, stopping fleets");
        }
    }
    token.cancel();
}
