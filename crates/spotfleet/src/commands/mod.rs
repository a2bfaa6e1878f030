pub mod delete;
pub mod list;
pub mod run;
pub mod validate;

use spotfleet_cloud::ClientRegistry;
use spotfleet_cloud_tencent::Credentials;
use spotfleet_config::Config;

/// Credentials from the configuration (already merged with the environment)
pub fn credentials(config: &Config) -> Credentials {
    Credentials::new(
        &config.tencentcloud.secret_id,
        &config.tencentcloud.secret_key,
    )
}

/// One client per region referenced by any fleet
pub async fn connect(config: &Config) -> anyhow::Result<ClientRegistry> {
    let registry =
        spotfleet_cloud_tencent::build_registry(&credentials(config), &config.regions()).await?;
    Ok(registry)
}
