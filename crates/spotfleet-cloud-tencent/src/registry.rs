//! Client registry construction

use crate::error::{Result, TencentError};
use crate::provider::TencentCloudClient;
use crate::tccli::{Credentials, Tccli};
use crate::types::GetUserAppIdResponse;
use serde_json::Value;
use spotfleet_cloud::ClientRegistry;
use std::sync::Arc;

/// Look up the account id (UIN) of the credentials' owner
pub async fn discover_uin(credentials: &Credentials, region: &str) -> Result<String> {
    let tccli = Tccli::new(region, credentials.clone());
    let resp: GetUserAppIdResponse = tccli.call("cam", "GetUserAppId", Value::Null).await?;
    if resp.uin.is_empty() {
        return Err(TencentError::invalid("GetUserAppId", "empty Uin"));
    }
    Ok(resp.uin)
}

/// Build one client per region
///
/// The account id is resolved once here, before any fleet starts.
pub async fn build_registry(credentials: &Credentials, regions: &[String]) -> Result<ClientRegistry> {
    let mut registry = ClientRegistry::new();
    let Some(first) = regions.first() else {
        return Ok(registry);
    };

    Tccli::check_installed().await?;
    let uin = discover_uin(credentials, first).await?;
    tracing::info!(uin = %uin, regions = regions.len(), "Resolved Tencent Cloud account");

    for region in regions {
        registry.insert(Arc::new(TencentCloudClient::new(
            region.as_str(),
            credentials.clone(),
            uin.as_str(),
        )));
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_regions_needs_no_cli() {
        let registry = build_registry(&Credentials::default(), &[]).await.unwrap();
        assert!(registry.is_empty());
    }
}
