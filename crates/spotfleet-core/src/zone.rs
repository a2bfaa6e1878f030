//! Zone price sampling
//!
//! Prices every available zone of the candidate regions once and picks the
//! cheapest. The choice is fixed for the lifetime of a fleet manager.

use crate::error::{FleetError, Result};
use spotfleet_cloud::{ClientRegistry, PriceQuery};

/// What to price in each zone
#[derive(Debug, Clone)]
pub struct PriceRequest {
    pub image_id: String,
    pub instance_type: String,
    pub charge_type: String,
}

/// One sampled zone price
#[derive(Debug, Clone, PartialEq)]
pub struct ZonePrice {
    pub region: String,
    pub zone: String,
    pub price: f64,
}

/// Query the unit price of every available zone, in discovery order
///
/// A zone whose quote fails is logged and left out; failing to enumerate a
/// region's zones fails the whole sample.
pub async fn sample_zone_prices(
    registry: &ClientRegistry,
    regions: &[String],
    request: &PriceRequest,
) -> Result<Vec<ZonePrice>> {
    let mut prices = Vec::new();

    for region in regions {
        let client = registry
            .get(region)
            .map_err(|_| FleetError::MissingRegionClient(region.clone()))?;

        for zone in client.describe_zones().await? {
            if !zone.available {
                tracing::debug!(region = %region, zone = %zone.zone, "Skipping unavailable zone");
                continue;
            }

            let query = PriceQuery {
                zone: zone.zone.clone(),
                image_id: request.image_id.clone(),
                instance_type: request.instance_type.clone(),
                charge_type: request.charge_type.clone(),
            };
            match client.price_quote(&query).await {
                Ok(price) => {
                    tracing::debug!(region = %region, zone = %zone.zone, price, "Sampled zone price");
                    prices.push(ZonePrice {
                        region: region.clone(),
                        zone: zone.zone,
                        price,
                    });
                }
                Err(e) => {
                    tracing::warn!(region = %region, zone = %zone.zone, error = %e, "Price inquiry failed");
                }
            }
        }
    }

    Ok(prices)
}

/// Cheapest entry; ties go to the first one sampled
pub fn cheapest(prices: &[ZonePrice]) -> Option<&ZonePrice> {
    prices.iter().fold(None, |best: Option<&ZonePrice>, candidate| match best {
        Some(b) if b.price <= candidate.price => Some(b),
        _ => Some(candidate),
    })
}

/// Sample all candidate zones and return the global minimum
pub async fn select_zone(
    registry: &ClientRegistry,
    regions: &[String],
    request: &PriceRequest,
) -> Result<ZonePrice> {
    let prices = sample_zone_prices(registry, regions, request).await?;
    let choice = cheapest(&prices)
        .cloned()
        .ok_or_else(|| FleetError::PriceUnavailable {
            regions: regions.join(", "),
        })?;

    tracing::info!(
        region = %choice.region,
        zone = %choice.zone,
        price = choice.price,
        sampled = prices.len(),
        "Selected cheapest zone"
    );
    Ok(choice)
}

/// Numeric suffix of a zone identifier (`ap-guangzhou-3` → 3)
pub fn zone_index(zone: &str) -> Result<u8> {
    zone.rsplit_once('-')
        .and_then(|(_, suffix)| suffix.parse::<u8>().ok())
        .ok_or_else(|| FleetError::InvalidZone(zone.to_string()))
}

/// Substitute the `n` octet of a CIDR template with the zone index
///
/// `10.0.n.0/24` in `ap-guangzhou-3` becomes `10.0.3.0/24`. Templates without
/// a placeholder are returned unchanged.
pub fn subnet_cidr(template: &str, zone: &str) -> Result<String> {
    let (address, prefix) = match template.split_once('/') {
        Some((a, p)) => (a, Some(p)),
        None => (template, None),
    };
    if !address.split('.').any(|octet| octet == "n") {
        return Ok(template.to_string());
    }

    let index = zone_index(zone)?.to_string();
    let address = address
        .split('.')
        .map(|octet| if octet == "n" { index.as_str() } else { octet })
        .collect::<Vec<_>>()
        .join(".");

    Ok(match prefix {
        Some(p) => format!("{address}/{p}"),
        None => address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotfleet_cloud::testing::FakeCloud;
    use std::sync::Arc;

    fn request() -> PriceRequest {
        PriceRequest {
            image_id: "img-487zeit5".to_string(),
            instance_type: "SA2.MEDIUM4".to_string(),
            charge_type: "SPOTPAID".to_string(),
        }
    }

    fn regions(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_select_global_minimum() {
        let mut registry = ClientRegistry::new();
        registry.insert(Arc::new(
            FakeCloud::new("ap-guangzhou")
                .with_zone("ap-guangzhou-3", Some(0.12))
                .with_zone("ap-guangzhou-6", Some(0.09)),
        ));
        registry.insert(Arc::new(
            FakeCloud::new("ap-hongkong")
                .with_zone("ap-hongkong-2", Some(0.05))
                .with_unavailable_zone("ap-hongkong-3", 0.01),
        ));

        let choice = select_zone(&registry, &regions(&["ap-guangzhou", "ap-hongkong"]), &request())
            .await
            .unwrap();
        assert_eq!(choice.zone, "ap-hongkong-2");
        assert_eq!(choice.region, "ap-hongkong");
        assert_eq!(choice.price, 0.05);
    }

    #[tokio::test]
    async fn test_failed_quotes_are_skipped() {
        let cloud = Arc::new(
            FakeCloud::new("ap-guangzhou")
                .with_zone("ap-guangzhou-3", Some(0.2))
                .with_zone("ap-guangzhou-4", Some(0.1)),
        );
        cloud.fail_on("price_quote:ap-guangzhou-4");
        let mut registry = ClientRegistry::new();
        registry.insert(cloud.clone());

        let choice = select_zone(&registry, &regions(&["ap-guangzhou"]), &request())
            .await
            .unwrap();
        assert_eq!(choice.zone, "ap-guangzhou-3");
        assert_eq!(cloud.call_count("price_quote"), 2);
    }

    #[tokio::test]
    async fn test_no_price_anywhere() {
        let mut registry = ClientRegistry::new();
        registry.insert(Arc::new(
            FakeCloud::new("ap-guangzhou").with_zone("ap-guangzhou-3", None),
        ));

        let err = select_zone(&registry, &regions(&["ap-guangzhou"]), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::PriceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_missing_region_client() {
        let registry = ClientRegistry::new();
        let err = select_zone(&registry, &regions(&["eu-frankfurt"]), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::MissingRegionClient(r) if r == "eu-frankfurt"));
    }

    #[tokio::test]
    async fn test_zone_listing_failure_is_fatal() {
        let cloud = Arc::new(FakeCloud::new("ap-guangzhou").with_zone("ap-guangzhou-3", Some(0.1)));
        cloud.fail_on("describe_zones");
        let mut registry = ClientRegistry::new();
        registry.insert(cloud);

        let err = select_zone(&registry, &regions(&["ap-guangzhou"]), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Cloud(_)));
    }

    #[test]
    fn test_cheapest_is_deterministic_on_ties() {
        let prices = vec![
            ZonePrice {
                region: "ap-guangzhou".to_string(),
                zone: "ap-guangzhou-3".to_string(),
                price: 0.1,
            },
            ZonePrice {
                region: "ap-guangzhou".to_string(),
                zone: "ap-guangzhou-4".to_string(),
                price: 0.1,
            },
        ];
        for _ in 0..5 {
            assert_eq!(cheapest(&prices).unwrap().zone, "ap-guangzhou-3");
        }
        assert!(cheapest(&[]).is_none());
    }

    #[test]
    fn test_subnet_cidr() {
        assert_eq!(
            subnet_cidr("10.0.n.0/24", "ap-guangzhou-3").unwrap(),
            "10.0.3.0/24"
        );
        assert_eq!(
            subnet_cidr("172.16.n.0/20", "na-siliconvalley-12").unwrap(),
            "172.16.12.0/20"
        );
        assert_eq!(
            subnet_cidr("10.0.1.0/24", "whatever").unwrap(),
            "10.0.1.0/24"
        );
        assert!(matches!(
            subnet_cidr("10.0.n.0/24", "ap-guangzhou"),
            Err(FleetError::InvalidZone(_))
        ));
    }
}
