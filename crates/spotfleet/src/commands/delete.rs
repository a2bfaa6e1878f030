use colored::Colorize;
use spotfleet_config::Config;
use std::collections::{BTreeMap, HashMap};

/// Terminate fleet instances by ID
///
/// Only instances carrying a fleet's membership tag are terminated; any other
/// ID is reported and left alone.
pub async fn handle(config: &Config, ids: &[String]) -> anyhow::Result<()> {
    let registry = super::connect(config).await?;
    let tag_key = &config.tencentcloud.tag_key;

    // instance ID → (region, fleet)
    let mut owners: HashMap<String, (String, String)> = HashMap::new();
    for fleet in &config.instance_managers {
        for region in &fleet.instance.regions {
            let client = registry.get(region)?;
            for instance in client.list_instances(tag_key, &fleet.name).await? {
                owners.insert(instance.id, (region.clone(), fleet.name.clone()));
            }
        }
    }

    let (by_region, unknown) = group_by_region(ids, &owners);

    for id in &unknown {
        println!(
            "{} {} is not a member of any configured fleet",
            "⚠".yellow(),
            id.cyan()
        );
    }

    let mut failed = 0;
    for (region, region_ids) in &by_region {
        let client = registry.get(region)?;
        println!(
            "Terminating {} instance(s) in {}...",
            region_ids.len(),
            region.cyan()
        );
        match client.terminate_instances(region_ids).await {
            Ok(()) => {
                for id in region_ids {
                    let fleet = owners.get(id).map(|(_, f)| f.as_str()).unwrap_or("-");
                    tracing::info!(instance_id = %id, region = %region, fleet = %fleet, "Instance terminated");
                    println!("  {} {} ({})", "✓".green(), id, fleet);
                }
            }
            Err(e) => {
                failed += region_ids.len();
                eprintln!("  {} {}: {}", "✗".red(), region, e);
            }
        }
    }

    if failed > 0 || !unknown.is_empty() {
        anyhow::bail!(
            "{} instance(s) not terminated ({} unknown, {} failed)",
            failed + unknown.len(),
            unknown.len(),
            failed
        );
    }
    Ok(())
}

/// Split `ids` into per-region batches and IDs no fleet owns
fn group_by_region(
    ids: &[String],
    owners: &HashMap<String, (String, String)>,
) -> (BTreeMap<String, Vec<String>>, Vec<String>) {
    let mut by_region: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut unknown = Vec::new();

    for id in ids {
        match owners.get(id) {
            Some((region, _)) => {
                let batch = by_region.entry(region.clone()).or_default();
                if !batch.contains(id) {
                    batch.push(id.clone());
                }
            }
            None => {
                if !unknown.contains(id) {
                    unknown.push(id.clone());
                }
            }
        }
    }
    (by_region, unknown)
}
