use colored::{ColoredString, Colorize};
use spotfleet_cloud::{InstanceRecord, InstanceState};
use spotfleet_config::{Config, FleetSpec};

pub async fn handle(config: &Config, only: Option<&str>) -> anyhow::Result<()> {
    let fleets: Vec<&FleetSpec> = config
        .instance_managers
        .iter()
        .filter(|f| only.is_none_or(|name| f.name == name))
        .collect();
    if fleets.is_empty() {
        match only {
            Some(name) => anyhow::bail!("Instance manager '{}' not found", name),
            None => {
                println!("{}", "No instance managers configured".dimmed());
                return Ok(());
            }
        }
    }

    println!("{}", "Fetching fleet instances...".blue());
    let registry = super::connect(config).await?;
    let tag_key = &config.tencentcloud.tag_key;

    for fleet in fleets {
        let mut instances = Vec::new();
        for region in &fleet.instance.regions {
            let client = registry.get(region)?;
            instances.extend(client.list_instances(tag_key, &fleet.name).await?);
        }

        println!();
        println!(
            "{} {} ({} instance(s), desired {})",
            "Fleet".bold(),
            fleet.name.cyan().bold(),
            instances.len(),
            fleet.auto_maintenance.desired_count
        );
        print_table(&instances, &bound_domain(fleet));
    }

    Ok(())
}

/// Value of the domain tag written at launch, if any
fn bound_domain(fleet: &FleetSpec) -> String {
    let binding = &fleet.domain_binding;
    if binding.tag_key.is_empty() || binding.domain.is_empty() {
        "-".to_string()
    } else {
        binding.fqdn()
    }
}

fn print_table(instances: &[InstanceRecord], domain: &str) {
    if instances.is_empty() {
        println!("  {}", "No instances".dimmed());
        return;
    }

    println!(
        "{}",
        format!(
            "{:<14} {:<18} {:<32} {:<24} {:<16} {:<14}",
            "ID", "ZONE", "PUBLIC IP", "DOMAIN", "TYPE", "STATE"
        )
        .bold()
    );
    println!("{}", "─".repeat(123).dimmed());

    for instance in instances {
        let ips = if instance.public_ips.is_empty() {
            "-".to_string()
        } else {
            instance.public_ips.join(", ")
        };
        println!(
            "{:<14} {:<18} {:<32} {:<24} {:<16} {:<14}",
            instance.id.cyan(),
            instance.zone,
            ips,
            domain,
            instance.instance_type,
            state_colored(&instance.state)
        );
    }
}

fn state_colored(state: &InstanceState) -> ColoredString {
    let text = state.to_string();
    match state {
        InstanceState::Running => text.green(),
        _ if state.is_alive() => text.yellow(),
        _ => text.red(),
    }
}
