use colored::Colorize;
use spotfleet_config::Config;
use std::path::Path;

pub fn handle(path: &Path, config: &Config) -> anyhow::Result<()> {
    println!("{}", "Validating configuration...".blue());
    println!("File: {}", path.display().to_string().cyan());

    if let Err(e) = config.validate() {
        eprintln!();
        eprintln!("{}", "✗ Configuration error".red().bold());
        eprintln!("  {}", e);
        std::process::exit(1);
    }

    println!("{}", "✓ Configuration is valid".green().bold());
    println!();
    println!("Summary:");
    println!("  Tag key: {}", config.tencentcloud.tag_key);
    println!("  Instance managers: {}", config.instance_managers.len());
    for fleet in &config.instance_managers {
        let maintenance = &fleet.auto_maintenance;
        let mode = if maintenance.enabled {
            format!(
                "desired {}, every {}s",
                maintenance.desired_count, maintenance.check_interval
            )
        } else {
            "maintenance off".to_string()
        };
        println!(
            "    - {} ({}) [{}]",
            fleet.name.cyan(),
            fleet.instance.regions.join(", "),
            mode
        );
        if fleet.domain_binding.enabled {
            println!(
                "      domain: {} (up to {} record(s))",
                fleet.domain_binding.fqdn(),
                fleet.domain_binding.prase_num
            );
        }
    }

    Ok(())
}
