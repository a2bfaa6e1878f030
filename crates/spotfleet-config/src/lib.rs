pub mod error;
pub mod model;

pub use error::*;
pub use model::*;

use std::path::{Path, PathBuf};

const SECRET_ID_ENV: &str = "TENCENTCLOUD_SECRET_ID";
const SECRET_KEY_ENV: &str = "TENCENTCLOUD_SECRET_KEY";

/// Find the spotfleet configuration file
///
/// Search order:
/// 1. `SPOTFLEET_CONFIG` environment variable (direct path)
/// 2. current directory: config.yaml, config.yml
/// 3. ./.spotfleet/config.yaml
/// 4. ~/.config/spotfleet/config.yaml (global)
pub fn find_config_file() -> Result<PathBuf> {
    // 1. explicit path from the environment
    if let Ok(config_path) = std::env::var("SPOTFLEET_CONFIG") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    // 2. current directory
    for filename in ["config.yaml", "config.yml"] {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. project-local directory
    let local = current_dir.join(".spotfleet").join("config.yaml");
    if local.exists() {
        return Ok(local);
    }

    // 4. global configuration
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("spotfleet").join("config.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Load the configuration from `path`, or from the discovered file
///
/// Credentials from `TENCENTCLOUD_SECRET_ID` / `TENCENTCLOUD_SECRET_KEY`
/// replace the file's values when both are set.
pub fn load(path: Option<&Path>) -> Result<(PathBuf, Config)> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => find_config_file()?,
    };

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let mut config = parse(&content).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    apply_env_credentials(&mut config);

    Ok((path, config))
}

/// Parse configuration YAML without touching the environment
pub fn parse(content: &str) -> std::result::Result<Config, serde_yaml::Error> {
    serde_yaml::from_str(content)
}

fn apply_env_credentials(config: &mut Config) {
    let secret_id = std::env::var(SECRET_ID_ENV).unwrap_or_default();
    let secret_key = std::env::var(SECRET_KEY_ENV).unwrap_or_default();
    let (secret_id, secret_key) = (secret_id.trim(), secret_key.trim());

    if !secret_id.is_empty() && !secret_key.is_empty() {
        config.tencentcloud.secret_id = secret_id.to_string();
        config.tencentcloud.secret_key = secret_key.to_string();
    }
}
