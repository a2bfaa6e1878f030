#![allow(deprecated)] // TODO: migrate Command::cargo_bin to cargo_bin_cmd!

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

const VALID_CONFIG: &str = r#"
tencentcloud:
  secret_id: test-id
  secret_key: test-key
instance_managers:
  - name: web
    instance:
      regions: [ap-guangzhou]
      image_id: img-487zeit5
      instance_type: SA2.MEDIUM4
    domain_binding:
      enabled: true
      domain: example.com
      subdomain: www
      prase_num: 2
    auto_maintenance:
      enabled: true
      check_interval: 60
      desired_count: 3
"#;

fn spotfleet() -> Command {
    let mut cmd = Command::cargo_bin("spotfleet").unwrap();
    cmd.env_remove("SPOTFLEET_CONFIG")
        .env_remove("TENCENTCLOUD_SECRET_ID")
        .env_remove("TENCENTCLOUD_SECRET_KEY");
    cmd
}

#[test]
fn test_cli_help() {
    spotfleet()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cheapest zone"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("delete"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_cli_version() {
    spotfleet()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("spotfleet"));
}

#[test]
fn test_delete_requires_ids() {
    spotfleet()
        .arg("delete")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<IDS>"));
}

#[test]
fn test_validate_valid_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, VALID_CONFIG).unwrap();

    spotfleet()
        .arg("validate")
        .arg("--config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("web"))
        .stdout(predicate::str::contains("www.example.com"));
}

#[test]
fn test_validate_discovers_config_in_cwd() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("config.yaml"), VALID_CONFIG).unwrap();

    spotfleet()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_validate_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(
        &path,
        r#"
instance_managers:
  - name: web
    instance:
      regions: [ap-guangzhou]
      image_id: img-487zeit5
  - name: web
    instance:
      regions: [ap-hongkong]
      image_id: img-487zeit5
"#,
    )
    .unwrap();

    spotfleet()
        .arg("validate")
        .arg("--config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate instance manager name"));
}

#[test]
fn test_malformed_yaml_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    fs::write(&path, "instance_managers: [unterminated").unwrap();

    spotfleet()
        .arg("validate")
        .arg("--config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken.yaml"));
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();

    spotfleet()
        .current_dir(dir.path())
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join(".config"))
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"));
}
