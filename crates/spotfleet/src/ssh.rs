//! Password-authenticated remote sessions over `ssh` / `scp`
//!
//! The password reaches `sshpass` through the `SSHPASS` environment
//! variable and never appears on a command line.

use async_trait::async_trait;
use spotfleet_cloud::{CloudError, RemoteSession, RemoteShell, RemoteTarget, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Opens sessions through the system `sshpass`, `ssh` and `scp` binaries
#[derive(Debug, Clone, Default)]
pub struct SshShell;

impl SshShell {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn connect(&self, target: &RemoteTarget) -> Result<Box<dyn RemoteSession>> {
        let session = SshSession {
            target: target.clone(),
        };
        // Freshly created instances may not accept logins yet
        session.run("ssh", session.ssh_args("true")).await?;
        tracing::debug!(host = %target.host, user = %target.username, "SSH session opened");
        Ok(Box::new(session))
    }
}

struct SshSession {
    target: RemoteTarget,
}

impl SshSession {
    fn destination(&self) -> String {
        format!("{}@{}", self.target.username, self.target.host)
    }

    fn common_options() -> Vec<String> {
        [
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "LogLevel=ERROR",
        ]
        .into_iter()
        .map(String::from)
        .chain([
            "-o".to_string(),
            format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}"),
        ])
        .collect()
    }

    fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Self::common_options();
        args.push("-p".to_string());
        args.push(self.target.port.to_string());
        args.push(self.destination());
        args.push(command.to_string());
        args
    }

    fn scp_args(&self, local_path: &Path, remote_path: &str) -> Vec<String> {
        let mut args = Self::common_options();
        args.push("-P".to_string());
        args.push(self.target.port.to_string());
        args.push("-r".to_string());
        args.push(local_path.display().to_string());
        args.push(format!("{}:{}", self.destination(), remote_path));
        args
    }

    /// Run `program` under `sshpass`, returning combined stdout/stderr
    async fn run(&self, program: &str, args: Vec<String>) -> Result<String> {
        let host = &self.target.host;
        let output = Command::new("sshpass")
            .arg("-e")
            .arg(program)
            .args(&args)
            .env("SSHPASS", &self.target.password)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CloudError::remote(host, "sshpass not found. Please install sshpass")
                } else {
                    CloudError::Io(e)
                }
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            Err(CloudError::remote(
                host,
                format!("{} failed ({}): {}", program, output.status, combined.trim()),
            ))
        }
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<()> {
        if let Some(parent) = remote_parent(remote_path) {
            let mkdir = format!("mkdir -p {}", shell_quote(parent));
            self.run("ssh", self.ssh_args(&mkdir)).await?;
        }
        self.run("scp", self.scp_args(local_path, remote_path))
            .await
            .map(|_| ())
    }

    async fn exec(&mut self, command: &str) -> Result<String> {
        self.run("ssh", self.ssh_args(command)).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        // Every command runs on its own connection
        Ok(())
    }
}

fn remote_parent(remote_path: &str) -> Option<&str> {
    let trimmed = remote_path.trim_end_matches('/');
    let parent = Path::new(trimmed).parent()?.to_str()?;
    match parent {
        "" | "/" => None,
        p => Some(p),
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
