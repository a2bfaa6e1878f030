//! Remote execution collaborator
//!
//! Password-authenticated sessions used for one-time instance initialization.

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Connection parameters of a remote host
#[derive(Clone)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl RemoteTarget {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for RemoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Opens sessions to remote hosts
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn connect(&self, target: &RemoteTarget) -> Result<Box<dyn RemoteSession>>;
}

/// An open session on one host
#[async_trait]
pub trait RemoteSession: Send {
    /// Copy a local file or directory to `remote_path`
    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Run `command`, returning combined stdout/stderr
    async fn exec(&mut self, command: &str) -> Result<String>;

    async fn close(self: Box<Self>) -> Result<()>;
}
