//! tccli CLI wrapper
//!
//! Every API action is invoked as
//! `tccli <service> <Action> --region <region> --<Param> <value> ...`.
//! Scalar parameters are passed as-is, structured ones as JSON.

use crate::error::{Result, TencentError};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::process::Stdio;
use tokio::process::Command;

/// API credentials, passed to tccli through its environment variables
#[derive(Clone, Default)]
pub struct Credentials {
    pub secret_id: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Empty credentials defer to tccli's own configured profile
    pub fn is_set(&self) -> bool {
        !self.secret_id.is_empty() && !self.secret_key.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_id", &self.secret_id)
            .finish_non_exhaustive()
    }
}

/// tccli CLI wrapper bound to one region
#[derive(Debug, Clone)]
pub struct Tccli {
    region: String,
    credentials: Credentials,
}

impl Tccli {
    pub fn new(region: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            region: region.into(),
            credentials,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Check that tccli is installed
    pub async fn check_installed() -> Result<()> {
        let which = Command::new("which").arg("tccli").output().await?;
        if !which.status.success() {
            return Err(TencentError::TccliNotFound);
        }
        Ok(())
    }

    /// Invoke `service Action` and deserialize the response body
    pub async fn call<T: DeserializeOwned>(
        &self,
        service: &str,
        action: &str,
        params: Value,
    ) -> Result<T> {
        let output = self.run_command(service, action, &params).await?;
        let body = response_body(action, &output)?;
        Ok(serde_json::from_value(body)?)
    }

    /// Invoke an action whose response carries nothing but a request id
    pub async fn call_unit(&self, service: &str, action: &str, params: Value) -> Result<()> {
        self.run_command(service, action, &params).await?;
        Ok(())
    }

    async fn run_command(&self, service: &str, action: &str, params: &Value) -> Result<String> {
        let args = build_args(service, action, &self.region, params)?;

        let mut cmd = Command::new("tccli");
        cmd.args(&args);
        if self.credentials.is_set() {
            cmd.env("TENCENTCLOUD_SECRET_ID", &self.credentials.secret_id);
            cmd.env("TENCENTCLOUD_SECRET_KEY", &self.credentials.secret_key);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!(region = %self.region, "Running: tccli {} {}", service, action);

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TencentError::TccliNotFound
            } else {
                TencentError::IoError(e)
            }
        })?;

        if !output.status.success() {
            // tccli reports SDK exceptions on stdout or stderr depending on version
            let mut message = String::from_utf8_lossy(&output.stderr).to_string();
            if message.trim().is_empty() {
                message = String::from_utf8_lossy(&output.stdout).to_string();
            }
            return Err(TencentError::from_stderr(action, &message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Build the argument vector for one invocation
pub(crate) fn build_args(
    service: &str,
    action: &str,
    region: &str,
    params: &Value,
) -> Result<Vec<String>> {
    let mut args = vec![
        service.to_string(),
        action.to_string(),
        "--region".to_string(),
        region.to_string(),
    ];

    let empty = Map::new();
    let params = match params {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => return Err(TencentError::invalid(action, "parameters must be a JSON object")),
    };

    for (key, value) in params {
        if value.is_null() {
            continue;
        }
        args.push(format!("--{key}"));
        args.push(match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => serde_json::to_string(other)?,
        });
    }
    Ok(args)
}

/// Extract the response body, unwrapping a `Response` envelope when present
pub(crate) fn response_body(action: &str, output: &str) -> Result<Value> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(TencentError::invalid(action, "empty output"));
    }
    let value: Value = serde_json::from_str(trimmed)?;
    match value {
        Value::Object(mut map) => match map.remove("Response") {
            Some(inner) => Ok(inner),
            None => Ok(Value::Object(map)),
        },
        _ => Err(TencentError::invalid(action, "expected a JSON object")),
    }
}
