//! Tencent Cloud provider for spotfleet
//!
//! Implements the spotfleet collaborator traits (compute, network, DNS, tag)
//! on top of the `tccli` command-line client.
//!
//! # Requirements
//!
//! - `tccli` must be installed (`pip install tccli`)
//! - Credentials come from the spotfleet configuration or, when those are
//!   empty, from tccli's own configured profile
//!
//! # Example
//!
//! ```ignore
//! use spotfleet_cloud_tencent::{Credentials, build_registry};
//!
//! let credentials = Credentials::new(secret_id, secret_key);
//! let registry = build_registry(&credentials, &["ap-guangzhou".to_string()]).await?;
//! let client = registry.get("ap-guangzhou")?;
//! let zones = client.describe_zones().await?;
//! ```

pub mod error;
pub mod provider;
pub mod registry;
pub mod tccli;
pub mod types;

pub use error::{Result, TencentError};
pub use provider::{PAGE_SIZE, TencentCloudClient};
pub use registry::{build_registry, discover_uin};
pub use tccli::{Credentials, Tccli};
