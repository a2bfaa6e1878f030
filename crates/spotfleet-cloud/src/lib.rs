//! spotfleet cloud abstraction
//!
//! This crate defines the collaborator interfaces the fleet engine talks to,
//! so the reconciliation logic never depends on a concrete provider.
//!
//! # Interfaces
//!
//! - **ComputeApi**: zones, spot price quotes, instance membership and lifecycle
//! - **NetworkApi**: VPCs, subnets and security groups
//! - **DnsApi**: A records of a hosted domain
//! - **TagApi**: tag lookups and instance tagging
//! - **RemoteShell**: password-authenticated sessions for file upload and commands
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 spotfleet-core                   │
//! │        (zone sampler, reconciler, DNS, …)        │
//! └─────────────────┬───────────────────────────────┘
//!                   │ Arc<dyn RegionClient>
//! ┌─────────────────▼───────────────────────────────┐
//! │                spotfleet-cloud                   │
//! │  ComputeApi + NetworkApi + DnsApi + TagApi       │
//! │  ClientRegistry (region → client)                │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────┐
//! │     spotfleet-cloud-tencent      │
//! │        (tccli provider)          │
//! └─────────────────────────────────┘
//! ```

pub mod error;
pub mod model;
pub mod provider;
pub mod registry;
pub mod remote;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports
pub use error::{CloudError, Result};
pub use model::{
    A_RECORD, DnsRecord, InstanceLaunch, InstanceRecord, InstanceState, NewDnsRecord, PriceQuery,
    RuleDirection, SPOT_CHARGE_TYPE, SecurityGroupSpec, SecurityRule, SubnetSpec, Tag,
    TaggedResource, VpcSpec, ZoneInfo,
};
pub use provider::{ComputeApi, DnsApi, NetworkApi, RegionClient, RetryConfig, TagApi};
pub use registry::ClientRegistry;
pub use remote::{RemoteSession, RemoteShell, RemoteTarget};
