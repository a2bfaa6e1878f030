//! spotfleet reconciliation engine
//!
//! Keeps each configured fleet at its desired size in the cheapest zone:
//!
//! - [`zone`]: samples spot prices and picks the cheapest zone
//! - [`network`]: finds or creates VPC, subnet and security group
//! - [`state`]: reads live fleet members by tag
//! - [`dns`]: keeps the bound name's A records on fleet IPs
//! - [`init`]: one-time file transfer / command per instance, tag-guarded
//! - [`reconciler`]: the per-fleet tick
//! - [`group`]: runs every fleet on its own interval
//!
//! The cloud provider is the only source of truth; every tick re-reads it.

pub mod dns;
pub mod error;
pub mod group;
pub mod init;
pub mod network;
pub mod reconciler;
pub mod state;
pub mod zone;

pub use dns::{DnsPlan, DnsSyncReport, DnsSynchronizer, PollConfig, plan_dns_changes};
pub use error::{FleetError, Result};
pub use group::ManagerGroup;
pub use init::{InitReport, Initializer, SSH_PORT};
pub use network::{NetworkResolver, ProvisioningContext};
pub use reconciler::{Action, FleetDefaults, FleetReconciler, TickOutcome, decide};
pub use state::{FleetSnapshot, FleetStateReader};
pub use zone::{PriceRequest, ZonePrice, cheapest, sample_zone_prices, select_zone, subnet_cidr};
