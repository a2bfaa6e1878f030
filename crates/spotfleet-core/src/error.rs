use spotfleet_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("No zone in [{regions}] returned a price")]
    PriceUnavailable { regions: String },

    #[error("No API client configured for region: {0}")]
    MissingRegionClient(String),

    #[error("Invalid zone identifier: {0}")]
    InvalidZone(String),

    #[error("Failed to resolve {resource}: {source}")]
    Network {
        resource: &'static str,
        #[source]
        source: CloudError,
    },

    #[error("Only {ready}/{desired} instances reported a public IP after {attempts} polls")]
    ProvisioningTimeout {
        ready: usize,
        desired: usize,
        attempts: u32,
    },

    #[error("Cancelled")]
    Cancelled,

    #[error("Initialization of {instance_id} ({host}) failed: {source}")]
    Remote {
        instance_id: String,
        host: String,
        #[source]
        source: CloudError,
    },

    #[error("No fleet could be started")]
    NoActiveFleets,

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

impl FleetError {
    pub(crate) fn network(resource: &'static str) -> impl FnOnce(CloudError) -> Self {
        move |source| Self::Network { resource, source }
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
