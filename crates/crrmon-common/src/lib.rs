pub mod envelope;
pub mod error;
pub mod naming;
pub mod settings;
pub mod types;

pub use envelope::{ProvisioningRequest, ProvisioningResponse, RequestType, ResourceProperties};
pub use error::{CrrError, Result};
pub use settings::MonitorSettings;
pub use types::{
    BucketDescriptor, BucketSelection, MonitoredBucketSet, ReplicationConfiguration,
    ReplicationPair, ReplicationRule, RuleStatus, Topology,
};
