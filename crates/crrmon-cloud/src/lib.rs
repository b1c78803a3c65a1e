use std::sync::Arc;

pub mod memory;
pub mod traits;
pub mod types;

pub use memory::MemoryCloud;
pub use traits::{
    EventRuleService, IdentityService, MetricsService, NotificationService, StateTableService,
    StorageService, TrailService,
};
pub use types::{
    AlarmDefinition, DataResource, Dimension, EventRule, EventSelector, MetricDatum, RuleState,
    RuleTarget, TrailStatus,
};

/// One handle per collaborator the reconcilers talk to.
#[derive(Clone)]
pub struct CloudServices {
    pub storage: Arc<dyn StorageService>,
    pub trails: Arc<dyn TrailService>,
    pub metrics: Arc<dyn MetricsService>,
    pub notifications: Arc<dyn NotificationService>,
    pub events: Arc<dyn EventRuleService>,
    pub identity: Arc<dyn IdentityService>,
    pub state_table: Arc<dyn StateTableService>,
}

impl CloudServices {
    /// Uses a single backend for every collaborator.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: StorageService
            + TrailService
            + MetricsService
            + NotificationService
            + EventRuleService
            + IdentityService
            + StateTableService
            + 'static,
    {
        Self {
            storage: backend.clone(),
            trails: backend.clone(),
            metrics: backend.clone(),
            notifications: backend.clone(),
            events: backend.clone(),
            identity: backend.clone(),
            state_table: backend,
        }
    }
}
