use async_trait::async_trait;
use crrmon_common::{BucketDescriptor, ReplicationConfiguration, error::Result};

use crate::types::{AlarmDefinition, EventRule, EventSelector, MetricDatum, RuleTarget, TrailStatus};

#[async_trait]
pub trait StorageService: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<BucketDescriptor>>;
    /// `Ok(None)` when the bucket has no replication configuration.
    async fn get_bucket_replication(
        &self,
        bucket: &str,
    ) -> Result<Option<ReplicationConfiguration>>;
    /// `Ok(None)` for the empty location constraint.
    async fn get_bucket_location(&self, bucket: &str) -> Result<Option<String>>;
}

#[async_trait]
pub trait TrailService: Send + Sync {
    async fn describe_trail(&self, name: &str) -> Result<Option<TrailStatus>>;
    /// Replaces every selector on the trail.
    async fn put_event_selectors(&self, trail: &str, selectors: &[EventSelector]) -> Result<()>;
}

#[async_trait]
pub trait MetricsService: Send + Sync {
    async fn put_metric_data(&self, datum: &MetricDatum) -> Result<()>;
    async fn put_metric_alarm(&self, alarm: &AlarmDefinition) -> Result<()>;
    async fn describe_alarm_names(&self, prefix: &str) -> Result<Vec<String>>;
    async fn delete_alarms(&self, names: &[String]) -> Result<()>;
}

#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Returns the existing topic's ARN when the name is already taken.
    async fn create_topic(&self, region: &str, name: &str) -> Result<String>;
    async fn set_topic_policy(&self, region: &str, topic_arn: &str, policy: &str) -> Result<()>;
    async fn subscribe(
        &self,
        region: &str,
        topic_arn: &str,
        protocol: &str,
        endpoint: &str,
    ) -> Result<String>;
    async fn delete_topic(&self, region: &str, topic_arn: &str) -> Result<()>;
}

#[async_trait]
pub trait EventRuleService: Send + Sync {
    async fn put_rule(&self, region: &str, rule: &EventRule) -> Result<()>;
    async fn put_target(&self, region: &str, rule: &str, target: &RuleTarget) -> Result<()>;
    async fn enable_rule(&self, region: &str, rule: &str) -> Result<()>;
    async fn remove_targets(&self, region: &str, rule: &str, ids: &[String]) -> Result<()>;
    async fn delete_rule(&self, region: &str, rule: &str) -> Result<()>;
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn account_id(&self, region: &str) -> Result<String>;
}

/// The table written by the replication event ingestion pipeline.
#[async_trait]
pub trait StateTableService: Send + Sync {
    async fn enable_time_to_live(&self, region: &str, table: &str, attribute: &str) -> Result<()>;
}
