//! In-process implementation of every collaborator trait.
//!
//! State lives behind a single mutex and every call is appended to a call
//! log, so a test can assert both the resulting resources and the order in
//! which they were touched. Failures are injected per operation name
//! (`"PutMetricAlarm"`, `"DeleteTopic"`, ...) or per bucket for replication
//! lookups.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use crrmon_common::{
    BucketDescriptor, ReplicationConfiguration,
    error::{CrrError, Result},
    naming,
};

use crate::{
    traits::{
        EventRuleService, IdentityService, MetricsService, NotificationService,
        StateTableService, StorageService, TrailService,
    },
    types::{AlarmDefinition, EventRule, EventSelector, MetricDatum, RuleState, RuleTarget, TrailStatus},
};

const DEFAULT_ACCOUNT_ID: &str = "123456789012";

#[derive(Debug, Clone, Default)]
struct MemoryBucket {
    location: Option<String>,
    replication: Option<ReplicationConfiguration>,
    replication_denied: bool,
}

#[derive(Debug, Clone)]
struct MemoryTrail {
    status: TrailStatus,
    selectors: Vec<EventSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSnapshot {
    pub rule: EventRule,
    pub targets: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSnapshot {
    pub arn: String,
    pub region: String,
    pub name: String,
    pub policy: Option<String>,
    pub subscriptions: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    account_id: String,
    buckets: BTreeMap<String, MemoryBucket>,
    trails: BTreeMap<String, MemoryTrail>,
    metric_data: Vec<MetricDatum>,
    alarms: BTreeMap<String, AlarmDefinition>,
    rules: BTreeMap<(String, String), RuleSnapshot>,
    topics: BTreeMap<String, TopicSnapshot>,
    time_to_live: BTreeMap<(String, String), String>,
    failing_operations: HashSet<String>,
    calls: Vec<String>,
}

#[derive(Debug)]
pub struct MemoryCloud {
    partition: String,
    state: Mutex<MemoryState>,
}

impl Default for MemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self {
            partition: crrmon_common::settings::DEFAULT_PARTITION.to_string(),
            state: Mutex::new(MemoryState {
                account_id: DEFAULT_ACCOUNT_ID.to_string(),
                ..MemoryState::default()
            }),
        }
    }

    pub fn set_account_id(&self, account_id: &str) {
        self.state().account_id = account_id.to_string();
    }

    /// `location` is the raw constraint; `None` models a bucket in the
    /// default region.
    pub fn add_bucket(&self, name: &str, location: Option<&str>) {
        self.state().buckets.insert(
            name.to_string(),
            MemoryBucket {
                location: location.map(str::to_string),
                ..MemoryBucket::default()
            },
        );
    }

    pub fn set_replication(&self, bucket: &str, config: ReplicationConfiguration) {
        self.state()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .replication = Some(config);
    }

    pub fn set_replication_xml(&self, bucket: &str, xml: &str) -> Result<()> {
        let config = ReplicationConfiguration::from_xml(xml)?;
        self.set_replication(bucket, config);
        Ok(())
    }

    pub fn deny_replication_lookup(&self, bucket: &str) {
        self.state()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .replication_denied = true;
    }

    pub fn add_trail(&self, status: TrailStatus) {
        self.state().trails.insert(
            status.name.clone(),
            MemoryTrail {
                status,
                selectors: Vec::new(),
            },
        );
    }

    pub fn add_alarm(&self, alarm: AlarmDefinition) {
        self.state().alarms.insert(alarm.name.clone(), alarm);
    }

    pub fn fail_operation(&self, operation: &str) {
        self.state().failing_operations.insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.state().failing_operations.clear();
    }

    pub fn selectors(&self, trail: &str) -> Option<Vec<EventSelector>> {
        self.state().trails.get(trail).map(|trail| trail.selectors.clone())
    }

    pub fn alarm_names(&self) -> Vec<String> {
        self.state().alarms.keys().cloned().collect()
    }

    pub fn alarm(&self, name: &str) -> Option<AlarmDefinition> {
        self.state().alarms.get(name).cloned()
    }

    pub fn metric_data(&self) -> Vec<MetricDatum> {
        self.state().metric_data.clone()
    }

    pub fn rule(&self, region: &str, name: &str) -> Option<RuleSnapshot> {
        self.state()
            .rules
            .get(&(region.to_string(), name.to_string()))
            .cloned()
    }

    pub fn rules(&self) -> Vec<RuleSnapshot> {
        self.state().rules.values().cloned().collect()
    }

    pub fn topics(&self) -> Vec<TopicSnapshot> {
        self.state().topics.values().cloned().collect()
    }

    pub fn time_to_live(&self, region: &str, table: &str) -> Option<String> {
        self.state()
            .time_to_live
            .get(&(region.to_string(), table.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call and returns the locked state unless the operation
    /// was told to fail.
    fn enter(
        &self,
        service: &'static str,
        operation: &'static str,
        detail: &str,
    ) -> Result<MutexGuard<'_, MemoryState>> {
        let mut state = self.state();
        state.calls.push(format!("{operation} {detail}"));
        if state.failing_operations.contains(operation) {
            return Err(CrrError::service(service, operation, "injected failure"));
        }
        Ok(state)
    }
}

#[async_trait]
impl StorageService for MemoryCloud {
    async fn list_buckets(&self) -> Result<Vec<BucketDescriptor>> {
        let state = self.enter("s3", "ListBuckets", "")?;
        Ok(state.buckets.keys().map(BucketDescriptor::new).collect())
    }

    async fn get_bucket_replication(
        &self,
        bucket: &str,
    ) -> Result<Option<ReplicationConfiguration>> {
        let state = self.enter("s3", "GetBucketReplication", bucket)?;
        let Some(entry) = state.buckets.get(bucket) else {
            return Err(CrrError::service(
                "s3",
                "GetBucketReplication",
                format!("NoSuchBucket: {bucket}"),
            ));
        };
        if entry.replication_denied {
            return Err(CrrError::service(
                "s3",
                "GetBucketReplication",
                format!("AccessDenied: {bucket}"),
            ));
        }
        Ok(entry.replication.clone())
    }

    async fn get_bucket_location(&self, bucket: &str) -> Result<Option<String>> {
        let state = self.enter("s3", "GetBucketLocation", bucket)?;
        state
            .buckets
            .get(bucket)
            .map(|entry| entry.location.clone())
            .ok_or_else(|| {
                CrrError::service("s3", "GetBucketLocation", format!("NoSuchBucket: {bucket}"))
            })
    }
}

#[async_trait]
impl TrailService for MemoryCloud {
    async fn describe_trail(&self, name: &str) -> Result<Option<TrailStatus>> {
        let state = self.enter("cloudtrail", "DescribeTrails", name)?;
        Ok(state.trails.get(name).map(|trail| trail.status.clone()))
    }

    async fn put_event_selectors(&self, trail: &str, selectors: &[EventSelector]) -> Result<()> {
        let mut state = self.enter("cloudtrail", "PutEventSelectors", trail)?;
        let Some(entry) = state.trails.get_mut(trail) else {
            return Err(CrrError::service(
                "cloudtrail",
                "PutEventSelectors",
                format!("TrailNotFoundException: {trail}"),
            ));
        };
        entry.selectors = selectors.to_vec();
        Ok(())
    }
}

#[async_trait]
impl MetricsService for MemoryCloud {
    async fn put_metric_data(&self, datum: &MetricDatum) -> Result<()> {
        let detail = datum
            .dimensions
            .first()
            .map(|dimension| dimension.value.as_str())
            .unwrap_or_default();
        let mut state = self.enter("cloudwatch", "PutMetricData", detail)?;
        state.metric_data.push(datum.clone());
        Ok(())
    }

    async fn put_metric_alarm(&self, alarm: &AlarmDefinition) -> Result<()> {
        let mut state = self.enter("cloudwatch", "PutMetricAlarm", &alarm.name)?;
        state.alarms.insert(alarm.name.clone(), alarm.clone());
        Ok(())
    }

    async fn describe_alarm_names(&self, prefix: &str) -> Result<Vec<String>> {
        let state = self.enter("cloudwatch", "DescribeAlarms", prefix)?;
        Ok(state
            .alarms
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_alarms(&self, names: &[String]) -> Result<()> {
        let mut state = self.enter("cloudwatch", "DeleteAlarms", &names.join(","))?;
        for name in names {
            state.alarms.remove(name);
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationService for MemoryCloud {
    async fn create_topic(&self, region: &str, name: &str) -> Result<String> {
        let mut state = self.enter("sns", "CreateTopic", &format!("{region}/{name}"))?;
        let arn = naming::topic_arn(&self.partition, region, &state.account_id, name);
        state
            .topics
            .entry(arn.clone())
            .or_insert_with(|| TopicSnapshot {
                arn: arn.clone(),
                region: region.to_string(),
                name: name.to_string(),
                policy: None,
                subscriptions: Vec::new(),
            });
        Ok(arn)
    }

    async fn set_topic_policy(&self, region: &str, topic_arn: &str, policy: &str) -> Result<()> {
        let mut state = self.enter("sns", "SetTopicAttributes", topic_arn)?;
        let topic = find_topic(&mut state, region, topic_arn, "SetTopicAttributes")?;
        topic.policy = Some(policy.to_string());
        Ok(())
    }

    async fn subscribe(
        &self,
        region: &str,
        topic_arn: &str,
        protocol: &str,
        endpoint: &str,
    ) -> Result<String> {
        let mut state = self.enter("sns", "Subscribe", &format!("{topic_arn} {endpoint}"))?;
        let topic = find_topic(&mut state, region, topic_arn, "Subscribe")?;
        let subscription = (protocol.to_string(), endpoint.to_string());
        let index = match topic.subscriptions.iter().position(|existing| existing == &subscription) {
            Some(index) => index,
            None => {
                topic.subscriptions.push(subscription);
                topic.subscriptions.len() - 1
            }
        };
        Ok(format!("{topic_arn}:subscription-{index}"))
    }

    async fn delete_topic(&self, _region: &str, topic_arn: &str) -> Result<()> {
        let mut state = self.enter("sns", "DeleteTopic", topic_arn)?;
        state.topics.remove(topic_arn);
        Ok(())
    }
}

fn find_topic<'a>(
    state: &'a mut MemoryState,
    region: &str,
    topic_arn: &str,
    operation: &'static str,
) -> Result<&'a mut TopicSnapshot> {
    state
        .topics
        .get_mut(topic_arn)
        .filter(|topic| topic.region == region)
        .ok_or_else(|| CrrError::service("sns", operation, format!("NotFound: {topic_arn}")))
}

#[async_trait]
impl EventRuleService for MemoryCloud {
    async fn put_rule(&self, region: &str, rule: &EventRule) -> Result<()> {
        let mut state = self.enter("events", "PutRule", &format!("{region}/{}", rule.name))?;
        state
            .rules
            .entry((region.to_string(), rule.name.clone()))
            .and_modify(|existing| existing.rule = rule.clone())
            .or_insert_with(|| RuleSnapshot {
                rule: rule.clone(),
                targets: BTreeMap::new(),
            });
        Ok(())
    }

    async fn put_target(&self, region: &str, rule: &str, target: &RuleTarget) -> Result<()> {
        let mut state = self.enter("events", "PutTargets", &format!("{region}/{rule}"))?;
        let entry = find_rule(&mut state, region, rule, "PutTargets")?;
        entry.targets.insert(target.id.clone(), target.arn.clone());
        Ok(())
    }

    async fn enable_rule(&self, region: &str, rule: &str) -> Result<()> {
        let mut state = self.enter("events", "EnableRule", &format!("{region}/{rule}"))?;
        let entry = find_rule(&mut state, region, rule, "EnableRule")?;
        entry.rule.state = RuleState::Enabled;
        Ok(())
    }

    async fn remove_targets(&self, region: &str, rule: &str, ids: &[String]) -> Result<()> {
        let mut state = self.enter("events", "RemoveTargets", &format!("{region}/{rule}"))?;
        if let Some(entry) = state.rules.get_mut(&(region.to_string(), rule.to_string())) {
            for id in ids {
                entry.targets.remove(id);
            }
        }
        Ok(())
    }

    async fn delete_rule(&self, region: &str, rule: &str) -> Result<()> {
        let mut state = self.enter("events", "DeleteRule", &format!("{region}/{rule}"))?;
        let key = (region.to_string(), rule.to_string());
        if state.rules.get(&key).is_some_and(|entry| !entry.targets.is_empty()) {
            return Err(CrrError::service(
                "events",
                "DeleteRule",
                format!("ValidationException: rule {rule} still has targets"),
            ));
        }
        state.rules.remove(&key);
        Ok(())
    }
}

fn find_rule<'a>(
    state: &'a mut MemoryState,
    region: &str,
    rule: &str,
    operation: &'static str,
) -> Result<&'a mut RuleSnapshot> {
    state
        .rules
        .get_mut(&(region.to_string(), rule.to_string()))
        .ok_or_else(|| {
            CrrError::service(
                "events",
                operation,
                format!("ResourceNotFoundException: {region}/{rule}"),
            )
        })
}

#[async_trait]
impl IdentityService for MemoryCloud {
    async fn account_id(&self, region: &str) -> Result<String> {
        let state = self.enter("sts", "GetCallerIdentity", region)?;
        Ok(state.account_id.clone())
    }
}

#[async_trait]
impl StateTableService for MemoryCloud {
    async fn enable_time_to_live(&self, region: &str, table: &str, attribute: &str) -> Result<()> {
        let mut state = self.enter("dynamodb", "UpdateTimeToLive", &format!("{region}/{table}"))?;
        state
            .time_to_live
            .insert((region.to_string(), table.to_string()), attribute.to_string());
        Ok(())
    }
}
