//! Audit-trail data events and per-bucket failed-replication alarms.
//!
//! Alarms are keyed only by name (`FailedReplicationAlarm-<bucket>`); the
//! live alarm list is the previous state. On update, alarms whose bucket is
//! no longer a candidate are deleted. Teardown deletes by the current
//! candidate names only and never scans by prefix.

use std::{collections::BTreeSet, sync::Arc};

use chrono::Utc;
use crrmon_cloud::{
    AlarmDefinition, Dimension, EventSelector, MetricDatum, MetricsService, TrailService,
};
use crrmon_common::{
    MonitoredBucketSet,
    error::{CrrError, Result},
    naming::{self, ALARM_NAME_PREFIX},
};
use tracing::{error, info};

pub const METRIC_NAMESPACE: &str = "CRRMonitor";
pub const FAILED_REPLICATIONS_METRIC: &str = "FailedReplications";
pub const SOURCE_BUCKET_DIMENSION: &str = "SourceBucket";
const ALARM_DESCRIPTION: &str = "Trigger an alarm for Failed Replication Objects.";
const ALARM_PERIOD_SECONDS: i32 = 60;

pub fn failed_replication_alarm(bucket: &str, alarm_topic_arn: &str) -> AlarmDefinition {
    AlarmDefinition {
        name: naming::alarm_name(bucket),
        description: ALARM_DESCRIPTION.to_string(),
        namespace: METRIC_NAMESPACE.to_string(),
        metric_name: FAILED_REPLICATIONS_METRIC.to_string(),
        dimensions: vec![source_bucket_dimension(bucket)],
        statistic: "Sum".to_string(),
        period_seconds: ALARM_PERIOD_SECONDS,
        evaluation_periods: 1,
        threshold: 0.0,
        comparison_operator: "GreaterThanThreshold".to_string(),
        actions_enabled: true,
        alarm_actions: vec![alarm_topic_arn.to_string()],
    }
}

/// Zero datapoint so a fresh alarm has something to evaluate.
pub fn baseline_datum(bucket: &str) -> MetricDatum {
    MetricDatum {
        namespace: METRIC_NAMESPACE.to_string(),
        metric_name: FAILED_REPLICATIONS_METRIC.to_string(),
        dimensions: vec![source_bucket_dimension(bucket)],
        value: 0.0,
        timestamp: Utc::now(),
    }
}

fn source_bucket_dimension(bucket: &str) -> Dimension {
    Dimension {
        name: SOURCE_BUCKET_DIMENSION.to_string(),
        value: bucket.to_string(),
    }
}

/// Live alarm names whose bucket suffix is not in `keep`. Names without the
/// alarm prefix are never reported.
pub fn find_orphans<'a, I>(live: I, keep: &BTreeSet<String>) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    live.into_iter()
        .filter(|name| {
            naming::bucket_from_alarm_name(name).is_some_and(|bucket| !keep.contains(bucket))
        })
        .cloned()
        .collect()
}

pub struct TrailAlarmSys {
    trails: Arc<dyn TrailService>,
    metrics: Arc<dyn MetricsService>,
}

impl TrailAlarmSys {
    pub fn new(trails: Arc<dyn TrailService>, metrics: Arc<dyn MetricsService>) -> Self {
        Self { trails, metrics }
    }

    /// Converges selectors and alarms for `desired`. `orphan_scope` is the
    /// full candidate bucket list and is only given on update.
    pub async fn reconcile(
        &self,
        trail_name: &str,
        alarm_topic_arn: &str,
        desired: &MonitoredBucketSet,
        orphan_scope: Option<&BTreeSet<String>>,
    ) -> Result<()> {
        self.validate_trail(trail_name).await?;
        self.put_data_resources(trail_name, &desired.data_resource_arns)
            .await?;
        self.seed_baseline(&desired.source_bucket_names).await?;
        if let Some(candidates) = orphan_scope {
            self.remove_orphaned_alarms(candidates).await?;
        }
        self.put_alarms(alarm_topic_arn, &desired.source_bucket_names)
            .await
    }

    pub async fn teardown(&self, trail_name: &str, buckets: &[String]) -> Result<()> {
        self.put_data_resources(trail_name, &BTreeSet::new()).await?;
        for bucket in buckets {
            let alarm = naming::alarm_name(bucket);
            self.metrics
                .delete_alarms(std::slice::from_ref(&alarm))
                .await
                .map_err(|err| err.into_convergence(&format!("delete alarm {alarm}")))?;
            info!(alarm = %alarm, "deleted alarm");
        }
        Ok(())
    }

    pub async fn validate_trail(&self, trail_name: &str) -> Result<()> {
        let status = self
            .trails
            .describe_trail(trail_name)
            .await
            .map_err(|err| {
                CrrError::Validation(format!("failed to describe trail {trail_name}: {err}"))
            })?
            .ok_or_else(|| CrrError::Validation(format!("trail {trail_name} does not exist")))?;

        if let Some(flag) = status.missing_requirements().first() {
            let err = CrrError::Validation(format!("trail {trail_name} must have {flag} set to true"));
            error!(trail = %trail_name, error = %err, "trail validation failed");
            return Err(err);
        }
        Ok(())
    }

    async fn put_data_resources(&self, trail_name: &str, arns: &BTreeSet<String>) -> Result<()> {
        let selector = EventSelector::s3_objects(arns.iter().cloned().collect());
        self.trails
            .put_event_selectors(trail_name, std::slice::from_ref(&selector))
            .await
            .map_err(|err| err.into_convergence(&format!("put event selectors on {trail_name}")))?;
        info!(trail = %trail_name, data_resources = arns.len(), "event selectors replaced");
        Ok(())
    }

    async fn seed_baseline(&self, buckets: &BTreeSet<String>) -> Result<()> {
        for bucket in buckets {
            self.metrics
                .put_metric_data(&baseline_datum(bucket))
                .await
                .map_err(|err| err.into_convergence(&format!("seed metric data for {bucket}")))?;
        }
        Ok(())
    }

    async fn remove_orphaned_alarms(&self, candidates: &BTreeSet<String>) -> Result<()> {
        let live = self
            .metrics
            .describe_alarm_names(ALARM_NAME_PREFIX)
            .await
            .map_err(|err| err.into_convergence("describe alarms"))?;

        let orphans = find_orphans(&live, candidates);
        if orphans.is_empty() {
            return Ok(());
        }

        info!(alarms = ?orphans, "deleting orphaned alarms");
        self.metrics
            .delete_alarms(&orphans)
            .await
            .map_err(|err| err.into_convergence("delete orphaned alarms"))
    }

    async fn put_alarms(&self, alarm_topic_arn: &str, buckets: &BTreeSet<String>) -> Result<()> {
        for bucket in buckets {
            let alarm = failed_replication_alarm(bucket, alarm_topic_arn);
            self.metrics
                .put_metric_alarm(&alarm)
                .await
                .map_err(|err| err.into_convergence(&format!("put alarm {}", alarm.name)))?;
            info!(alarm = %alarm.name, "alarm converged");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crrmon_cloud::{MemoryCloud, TrailStatus};

    use super::*;

    const TRAIL: &str = "crr-trail";
    const TOPIC: &str = "arn:aws:sns:us-east-1:123456789012:crr-alarms";

    fn names(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn valid_trail() -> TrailStatus {
        TrailStatus {
            name: TRAIL.to_string(),
            is_multi_region_trail: true,
            include_global_service_events: true,
            log_file_validation_enabled: true,
        }
    }

    fn setup() -> (Arc<MemoryCloud>, TrailAlarmSys) {
        let cloud = Arc::new(MemoryCloud::new());
        cloud.add_trail(valid_trail());
        let sys = TrailAlarmSys::new(cloud.clone(), cloud.clone());
        (cloud, sys)
    }

    fn desired(buckets: &[&str]) -> MonitoredBucketSet {
        MonitoredBucketSet {
            source_bucket_names: names(buckets),
            data_resource_arns: buckets
                .iter()
                .map(|bucket| naming::source_object_arn("aws", bucket))
                .collect(),
        }
    }

    #[test]
    fn orphans_are_live_minus_keep() {
        let live = vec![
            naming::alarm_name("a"),
            naming::alarm_name("b"),
            naming::alarm_name("c"),
            "Unrelated".to_string(),
        ];

        let orphans = find_orphans(&live, &names(&["a"]));
        assert_eq!(orphans, vec![naming::alarm_name("b"), naming::alarm_name("c")]);
    }

    #[test]
    fn alarm_definition_matches_failed_replication_contract() {
        let alarm = failed_replication_alarm("src", TOPIC);
        assert_eq!(alarm.name, "FailedReplicationAlarm-src");
        assert_eq!(alarm.statistic, "Sum");
        assert_eq!(alarm.period_seconds, 60);
        assert_eq!(alarm.evaluation_periods, 1);
        assert_eq!(alarm.threshold, 0.0);
        assert_eq!(alarm.comparison_operator, "GreaterThanThreshold");
        assert_eq!(alarm.alarm_actions, vec![TOPIC.to_string()]);
        assert_eq!(alarm.dimensions[0].name, "SourceBucket");
    }

    #[tokio::test]
    async fn misconfigured_trail_is_rejected_before_any_mutation() {
        let cloud = Arc::new(MemoryCloud::new());
        cloud.add_trail(TrailStatus {
            log_file_validation_enabled: false,
            ..valid_trail()
        });
        let sys = TrailAlarmSys::new(cloud.clone(), cloud.clone());

        let err = sys
            .reconcile(TRAIL, TOPIC, &desired(&["src"]), None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "ValidationError");
        assert!(err.to_string().contains("LogFileValidationEnabled"));
        assert_eq!(cloud.calls(), vec![format!("DescribeTrails {TRAIL}")]);
    }

    #[tokio::test]
    async fn missing_trail_is_a_validation_error() {
        let cloud = Arc::new(MemoryCloud::new());
        let sys = TrailAlarmSys::new(cloud.clone(), cloud.clone());

        let err = sys.validate_trail("ghost").await.unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[tokio::test]
    async fn baseline_is_seeded_before_alarms_are_created() {
        let (cloud, sys) = setup();

        sys.reconcile(TRAIL, TOPIC, &desired(&["a", "b"]), None)
            .await
            .unwrap();

        let calls = cloud.calls();
        let last_seed = calls
            .iter()
            .rposition(|call| call.starts_with("PutMetricData"))
            .unwrap();
        let first_alarm = calls
            .iter()
            .position(|call| call.starts_with("PutMetricAlarm"))
            .unwrap();
        assert!(last_seed < first_alarm);
        assert_eq!(cloud.metric_data().len(), 2);
        assert!(cloud.metric_data().iter().all(|datum| datum.value == 0.0));
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let (cloud, sys) = setup();
        let desired = desired(&["a", "b"]);

        sys.reconcile(TRAIL, TOPIC, &desired, Some(&names(&["a", "b"])))
            .await
            .unwrap();
        let selectors = cloud.selectors(TRAIL);
        let alarms = cloud.alarm_names();

        sys.reconcile(TRAIL, TOPIC, &desired, Some(&names(&["a", "b"])))
            .await
            .unwrap();
        assert_eq!(cloud.selectors(TRAIL), selectors);
        assert_eq!(cloud.alarm_names(), alarms);
    }

    #[tokio::test]
    async fn update_removes_alarms_for_buckets_no_longer_listed() {
        let (cloud, sys) = setup();
        for bucket in ["A", "B", "C"] {
            cloud.add_alarm(failed_replication_alarm(bucket, TOPIC));
        }

        sys.reconcile(TRAIL, TOPIC, &MonitoredBucketSet::default(), Some(&names(&["A"])))
            .await
            .unwrap();

        assert_eq!(cloud.alarm_names(), vec![naming::alarm_name("A")]);
        let deletes: Vec<_> = cloud
            .calls()
            .into_iter()
            .filter(|call| call.starts_with("DeleteAlarms"))
            .collect();
        assert_eq!(
            deletes,
            vec!["DeleteAlarms FailedReplicationAlarm-B,FailedReplicationAlarm-C".to_string()]
        );
    }

    #[tokio::test]
    async fn create_never_scans_for_orphans() {
        let (cloud, sys) = setup();
        cloud.add_alarm(failed_replication_alarm("stale", TOPIC));

        sys.reconcile(TRAIL, TOPIC, &desired(&["src"]), None)
            .await
            .unwrap();

        assert!(cloud.alarm("FailedReplicationAlarm-stale").is_some());
        assert!(!cloud.calls().iter().any(|call| call.starts_with("DescribeAlarms")));
    }

    #[tokio::test]
    async fn empty_orphan_set_skips_delete_call() {
        let (cloud, sys) = setup();

        sys.reconcile(TRAIL, TOPIC, &desired(&["src"]), Some(&names(&["src"])))
            .await
            .unwrap();

        assert!(!cloud.calls().iter().any(|call| call.starts_with("DeleteAlarms")));
    }

    #[tokio::test]
    async fn alarm_failure_aborts_the_pass() {
        let (cloud, sys) = setup();
        cloud.fail_operation("PutMetricAlarm");

        let err = sys
            .reconcile(TRAIL, TOPIC, &desired(&["a", "b"]), None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "ConvergenceError");
        let alarm_calls = cloud
            .calls()
            .iter()
            .filter(|call| call.starts_with("PutMetricAlarm"))
            .count();
        assert_eq!(alarm_calls, 1);
    }

    #[tokio::test]
    async fn teardown_clears_selectors_and_deletes_listed_alarms() {
        let (cloud, sys) = setup();
        sys.reconcile(TRAIL, TOPIC, &desired(&["src"]), None)
            .await
            .unwrap();
        cloud.add_alarm(failed_replication_alarm("unlisted", TOPIC));

        sys.teardown(TRAIL, &["src".to_string(), "plain".to_string()])
            .await
            .unwrap();

        let selectors = cloud.selectors(TRAIL).unwrap();
        assert_eq!(selectors.len(), 1);
        assert_eq!(selectors[0].data_resource_values().count(), 0);
        assert_eq!(cloud.alarm_names(), vec![naming::alarm_name("unlisted")]);
        let deletes = cloud
            .calls()
            .iter()
            .filter(|call| call.starts_with("DeleteAlarms"))
            .count();
        assert_eq!(deletes, 2);
    }
}
