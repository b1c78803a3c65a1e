//! Deterministic names and ARNs shared by the create and teardown paths.
//!
//! Nothing in this crate stores a handle to a provisioned resource; every
//! identifier is recomputed from its inputs, so these functions are the only
//! link between one pass and the next.

pub const ALARM_NAME_PREFIX: &str = "FailedReplicationAlarm-";
pub const AGENT_RULE_NAME: &str = "CRRAgent";
pub const TRAIL_ALARM_PHYSICAL_ID: &str = "CRRMonitorTrailAlarm";
const AGENT_PHYSICAL_ID_PREFIX: &str = "CRRMonitorAgent-";

pub fn alarm_name(bucket: &str) -> String {
    format!("{ALARM_NAME_PREFIX}{bucket}")
}

pub fn bucket_from_alarm_name(alarm_name: &str) -> Option<&str> {
    alarm_name.strip_prefix(ALARM_NAME_PREFIX)
}

pub fn source_object_arn(partition: &str, bucket: &str) -> String {
    format!("arn:{partition}:s3:::{bucket}/")
}

/// `<bucket arn>/<prefix>`; an empty prefix leaves the trailing `/`, a
/// non-empty one does not add another.
pub fn destination_object_arn(destination_bucket_arn: &str, prefix: &str) -> String {
    format!("{destination_bucket_arn}/{prefix}")
}

/// Bucket name from an S3 bucket ARN (`arn:aws:s3:::name` -> `name`).
pub fn destination_bucket_name(bucket_arn: &str) -> Option<&str> {
    bucket_arn
        .splitn(6, ':')
        .nth(5)
        .filter(|name| !name.is_empty())
}

pub fn agent_topic_name(topic_base_name: &str, region: &str) -> String {
    format!("{topic_base_name}-{region}")
}

pub fn agent_target_id(region: &str) -> String {
    format!("{AGENT_RULE_NAME}-{region}")
}

pub fn topic_arn(partition: &str, region: &str, account_id: &str, topic_name: &str) -> String {
    format!("arn:{partition}:sns:{region}:{account_id}:{topic_name}")
}

pub fn agent_physical_id(region: &str) -> String {
    format!("{AGENT_PHYSICAL_ID_PREFIX}{region}")
}
