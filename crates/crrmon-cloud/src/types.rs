use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const S3_OBJECT_RESOURCE_TYPE: &str = "AWS::S3::Object";
pub const SQS_PROTOCOL: &str = "sqs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailStatus {
    pub name: String,
    pub is_multi_region_trail: bool,
    pub include_global_service_events: bool,
    pub log_file_validation_enabled: bool,
}

impl TrailStatus {
    /// Names of the required flags that are not enabled, in the order they
    /// are reported.
    pub fn missing_requirements(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.include_global_service_events {
            missing.push("IncludeGlobalServiceEvents");
        }
        if !self.is_multi_region_trail {
            missing.push("IsMultiRegionTrail");
        }
        if !self.log_file_validation_enabled {
            missing.push("LogFileValidationEnabled");
        }
        missing
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResource {
    pub resource_type: String,
    pub values: Vec<String>,
}

/// A data-event selector that records all reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSelector {
    pub include_management_events: bool,
    pub data_resources: Vec<DataResource>,
}

impl EventSelector {
    pub fn s3_objects(values: Vec<String>) -> Self {
        Self {
            include_management_events: true,
            data_resources: vec![DataResource {
                resource_type: S3_OBJECT_RESOURCE_TYPE.to_string(),
                values,
            }],
        }
    }

    pub fn data_resource_values(&self) -> impl Iterator<Item = &str> {
        self.data_resources
            .iter()
            .flat_map(|resource| resource.values.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDatum {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmDefinition {
    pub name: String,
    pub description: String,
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    pub statistic: String,
    pub period_seconds: i32,
    pub evaluation_periods: i32,
    pub threshold: f64,
    pub comparison_operator: String,
    pub actions_enabled: bool,
    pub alarm_actions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleState {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRule {
    pub name: String,
    pub description: String,
    pub event_pattern: String,
    pub state: RuleState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTarget {
    pub id: String,
    pub arn: String,
}
