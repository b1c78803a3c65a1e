use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{CrrError, Result},
    types::BucketSelection,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisioningRequest {
    pub request_type: RequestType,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(rename = "ResponseURL", default)]
    pub response_url: Option<String>,
    #[serde(default)]
    pub stack_id: String,
    #[serde(default = "new_request_id")]
    pub request_id: String,
    #[serde(default)]
    pub logical_resource_id: String,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: ResourceProperties,
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Accepts both the camelCase names and the keys used by the CloudFormation
/// templates that drive the two custom resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceProperties {
    #[serde(default, alias = "trailName", alias = "TrailName")]
    pub trail_name: Option<String>,
    #[serde(default, alias = "snsTopicArn", alias = "SnsTopicArn")]
    pub sns_topic_arn: Option<String>,
    #[serde(default, alias = "Topic", alias = "topicName")]
    pub topic: Option<String>,
    #[serde(default, alias = "CRRQueueArn", alias = "queueArn")]
    pub queue_arn: Option<String>,
    #[serde(default, alias = "CRRMonitorTable", alias = "tableName")]
    pub table_name: Option<String>,
    #[serde(default, alias = "MonitorRegion", alias = "monitorRegion")]
    pub monitor_region: Option<String>,
    #[serde(default, alias = "Buckets")]
    pub buckets: Option<String>,
}

impl ResourceProperties {
    pub fn trail_name(&self) -> Result<&str> {
        require(self.trail_name.as_deref(), "trail_name")
    }

    pub fn sns_topic_arn(&self) -> Result<&str> {
        require(self.sns_topic_arn.as_deref(), "sns_topic_arn")
    }

    pub fn topic(&self) -> Result<&str> {
        require(self.topic.as_deref(), "Topic")
    }

    pub fn queue_arn(&self) -> Result<&str> {
        require(self.queue_arn.as_deref(), "CRRQueueArn")
    }

    pub fn table_name(&self) -> Result<&str> {
        require(self.table_name.as_deref(), "CRRMonitorTable")
    }

    pub fn monitor_region(&self) -> Result<&str> {
        require(self.monitor_region.as_deref(), "MonitorRegion")
    }

    pub fn bucket_selection(&self) -> Result<BucketSelection> {
        require(self.buckets.as_deref(), "buckets").map(BucketSelection::parse)
    }
}

fn require<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| CrrError::InvalidArgument(format!("resource property {name} is required")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisioningResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, String>>,
}

impl ProvisioningResponse {
    pub fn success(
        request: &ProvisioningRequest,
        physical_resource_id: String,
        data: Option<BTreeMap<String, String>>,
    ) -> Self {
        Self {
            status: ResponseStatus::Success,
            reason: None,
            physical_resource_id,
            stack_id: request.stack_id.clone(),
            request_id: request.request_id.clone(),
            logical_resource_id: request.logical_resource_id.clone(),
            data,
        }
    }

    pub fn failure(
        request: &ProvisioningRequest,
        fallback_physical_id: &str,
        err: &CrrError,
    ) -> Self {
        Self {
            status: ResponseStatus::Failed,
            reason: Some(format!("{}: {err}", err.kind())),
            physical_resource_id: request
                .physical_resource_id
                .clone()
                .unwrap_or_else(|| fallback_physical_id.to_string()),
            stack_id: request.stack_id.clone(),
            request_id: request.request_id.clone(),
            logical_resource_id: request.logical_resource_id.clone(),
            data: None,
        }
    }
}
