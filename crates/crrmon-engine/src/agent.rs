use std::sync::Arc;

use crrmon_cloud::{
    EventRule, EventRuleService, IdentityService, NotificationService, RuleState, RuleTarget,
    types::SQS_PROTOCOL,
};
use crrmon_common::{
    error::Result,
    naming::{self, AGENT_RULE_NAME},
};
use serde_json::json;
use tracing::info;

const RULE_DESCRIPTION: &str =
    "Fires CRRMonitor for S3 events that indicate an object has been stored.";
const EVENTS_SERVICE_PRINCIPAL: &str = "events.amazonaws.com";

/// CloudTrail-delivered S3 API calls that store an object.
pub fn object_written_pattern() -> String {
    json!({
        "detail-type": ["AWS API Call via CloudTrail"],
        "detail": {
            "eventSource": ["s3.amazonaws.com"],
            "eventName": ["PutObject", "CopyObject", "CompleteMultipartUpload"]
        }
    })
    .to_string()
}

/// Lets the event bus publish to the agent topic and nothing else.
pub fn topic_policy(topic_arn: &str) -> String {
    json!({
        "Version": "2012-10-17",
        "Id": "CWEventPublishtoTopic",
        "Statement": [{
            "Sid": "CWEventPublishPolicy",
            "Action": ["SNS:Publish"],
            "Effect": "Allow",
            "Resource": topic_arn,
            "Principal": {"Service": [EVENTS_SERVICE_PRINCIPAL]}
        }]
    })
    .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDeployment {
    pub region: String,
    pub topic_arn: String,
    pub subscription_arn: String,
}

impl AgentDeployment {
    pub fn physical_id(&self) -> String {
        naming::agent_physical_id(&self.region)
    }
}

pub struct AgentSys {
    events: Arc<dyn EventRuleService>,
    notifications: Arc<dyn NotificationService>,
    identity: Arc<dyn IdentityService>,
    partition: String,
}

impl AgentSys {
    pub fn new(
        events: Arc<dyn EventRuleService>,
        notifications: Arc<dyn NotificationService>,
        identity: Arc<dyn IdentityService>,
        partition: impl Into<String>,
    ) -> Self {
        Self {
            events,
            notifications,
            identity,
            partition: partition.into(),
        }
    }

    /// Every call is keyed by a fixed name, so repeating it replaces rather
    /// than duplicates.
    pub async fn ensure_agent(
        &self,
        region: &str,
        topic_base_name: &str,
        queue_arn: &str,
    ) -> Result<AgentDeployment> {
        let topic_name = naming::agent_topic_name(topic_base_name, region);
        info!(topic = %topic_name, region = %region, "deploying agent");
        let context = format!("deploy agent {topic_name} in {region}");

        let rule = EventRule {
            name: AGENT_RULE_NAME.to_string(),
            description: RULE_DESCRIPTION.to_string(),
            event_pattern: object_written_pattern(),
            state: RuleState::Disabled,
        };
        self.events
            .put_rule(region, &rule)
            .await
            .map_err(|err| err.into_convergence(&context))?;

        let topic_arn = self
            .notifications
            .create_topic(region, &topic_name)
            .await
            .map_err(|err| err.into_convergence(&context))?;
        self.notifications
            .set_topic_policy(region, &topic_arn, &topic_policy(&topic_arn))
            .await
            .map_err(|err| err.into_convergence(&context))?;

        let target = RuleTarget {
            id: naming::agent_target_id(region),
            arn: topic_arn.clone(),
        };
        self.events
            .put_target(region, AGENT_RULE_NAME, &target)
            .await
            .map_err(|err| err.into_convergence(&context))?;
        self.events
            .enable_rule(region, AGENT_RULE_NAME)
            .await
            .map_err(|err| err.into_convergence(&context))?;

        let subscription_arn = self
            .notifications
            .subscribe(region, &topic_arn, SQS_PROTOCOL, queue_arn)
            .await
            .map_err(|err| {
                err.into_convergence(&format!(
                    "subscribe topic {topic_name} to queue {queue_arn}"
                ))
            })?;

        Ok(AgentDeployment {
            region: region.to_string(),
            topic_arn,
            subscription_arn,
        })
    }

    /// Rebuilds the topic ARN from the live account id; stops at the first
    /// failed step.
    pub async fn teardown_agent(&self, region: &str, topic_base_name: &str) -> Result<()> {
        let topic_name = naming::agent_topic_name(topic_base_name, region);
        info!(topic = %topic_name, region = %region, "deleting agent");
        let context = format!("delete agent {topic_name} in {region}");

        let account_id = self
            .identity
            .account_id(region)
            .await
            .map_err(|err| err.into_convergence(&context))?;
        let topic_arn = naming::topic_arn(&self.partition, region, &account_id, &topic_name);

        self.events
            .remove_targets(region, AGENT_RULE_NAME, &[naming::agent_target_id(region)])
            .await
            .map_err(|err| err.into_convergence(&context))?;
        self.notifications
            .delete_topic(region, &topic_arn)
            .await
            .map_err(|err| err.into_convergence(&context))?;
        self.events
            .delete_rule(region, AGENT_RULE_NAME)
            .await
            .map_err(|err| err.into_convergence(&context))
    }
}
