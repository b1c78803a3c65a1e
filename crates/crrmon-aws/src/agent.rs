use async_trait::async_trait;
use aws_sdk_dynamodb::types::{TimeToLiveSpecification, TimeToLiveStatus};
use aws_sdk_eventbridge::types::{self as events, Target};
use crrmon_cloud::{
    EventRule, EventRuleService, IdentityService, NotificationService, RuleState, RuleTarget,
    StateTableService,
};
use crrmon_common::error::{CrrError, Result};
use tracing::{debug, info};

use crate::{AwsCloud, has_code, sdk_error};

const TOPIC_POLICY_ATTRIBUTE: &str = "Policy";
const MISSING_RULE_CODES: &[&str] = &["ResourceNotFoundException"];
const MISSING_TOPIC_CODES: &[&str] = &["NotFound", "NotFoundException"];

#[async_trait]
impl NotificationService for AwsCloud {
    async fn create_topic(&self, region: &str, name: &str) -> Result<String> {
        let output = self
            .sns(region)
            .create_topic()
            .name(name)
            .send()
            .await
            .map_err(|err| sdk_error("sns", "CreateTopic", err))?;
        output
            .topic_arn()
            .map(str::to_string)
            .ok_or_else(|| CrrError::service("sns", "CreateTopic", "response carried no topic ARN"))
    }

    async fn set_topic_policy(&self, region: &str, topic_arn: &str, policy: &str) -> Result<()> {
        self.sns(region)
            .set_topic_attributes()
            .topic_arn(topic_arn)
            .attribute_name(TOPIC_POLICY_ATTRIBUTE)
            .attribute_value(policy)
            .send()
            .await
            .map_err(|err| sdk_error("sns", "SetTopicAttributes", err))?;
        Ok(())
    }

    async fn subscribe(
        &self,
        region: &str,
        topic_arn: &str,
        protocol: &str,
        endpoint: &str,
    ) -> Result<String> {
        let output = self
            .sns(region)
            .subscribe()
            .topic_arn(topic_arn)
            .protocol(protocol)
            .endpoint(endpoint)
            .return_subscription_arn(true)
            .send()
            .await
            .map_err(|err| sdk_error("sns", "Subscribe", err))?;
        Ok(output.subscription_arn().unwrap_or_default().to_string())
    }

    async fn delete_topic(&self, region: &str, topic_arn: &str) -> Result<()> {
        match self.sns(region).delete_topic().topic_arn(topic_arn).send().await {
            Ok(_) => Ok(()),
            Err(err) if has_code(&err, MISSING_TOPIC_CODES) => {
                debug!(topic = %topic_arn, "topic already absent");
                Ok(())
            }
            Err(err) => Err(sdk_error("sns", "DeleteTopic", err)),
        }
    }
}

#[async_trait]
impl EventRuleService for AwsCloud {
    async fn put_rule(&self, region: &str, rule: &EventRule) -> Result<()> {
        self.events(region)
            .put_rule()
            .name(&rule.name)
            .description(&rule.description)
            .event_pattern(&rule.event_pattern)
            .state(rule_state_to_sdk(rule.state))
            .send()
            .await
            .map_err(|err| sdk_error("events", "PutRule", err))?;
        Ok(())
    }

    async fn put_target(&self, region: &str, rule: &str, target: &RuleTarget) -> Result<()> {
        let sdk_target = Target::builder()
            .id(&target.id)
            .arn(&target.arn)
            .build()
            .map_err(|err| sdk_error("events", "PutTargets", err))?;
        let output = self
            .events(region)
            .put_targets()
            .rule(rule)
            .targets(sdk_target)
            .send()
            .await
            .map_err(|err| sdk_error("events", "PutTargets", err))?;
        if let Some(failed) = output.failed_entries().first() {
            return Err(CrrError::service(
                "events",
                "PutTargets",
                format!(
                    "target {} rejected: {}",
                    failed.target_id().unwrap_or(&target.id),
                    failed.error_message().unwrap_or("unknown error")
                ),
            ));
        }
        Ok(())
    }

    async fn enable_rule(&self, region: &str, rule: &str) -> Result<()> {
        self.events(region)
            .enable_rule()
            .name(rule)
            .send()
            .await
            .map_err(|err| sdk_error("events", "EnableRule", err))?;
        Ok(())
    }

    async fn remove_targets(&self, region: &str, rule: &str, ids: &[String]) -> Result<()> {
        match self
            .events(region)
            .remove_targets()
            .rule(rule)
            .set_ids(Some(ids.to_vec()))
            .send()
            .await
        {
            Ok(output) => match output.failed_entries().first() {
                Some(failed) => Err(CrrError::service(
                    "events",
                    "RemoveTargets",
                    failed.error_message().unwrap_or("unknown error"),
                )),
                None => Ok(()),
            },
            Err(err) if has_code(&err, MISSING_RULE_CODES) => {
                debug!(rule = %rule, region = %region, "rule already absent");
                Ok(())
            }
            Err(err) => Err(sdk_error("events", "RemoveTargets", err)),
        }
    }

    async fn delete_rule(&self, region: &str, rule: &str) -> Result<()> {
        match self.events(region).delete_rule().name(rule).send().await {
            Ok(_) => Ok(()),
            Err(err) if has_code(&err, MISSING_RULE_CODES) => Ok(()),
            Err(err) => Err(sdk_error("events", "DeleteRule", err)),
        }
    }
}

fn rule_state_to_sdk(state: RuleState) -> events::RuleState {
    match state {
        RuleState::Enabled => events::RuleState::Enabled,
        RuleState::Disabled => events::RuleState::Disabled,
    }
}

#[async_trait]
impl IdentityService for AwsCloud {
    async fn account_id(&self, region: &str) -> Result<String> {
        let output = self
            .sts(region)
            .get_caller_identity()
            .send()
            .await
            .map_err(|err| sdk_error("sts", "GetCallerIdentity", err))?;
        output.account().map(str::to_string).ok_or_else(|| {
            CrrError::service("sts", "GetCallerIdentity", "response carried no account id")
        })
    }
}

#[async_trait]
impl StateTableService for AwsCloud {
    async fn enable_time_to_live(&self, region: &str, table: &str, attribute: &str) -> Result<()> {
        let client = self.dynamodb(region);
        let current = client
            .describe_time_to_live()
            .table_name(table)
            .send()
            .await
            .map_err(|err| sdk_error("dynamodb", "DescribeTimeToLive", err))?;
        let already_enabled = current.time_to_live_description().is_some_and(|description| {
            matches!(
                description.time_to_live_status(),
                Some(TimeToLiveStatus::Enabled | TimeToLiveStatus::Enabling)
            ) && description.attribute_name() == Some(attribute)
        });
        if already_enabled {
            debug!(table = %table, attribute = %attribute, "time to live already enabled");
            return Ok(());
        }

        let specification = TimeToLiveSpecification::builder()
            .enabled(true)
            .attribute_name(attribute)
            .build()
            .map_err(|err| sdk_error("dynamodb", "UpdateTimeToLive", err))?;
        client
            .update_time_to_live()
            .table_name(table)
            .time_to_live_specification(specification)
            .send()
            .await
            .map_err(|err| sdk_error("dynamodb", "UpdateTimeToLive", err))?;
        info!(table = %table, attribute = %attribute, region = %region, "time to live enabled");
        Ok(())
    }
}
