use std::{
    collections::{BTreeMap, BTreeSet},
    str::FromStr,
};

use crrmon_cloud::CloudServices;
use crrmon_common::{
    BucketDescriptor, MonitorSettings, ProvisioningRequest, ProvisioningResponse, RequestType,
    ResourceProperties,
    error::{CrrError, Result},
    naming::{self, TRAIL_ALARM_PHYSICAL_ID},
};
use tracing::{error, info};

use crate::{
    agent::AgentSys,
    discovery::{discover, select_candidates},
    regions::resolve_regions,
    trail_alarm::TrailAlarmSys,
};

/// Attribute holding the expiry timestamp of replication state records.
pub const TIME_TO_LIVE_ATTRIBUTE: &str = "itemttl";
pub const TOPIC_ARN_DATA_KEY: &str = "TopicArn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorResource {
    TrailAlarm,
    Agent,
}

impl MonitorResource {
    pub fn from_request(request: &ProvisioningRequest) -> Result<Self> {
        let resource_type = request.resource_type.as_deref().ok_or_else(|| {
            CrrError::InvalidArgument(
                "ResourceType is missing and no resource kind was configured".to_string(),
            )
        })?;
        let name = resource_type
            .strip_prefix("Custom::")
            .unwrap_or(resource_type);
        match name {
            "CRRMonitorTrailAlarm" | "TrailAlarm" => Ok(Self::TrailAlarm),
            "CRRAgent" | "CRRMonitorAgent" | "Agent" => Ok(Self::Agent),
            other => Err(CrrError::InvalidArgument(format!(
                "unsupported resource type: {other}"
            ))),
        }
    }

    pub fn default_physical_id(&self, settings: &MonitorSettings) -> String {
        match self {
            Self::TrailAlarm => TRAIL_ALARM_PHYSICAL_ID.to_string(),
            Self::Agent => naming::agent_physical_id(&settings.default_region),
        }
    }
}

impl FromStr for MonitorResource {
    type Err = CrrError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "trail-alarm" => Ok(Self::TrailAlarm),
            "agent" => Ok(Self::Agent),
            other => Err(CrrError::InvalidArgument(format!(
                "unknown resource kind {other}, expected trail-alarm or agent"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub physical_resource_id: String,
    pub data: Option<BTreeMap<String, String>>,
}

impl Outcome {
    fn id(physical_resource_id: impl Into<String>) -> Self {
        Self {
            physical_resource_id: physical_resource_id.into(),
            data: None,
        }
    }
}

pub struct ControllerSys {
    services: CloudServices,
    settings: MonitorSettings,
    trail_alarm: TrailAlarmSys,
    agent: AgentSys,
}

impl ControllerSys {
    pub fn new(services: CloudServices, settings: MonitorSettings) -> Self {
        let trail_alarm = TrailAlarmSys::new(services.trails.clone(), services.metrics.clone());
        let agent = AgentSys::new(
            services.events.clone(),
            services.notifications.clone(),
            services.identity.clone(),
            settings.partition.clone(),
        );
        Self {
            services,
            settings,
            trail_alarm,
            agent,
        }
    }

    /// Runs one request to completion and folds any failure into a `FAILED`
    /// response.
    pub async fn handle(
        &self,
        request: &ProvisioningRequest,
        resource: Option<MonitorResource>,
    ) -> ProvisioningResponse {
        let resource = match resource.map_or_else(|| MonitorResource::from_request(request), Ok) {
            Ok(resource) => resource,
            Err(err) => {
                error!(request_id = %request.request_id, error = %err, "cannot route request");
                return ProvisioningResponse::failure(request, &request.logical_resource_id, &err);
            }
        };

        info!(
            request_id = %request.request_id,
            request_type = ?request.request_type,
            resource = ?resource,
            "handling provisioning request"
        );
        match self.execute(resource, request).await {
            Ok(outcome) => {
                info!(
                    request_id = %request.request_id,
                    physical_resource_id = %outcome.physical_resource_id,
                    "provisioning request succeeded"
                );
                ProvisioningResponse::success(request, outcome.physical_resource_id, outcome.data)
            }
            Err(err) => {
                error!(
                    request_id = %request.request_id,
                    kind = err.kind(),
                    error = %err,
                    "provisioning request failed"
                );
                ProvisioningResponse::failure(
                    request,
                    &resource.default_physical_id(&self.settings),
                    &err,
                )
            }
        }
    }

    pub async fn execute(
        &self,
        resource: MonitorResource,
        request: &ProvisioningRequest,
    ) -> Result<Outcome> {
        let props = &request.resource_properties;
        match (resource, request.request_type) {
            (MonitorResource::TrailAlarm, RequestType::Create) => {
                self.setup_trail_alarm(props, false).await
            }
            (MonitorResource::TrailAlarm, RequestType::Update) => {
                self.setup_trail_alarm(props, true).await
            }
            (MonitorResource::TrailAlarm, RequestType::Delete) => {
                self.delete_trail_alarm(props).await?;
                Ok(self.retained_id(resource, request))
            }
            (MonitorResource::Agent, RequestType::Create | RequestType::Update) => {
                self.setup_agents(props).await
            }
            (MonitorResource::Agent, RequestType::Delete) => {
                self.delete_agents(props).await?;
                Ok(self.retained_id(resource, request))
            }
        }
    }

    async fn setup_trail_alarm(&self, props: &ResourceProperties, is_update: bool) -> Result<Outcome> {
        let trail_name = props.trail_name()?;
        let alarm_topic_arn = props.sns_topic_arn()?;
        let candidates = self.candidates(props).await?;
        let topology = discover(
            self.services.storage.as_ref(),
            &self.settings.partition,
            &candidates,
        )
        .await?;

        let orphan_scope: Option<BTreeSet<String>> =
            is_update.then(|| candidates.iter().map(|bucket| bucket.name.clone()).collect());
        self.trail_alarm
            .reconcile(
                trail_name,
                alarm_topic_arn,
                &topology.monitored,
                orphan_scope.as_ref(),
            )
            .await?;
        Ok(Outcome::id(TRAIL_ALARM_PHYSICAL_ID))
    }

    async fn delete_trail_alarm(&self, props: &ResourceProperties) -> Result<()> {
        let trail_name = props.trail_name()?;
        let names: Vec<String> = self
            .candidates(props)
            .await?
            .into_iter()
            .map(|bucket| bucket.name)
            .collect();
        self.trail_alarm.teardown(trail_name, &names).await
    }

    async fn setup_agents(&self, props: &ResourceProperties) -> Result<Outcome> {
        let topic_base_name = props.topic()?;
        let queue_arn = props.queue_arn()?;
        let table_name = props.table_name()?;
        let monitor_region = props.monitor_region()?;

        let regions = self.agent_regions(props).await?;
        self.services
            .state_table
            .enable_time_to_live(monitor_region, table_name, TIME_TO_LIVE_ATTRIBUTE)
            .await
            .map_err(|err| {
                err.into_convergence(&format!("enable time to live on {table_name}"))
            })?;

        let mut outcome = Outcome::id(naming::agent_physical_id(&self.settings.default_region));
        for region in &regions {
            let deployment = self
                .agent
                .ensure_agent(region, topic_base_name, queue_arn)
                .await?;
            outcome = Outcome {
                physical_resource_id: deployment.physical_id(),
                data: Some(BTreeMap::from([(
                    TOPIC_ARN_DATA_KEY.to_string(),
                    deployment.topic_arn,
                )])),
            };
        }
        Ok(outcome)
    }

    async fn delete_agents(&self, props: &ResourceProperties) -> Result<()> {
        let topic_base_name = props.topic()?;
        for region in &self.agent_regions(props).await? {
            self.agent.teardown_agent(region, topic_base_name).await?;
        }
        Ok(())
    }

    async fn agent_regions(&self, props: &ResourceProperties) -> Result<BTreeSet<String>> {
        let candidates = self.candidates(props).await?;
        let topology = discover(
            self.services.storage.as_ref(),
            &self.settings.partition,
            &candidates,
        )
        .await?;
        let buckets = topology.participating_buckets()?;
        resolve_regions(
            self.services.storage.as_ref(),
            &self.settings.default_region,
            &buckets,
        )
        .await
    }

    async fn candidates(&self, props: &ResourceProperties) -> Result<Vec<BucketDescriptor>> {
        let selection = props.bucket_selection()?;
        select_candidates(self.services.storage.as_ref(), &selection).await
    }

    fn retained_id(&self, resource: MonitorResource, request: &ProvisioningRequest) -> Outcome {
        Outcome::id(
            request
                .physical_resource_id
                .clone()
                .unwrap_or_else(|| resource.default_physical_id(&self.settings)),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crrmon_cloud::{MemoryCloud, RuleState, TrailStatus};
    use crrmon_common::envelope::ResponseStatus;

    use super::*;

    const TRAIL: &str = "crr-trail";
    const ALARM_TOPIC: &str = "arn:aws:sns:us-east-1:123456789012:crr-alarms";
    const QUEUE: &str = "arn:aws:sqs:us-east-1:123456789012:CRRMonitor";

    fn replication_xml(destination: &str) -> String {
        format!(
            "<ReplicationConfiguration><Role>arn:aws:iam::123456789012:role/crr</Role>\
             <Rule><ID>all</ID><Status>Enabled</Status>\
             <Destination><Bucket>{destination}</Bucket></Destination></Rule>\
             </ReplicationConfiguration>"
        )
    }

    fn cloud() -> Arc<MemoryCloud> {
        let cloud = Arc::new(MemoryCloud::new());
        cloud.add_bucket("src", None);
        cloud.add_bucket("dst", Some("eu-west-1"));
        cloud.add_bucket("other", Some("eu-west-1"));
        cloud
            .set_replication_xml("src", &replication_xml("arn:aws:s3:::dst"))
            .unwrap();
        cloud.add_trail(TrailStatus {
            name: TRAIL.to_string(),
            is_multi_region_trail: true,
            include_global_service_events: true,
            log_file_validation_enabled: true,
        });
        cloud
    }

    fn controller(cloud: &Arc<MemoryCloud>) -> ControllerSys {
        ControllerSys::new(
            CloudServices::from_backend(cloud.clone()),
            MonitorSettings::default(),
        )
    }

    fn request(request_type: RequestType, resource_type: &str, buckets: &str) -> ProvisioningRequest {
        serde_json::from_value(serde_json::json!({
            "RequestType": request_type,
            "ResourceType": resource_type,
            "StackId": "stack",
            "RequestId": "request",
            "LogicalResourceId": "Logical",
            "ResourceProperties": {
                "trail_name": TRAIL,
                "sns_topic_arn": ALARM_TOPIC,
                "Topic": "CRRMonitor",
                "CRRQueueArn": QUEUE,
                "CRRMonitorTable": "CRRMonitor",
                "MonitorRegion": "us-east-1",
                "buckets": buckets
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn create_trail_alarm_monitors_only_replicating_pair() {
        let cloud = cloud();
        let controller = controller(&cloud);

        let response = controller
            .handle(
                &request(RequestType::Create, "Custom::CRRMonitorTrailAlarm", "ALL"),
                None,
            )
            .await;

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.physical_resource_id, "CRRMonitorTrailAlarm");
        let selectors = cloud.selectors(TRAIL).unwrap();
        assert_eq!(
            selectors[0].data_resource_values().collect::<Vec<_>>(),
            vec!["arn:aws:s3:::dst/", "arn:aws:s3:::src/"]
        );
        assert_eq!(cloud.alarm_names(), vec!["FailedReplicationAlarm-src".to_string()]);
    }

    #[tokio::test]
    async fn update_cleans_up_alarms_of_buckets_removed_from_the_list() {
        let cloud = cloud();
        let controller = controller(&cloud);
        controller
            .handle(
                &request(RequestType::Create, "Custom::CRRMonitorTrailAlarm", "ALL"),
                None,
            )
            .await;
        cloud.add_alarm(crate::trail_alarm::failed_replication_alarm("other", ALARM_TOPIC));

        let response = controller
            .handle(
                &request(RequestType::Update, "Custom::CRRMonitorTrailAlarm", "src"),
                None,
            )
            .await;

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(cloud.alarm_names(), vec!["FailedReplicationAlarm-src".to_string()]);
    }

    #[tokio::test]
    async fn delete_trail_alarm_clears_selectors_for_every_listed_bucket() {
        let cloud = cloud();
        let controller = controller(&cloud);
        controller
            .handle(
                &request(RequestType::Create, "Custom::CRRMonitorTrailAlarm", "ALL"),
                None,
            )
            .await;
        cloud.clear_calls();

        let mut delete = request(RequestType::Delete, "Custom::CRRMonitorTrailAlarm", "ALL");
        delete.physical_resource_id = Some("CRRMonitorTrailAlarm".to_string());
        let response = controller.handle(&delete, None).await;

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.physical_resource_id, "CRRMonitorTrailAlarm");
        assert_eq!(cloud.selectors(TRAIL).unwrap()[0].data_resource_values().count(), 0);
        assert!(cloud.alarm_names().is_empty());
        let deletes: Vec<_> = cloud
            .calls()
            .into_iter()
            .filter(|call| call.starts_with("DeleteAlarms"))
            .collect();
        assert_eq!(
            deletes,
            vec![
                "DeleteAlarms FailedReplicationAlarm-dst".to_string(),
                "DeleteAlarms FailedReplicationAlarm-other".to_string(),
                "DeleteAlarms FailedReplicationAlarm-src".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn agent_create_deploys_one_tuple_per_region() {
        let cloud = cloud();
        let controller = controller(&cloud);

        let response = controller
            .handle(&request(RequestType::Create, "Custom::CRRAgent", "ALL"), None)
            .await;

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.physical_resource_id, "CRRMonitorAgent-us-east-1");
        assert_eq!(
            response.data.unwrap().get(TOPIC_ARN_DATA_KEY).map(String::as_str),
            Some("arn:aws:sns:us-east-1:123456789012:CRRMonitor-us-east-1")
        );

        for region in ["eu-west-1", "us-east-1"] {
            let rule = cloud.rule(region, "CRRAgent").unwrap();
            assert_eq!(rule.rule.state, RuleState::Enabled);
            assert_eq!(rule.targets.len(), 1);
        }
        let topics = cloud.topics();
        assert_eq!(topics.len(), 2);
        assert!(topics.iter().all(|topic| topic.subscriptions.len() == 1));
        assert_eq!(
            cloud.time_to_live("us-east-1", "CRRMonitor").as_deref(),
            Some("itemttl")
        );
    }

    #[tokio::test]
    async fn agent_update_reconverges_without_duplicates() {
        let cloud = cloud();
        let controller = controller(&cloud);
        let created = controller
            .handle(&request(RequestType::Create, "Custom::CRRAgent", "ALL"), None)
            .await;
        let topics_after_create = cloud.topics();
        let rules_after_create = cloud.rules();
        cloud.clear_calls();

        let mut update = request(RequestType::Update, "Custom::CRRAgent", "ALL");
        update.physical_resource_id = Some(created.physical_resource_id.clone());
        let updated = controller.handle(&update, None).await;

        assert_eq!(updated.status, ResponseStatus::Success);
        assert_eq!(updated.physical_resource_id, "CRRMonitorAgent-us-east-1");
        assert_eq!(updated.data, created.data);
        assert_eq!(cloud.topics(), topics_after_create);
        assert_eq!(cloud.rules(), rules_after_create);
        assert!(
            cloud
                .topics()
                .iter()
                .all(|topic| topic.subscriptions.len() == 1)
        );
        assert!(
            cloud
                .calls()
                .contains(&"UpdateTimeToLive us-east-1/CRRMonitor".to_string())
        );
        let subscribes = cloud
            .calls()
            .iter()
            .filter(|call| call.starts_with("Subscribe"))
            .count();
        assert_eq!(subscribes, 2);
    }

    #[tokio::test]
    async fn agent_without_replication_keeps_default_id() {
        let cloud = Arc::new(MemoryCloud::new());
        cloud.add_bucket("plain", Some("eu-west-1"));
        let controller = controller(&cloud);

        let response = controller
            .handle(&request(RequestType::Create, "Custom::CRRAgent", "ALL"), None)
            .await;

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.physical_resource_id, "CRRMonitorAgent-us-east-1");
        assert!(response.data.is_none());
        assert!(cloud.topics().is_empty());
    }

    #[tokio::test]
    async fn agent_delete_tears_down_every_region() {
        let cloud = cloud();
        let controller = controller(&cloud);
        controller
            .handle(&request(RequestType::Create, "Custom::CRRAgent", "ALL"), None)
            .await;

        let response = controller
            .handle(
                &request(RequestType::Delete, "Custom::CRRAgent", "ALL"),
                Some(MonitorResource::Agent),
            )
            .await;

        assert_eq!(response.status, ResponseStatus::Success);
        assert!(cloud.topics().is_empty());
        assert!(cloud.rules().is_empty());
    }

    #[tokio::test]
    async fn time_to_live_failure_fails_before_any_agent() {
        let cloud = cloud();
        cloud.fail_operation("UpdateTimeToLive");
        let controller = controller(&cloud);

        let response = controller
            .handle(&request(RequestType::Create, "Custom::CRRAgent", "ALL"), None)
            .await;

        assert_eq!(response.status, ResponseStatus::Failed);
        assert!(response.reason.unwrap().starts_with("ConvergenceError"));
        assert!(cloud.rules().is_empty());
    }

    #[tokio::test]
    async fn unknown_resource_type_fails_the_request() {
        let cloud = cloud();
        let controller = controller(&cloud);

        let response = controller
            .handle(&request(RequestType::Create, "Custom::Other", "ALL"), None)
            .await;

        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.physical_resource_id, "Logical");
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn resource_kind_parses_from_cli_names() {
        assert_eq!("agent".parse::<MonitorResource>().unwrap(), MonitorResource::Agent);
        assert_eq!(
            "trail-alarm".parse::<MonitorResource>().unwrap(),
            MonitorResource::TrailAlarm
        );
        assert!("both".parse::<MonitorResource>().is_err());
    }
}
