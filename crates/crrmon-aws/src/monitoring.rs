use async_trait::async_trait;
use aws_sdk_cloudtrail::types as trail;
use aws_sdk_cloudwatch::{primitives::DateTime, types as cw};
use crrmon_cloud::{
    AlarmDefinition, Dimension, EventSelector, MetricDatum, MetricsService, TrailService,
    TrailStatus,
};
use crrmon_common::error::Result;
use tracing::debug;

use crate::{AwsCloud, has_code, sdk_error};

/// Upper bound on names accepted by a single DeleteAlarms call.
pub const DELETE_ALARMS_BATCH: usize = 100;

const MISSING_ALARM_CODES: &[&str] = &["ResourceNotFound", "ResourceNotFoundException"];

#[async_trait]
impl TrailService for AwsCloud {
    async fn describe_trail(&self, name: &str) -> Result<Option<TrailStatus>> {
        let output = self
            .cloudtrail
            .describe_trails()
            .trail_name_list(name)
            .send()
            .await
            .map_err(|err| sdk_error("cloudtrail", "DescribeTrails", err))?;
        Ok(output.trail_list().first().map(|found| TrailStatus {
            name: found.name().unwrap_or(name).to_string(),
            is_multi_region_trail: found.is_multi_region_trail().unwrap_or(false),
            include_global_service_events: found
                .include_global_service_events()
                .unwrap_or(false),
            log_file_validation_enabled: found.log_file_validation_enabled().unwrap_or(false),
        }))
    }

    async fn put_event_selectors(&self, trail_name: &str, selectors: &[EventSelector]) -> Result<()> {
        let selectors = selectors.iter().map(event_selector_to_sdk).collect();
        self.cloudtrail
            .put_event_selectors()
            .trail_name(trail_name)
            .set_event_selectors(Some(selectors))
            .send()
            .await
            .map_err(|err| sdk_error("cloudtrail", "PutEventSelectors", err))?;
        Ok(())
    }
}

fn event_selector_to_sdk(selector: &EventSelector) -> trail::EventSelector {
    let data_resources = selector
        .data_resources
        .iter()
        .map(|resource| {
            trail::DataResource::builder()
                .r#type(&resource.resource_type)
                .set_values(Some(resource.values.clone()))
                .build()
        })
        .collect();
    trail::EventSelector::builder()
        .read_write_type(trail::ReadWriteType::All)
        .include_management_events(selector.include_management_events)
        .set_data_resources(Some(data_resources))
        .build()
}

#[async_trait]
impl MetricsService for AwsCloud {
    async fn put_metric_data(&self, datum: &MetricDatum) -> Result<()> {
        self.cloudwatch
            .put_metric_data()
            .namespace(&datum.namespace)
            .metric_data(metric_datum_to_sdk(datum))
            .send()
            .await
            .map_err(|err| sdk_error("cloudwatch", "PutMetricData", err))?;
        Ok(())
    }

    async fn put_metric_alarm(&self, alarm: &AlarmDefinition) -> Result<()> {
        self.cloudwatch
            .put_metric_alarm()
            .alarm_name(&alarm.name)
            .alarm_description(&alarm.description)
            .actions_enabled(alarm.actions_enabled)
            .set_alarm_actions(Some(alarm.alarm_actions.clone()))
            .namespace(&alarm.namespace)
            .metric_name(&alarm.metric_name)
            .set_dimensions(Some(dimensions_to_sdk(&alarm.dimensions)))
            .statistic(cw::Statistic::from(alarm.statistic.as_str()))
            .period(alarm.period_seconds)
            .evaluation_periods(alarm.evaluation_periods)
            .threshold(alarm.threshold)
            .comparison_operator(cw::ComparisonOperator::from(
                alarm.comparison_operator.as_str(),
            ))
            .send()
            .await
            .map_err(|err| sdk_error("cloudwatch", "PutMetricAlarm", err))?;
        Ok(())
    }

    async fn describe_alarm_names(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .cloudwatch
                .describe_alarms()
                .alarm_name_prefix(prefix)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|err| sdk_error("cloudwatch", "DescribeAlarms", err))?;
            names.extend(
                output
                    .metric_alarms()
                    .iter()
                    .filter_map(|alarm| alarm.alarm_name())
                    .map(str::to_string),
            );
            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }
        Ok(names)
    }

    async fn delete_alarms(&self, names: &[String]) -> Result<()> {
        for batch in names.chunks(DELETE_ALARMS_BATCH) {
            match self
                .cloudwatch
                .delete_alarms()
                .set_alarm_names(Some(batch.to_vec()))
                .send()
                .await
            {
                Ok(_) => {}
                Err(err) if has_code(&err, MISSING_ALARM_CODES) => {
                    debug!(alarms = ?batch, "alarms already absent");
                }
                Err(err) => return Err(sdk_error("cloudwatch", "DeleteAlarms", err)),
            }
        }
        Ok(())
    }
}

fn metric_datum_to_sdk(datum: &MetricDatum) -> cw::MetricDatum {
    cw::MetricDatum::builder()
        .metric_name(&datum.metric_name)
        .set_dimensions(Some(dimensions_to_sdk(&datum.dimensions)))
        .value(datum.value)
        .timestamp(DateTime::from_secs(datum.timestamp.timestamp()))
        .build()
}

fn dimensions_to_sdk(dimensions: &[Dimension]) -> Vec<cw::Dimension> {
    dimensions
        .iter()
        .map(|dimension| {
            cw::Dimension::builder()
                .name(&dimension.name)
                .value(&dimension.value)
                .build()
        })
        .collect()
}
