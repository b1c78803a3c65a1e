use async_trait::async_trait;
use aws_sdk_s3::types as s3;
use crrmon_cloud::StorageService;
use crrmon_common::{
    BucketDescriptor, ReplicationConfiguration,
    error::Result,
    types::{ReplicationDestination, ReplicationFilter, ReplicationRule, RuleStatus},
};
use tracing::debug;

use crate::{AwsCloud, has_code, sdk_error};

const NO_REPLICATION_CODES: &[&str] = &["ReplicationConfigurationNotFoundError"];

/// Region S3 uses for buckets created without a location constraint.
const UNCONSTRAINED_REGION: &str = "us-east-1";

#[async_trait]
impl StorageService for AwsCloud {
    async fn list_buckets(&self) -> Result<Vec<BucketDescriptor>> {
        let output = self
            .s3
            .list_buckets()
            .send()
            .await
            .map_err(|err| sdk_error("s3", "ListBuckets", err))?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name())
            .map(BucketDescriptor::new)
            .collect())
    }

    /// The SDK does not follow cross-region redirects, so the lookup goes
    /// through a client in the bucket's own region.
    async fn get_bucket_replication(
        &self,
        bucket: &str,
    ) -> Result<Option<ReplicationConfiguration>> {
        let location = StorageService::get_bucket_location(self, bucket).await?;
        let region = bucket_region(location.as_deref());
        match self
            .s3_in(region)
            .get_bucket_replication()
            .bucket(bucket)
            .send()
            .await
        {
            Ok(output) => Ok(output
                .replication_configuration()
                .map(replication_from_sdk)),
            Err(err) if has_code(&err, NO_REPLICATION_CODES) => {
                debug!(bucket = %bucket, region = %region, "bucket has no replication configuration");
                Ok(None)
            }
            Err(err) => Err(sdk_error("s3", "GetBucketReplication", err)),
        }
    }

    async fn get_bucket_location(&self, bucket: &str) -> Result<Option<String>> {
        let output = self
            .s3
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(|err| sdk_error("s3", "GetBucketLocation", err))?;
        Ok(output
            .location_constraint()
            .map(|constraint| constraint.as_str().to_string())
            .filter(|region| !region.is_empty()))
    }
}

/// Maps a location constraint to the region that serves the bucket. `EU` is
/// the legacy constraint for `eu-west-1`.
pub(crate) fn bucket_region(location: Option<&str>) -> &str {
    match location {
        None | Some("") => UNCONSTRAINED_REGION,
        Some("EU") => "eu-west-1",
        Some(region) => region,
    }
}

/// Only the fields replication discovery reads are carried over.
#[allow(deprecated)]
pub fn replication_from_sdk(config: &s3::ReplicationConfiguration) -> ReplicationConfiguration {
    let rules = config
        .rules()
        .iter()
        .filter_map(|rule| {
            let destination = rule.destination()?;
            Some(ReplicationRule {
                status: match rule.status() {
                    s3::ReplicationRuleStatus::Enabled => RuleStatus::Enabled,
                    _ => RuleStatus::Disabled,
                },
                prefix: rule.prefix().map(str::to_string),
                filter: rule.filter().map(|filter| ReplicationFilter {
                    prefix: filter.prefix().map(str::to_string),
                }),
                destination: ReplicationDestination {
                    bucket: destination.bucket().to_string(),
                },
            })
        })
        .collect();

    ReplicationConfiguration { rules }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdk_configuration_maps_first_rule_fields() {
        let destination = s3::Destination::builder()
            .bucket("arn:aws:s3:::dst")
            .build()
            .unwrap();
        let rule = s3::ReplicationRule::builder()
            .id("all")
            .status(s3::ReplicationRuleStatus::Enabled)
            .filter(s3::ReplicationRuleFilter::builder().prefix("logs/").build())
            .destination(destination)
            .build()
            .unwrap();
        let config = s3::ReplicationConfiguration::builder()
            .role("arn:aws:iam::123456789012:role/crr")
            .rules(rule)
            .build()
            .unwrap();

        let mapped = replication_from_sdk(&config);

        let rule = mapped.first_rule().unwrap();
        assert_eq!(rule.status, RuleStatus::Enabled);
        assert_eq!(rule.destination.bucket, "arn:aws:s3:::dst");
        assert_eq!(rule.effective_prefix(), "logs/");
    }

    #[test]
    fn disabled_status_maps_to_disabled() {
        let rule = s3::ReplicationRule::builder()
            .status(s3::ReplicationRuleStatus::Disabled)
            .destination(s3::Destination::builder().bucket("arn:aws:s3:::dst").build().unwrap())
            .build()
            .unwrap();
        let config = s3::ReplicationConfiguration::builder()
            .role("role")
            .rules(rule)
            .build()
            .unwrap();

        assert_eq!(
            replication_from_sdk(&config).first_rule().unwrap().status,
            RuleStatus::Disabled
        );
    }

    #[test]
    fn replication_lookup_is_routed_to_the_bucket_region() {
        assert_eq!(bucket_region(Some("eu-central-1")), "eu-central-1");
        assert_eq!(bucket_region(Some("EU")), "eu-west-1");
        assert_eq!(bucket_region(Some("")), "us-east-1");
        assert_eq!(bucket_region(None), "us-east-1");
    }

    #[tokio::test]
    async fn regional_s3_clients_use_the_bucket_region() {
        let sdk_config = aws_config::SdkConfig::builder()
            .region(aws_config::Region::new("us-east-1"))
            .behavior_version(aws_config::BehaviorVersion::latest())
            .build();
        let cloud = AwsCloud::new(sdk_config);

        let client = cloud.s3_in(bucket_region(Some("ap-southeast-2")));

        assert_eq!(
            client.config().region().map(|region| region.to_string()),
            Some("ap-southeast-2".to_string())
        );
    }
}
