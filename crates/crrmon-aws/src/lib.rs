//! Collaborator traits backed by the AWS SDK.
//!
//! Account-wide calls (bucket listing and location, CloudTrail, CloudWatch)
//! use one client built from the loaded SDK configuration. Regional calls
//! (bucket replication, SNS, EventBridge, STS, DynamoDB) get a client per
//! region, built lazily and cached.

mod agent;
mod monitoring;
mod storage;

use std::{collections::HashMap, sync::Mutex};

use aws_config::{BehaviorVersion, SdkConfig};
use aws_smithy_types::error::{display::DisplayErrorContext, metadata::ProvideErrorMetadata};
use crrmon_common::error::CrrError;

pub use storage::replication_from_sdk;

pub struct AwsCloud {
    sdk_config: SdkConfig,
    s3: aws_sdk_s3::Client,
    cloudtrail: aws_sdk_cloudtrail::Client,
    cloudwatch: aws_sdk_cloudwatch::Client,
    regional_s3: RegionalClients<aws_sdk_s3::Client>,
    sns: RegionalClients<aws_sdk_sns::Client>,
    events: RegionalClients<aws_sdk_eventbridge::Client>,
    sts: RegionalClients<aws_sdk_sts::Client>,
    dynamodb: RegionalClients<aws_sdk_dynamodb::Client>,
}

impl AwsCloud {
    /// Loads credentials and the home region from the standard provider chain.
    pub async fn from_env() -> Self {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(sdk_config)
    }

    pub fn new(sdk_config: SdkConfig) -> Self {
        Self {
            s3: aws_sdk_s3::Client::new(&sdk_config),
            cloudtrail: aws_sdk_cloudtrail::Client::new(&sdk_config),
            cloudwatch: aws_sdk_cloudwatch::Client::new(&sdk_config),
            regional_s3: RegionalClients::default(),
            sns: RegionalClients::default(),
            events: RegionalClients::default(),
            sts: RegionalClients::default(),
            dynamodb: RegionalClients::default(),
            sdk_config,
        }
    }

    fn s3_in(&self, region: &str) -> aws_sdk_s3::Client {
        self.regional_s3.get_or_build(region, || {
            let config = aws_sdk_s3::config::Builder::from(&self.sdk_config)
                .region(aws_sdk_s3::config::Region::new(region.to_string()))
                .build();
            aws_sdk_s3::Client::from_conf(config)
        })
    }

    fn sns(&self, region: &str) -> aws_sdk_sns::Client {
        self.sns.get_or_build(region, || {
            let config = aws_sdk_sns::config::Builder::from(&self.sdk_config)
                .region(aws_sdk_sns::config::Region::new(region.to_string()))
                .build();
            aws_sdk_sns::Client::from_conf(config)
        })
    }

    fn events(&self, region: &str) -> aws_sdk_eventbridge::Client {
        self.events.get_or_build(region, || {
            let config = aws_sdk_eventbridge::config::Builder::from(&self.sdk_config)
                .region(aws_sdk_eventbridge::config::Region::new(region.to_string()))
                .build();
            aws_sdk_eventbridge::Client::from_conf(config)
        })
    }

    fn sts(&self, region: &str) -> aws_sdk_sts::Client {
        self.sts.get_or_build(region, || {
            let config = aws_sdk_sts::config::Builder::from(&self.sdk_config)
                .region(aws_sdk_sts::config::Region::new(region.to_string()))
                .build();
            aws_sdk_sts::Client::from_conf(config)
        })
    }

    fn dynamodb(&self, region: &str) -> aws_sdk_dynamodb::Client {
        self.dynamodb.get_or_build(region, || {
            let config = aws_sdk_dynamodb::config::Builder::from(&self.sdk_config)
                .region(aws_sdk_dynamodb::config::Region::new(region.to_string()))
                .build();
            aws_sdk_dynamodb::Client::from_conf(config)
        })
    }
}

/// SDK clients are cheap to clone and share one connection pool.
struct RegionalClients<C> {
    clients: Mutex<HashMap<String, C>>,
}

impl<C> Default for RegionalClients<C> {
    fn default() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }
}

impl<C: Clone> RegionalClients<C> {
    fn get_or_build(&self, region: &str, build: impl FnOnce() -> C) -> C {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        clients
            .entry(region.to_string())
            .or_insert_with(build)
            .clone()
    }
}

fn sdk_error<E>(service: &'static str, operation: &'static str, err: E) -> CrrError
where
    E: std::error::Error,
{
    CrrError::service(service, operation, DisplayErrorContext(err))
}

fn has_code<E: ProvideErrorMetadata>(err: &E, codes: &[&str]) -> bool {
    err.code().is_some_and(|code| codes.contains(&code))
}
