use std::collections::BTreeSet;

use quick_xml::de::from_str as xml_from_str;
use serde::{Deserialize, Serialize};

use crate::{
    error::{CrrError, Result},
    naming,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDescriptor {
    #[serde(rename = "Name")]
    pub name: String,
}

impl BucketDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Which of the account's buckets a pass is allowed to look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketSelection {
    All,
    Named(Vec<String>),
}

impl BucketSelection {
    pub fn parse(value: &str) -> Self {
        if value == "ALL" {
            return Self::All;
        }

        Self::Named(value.split(',').map(|name| name.trim().to_string()).collect())
    }

    /// Keeps listing order; names that do not exist in `listed` are dropped.
    pub fn select(&self, listed: Vec<BucketDescriptor>) -> Vec<BucketDescriptor> {
        match self {
            Self::All => listed,
            Self::Named(names) => listed
                .into_iter()
                .filter(|bucket| names.iter().any(|name| name == &bucket.name))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename = "ReplicationConfiguration")]
pub struct ReplicationConfiguration {
    #[serde(rename = "Rule", default)]
    pub rules: Vec<ReplicationRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationRule {
    #[serde(rename = "Status")]
    pub status: RuleStatus,
    #[serde(rename = "Prefix", default)]
    pub prefix: Option<String>,
    #[serde(rename = "Filter", default)]
    pub filter: Option<ReplicationFilter>,
    #[serde(rename = "Destination")]
    pub destination: ReplicationDestination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RuleStatus {
    #[serde(rename = "Enabled")]
    Enabled,
    #[serde(rename = "Disabled")]
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationFilter {
    #[serde(rename = "Prefix", default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationDestination {
    #[serde(rename = "Bucket")]
    pub bucket: String,
}

impl ReplicationConfiguration {
    pub fn from_xml(xml: &str) -> Result<Self> {
        xml_from_str(xml)
            .map_err(|err| CrrError::InvalidArgument(format!("invalid replication xml: {err}")))
    }

    /// Only the first rule is considered. Later rules are ignored entirely.
    pub fn first_rule(&self) -> Option<&ReplicationRule> {
        self.rules.first()
    }
}

impl ReplicationRule {
    /// Legacy top-level prefix first, then the filter prefix, then empty.
    pub fn effective_prefix(&self) -> &str {
        self.prefix
            .as_deref()
            .or_else(|| self.filter.as_ref().and_then(|filter| filter.prefix.as_deref()))
            .unwrap_or("")
    }
}

/// A source bucket whose first replication rule is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationPair {
    pub source_bucket: String,
    pub destination_bucket_arn: String,
    pub destination_prefix: String,
    pub status: RuleStatus,
}

impl ReplicationPair {
    pub fn from_rule(source_bucket: &str, rule: &ReplicationRule) -> Self {
        Self {
            source_bucket: source_bucket.to_string(),
            destination_bucket_arn: rule.destination.bucket.clone(),
            destination_prefix: rule.effective_prefix().to_string(),
            status: rule.status,
        }
    }

    pub fn source_object_arn(&self, partition: &str) -> String {
        naming::source_object_arn(partition, &self.source_bucket)
    }

    pub fn destination_object_arn(&self) -> String {
        naming::destination_object_arn(&self.destination_bucket_arn, &self.destination_prefix)
    }

    pub fn destination_bucket(&self) -> Result<&str> {
        naming::destination_bucket_name(&self.destination_bucket_arn).ok_or_else(|| {
            CrrError::Discovery(format!(
                "replication destination of {} is not a bucket arn: {}",
                self.source_bucket, self.destination_bucket_arn
            ))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoredBucketSet {
    pub source_bucket_names: BTreeSet<String>,
    pub data_resource_arns: BTreeSet<String>,
}

impl MonitoredBucketSet {
    pub fn insert(&mut self, pair: &ReplicationPair, partition: &str) {
        self.source_bucket_names.insert(pair.source_bucket.clone());
        self.data_resource_arns.insert(pair.source_object_arn(partition));
        self.data_resource_arns.insert(pair.destination_object_arn());
    }
}

/// Output of one discovery pass over the candidate buckets.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub monitored: MonitoredBucketSet,
    pub pairs: Vec<ReplicationPair>,
}

impl Topology {
    /// Every bucket taking part in a replication pair, source or destination.
    pub fn participating_buckets(&self) -> Result<BTreeSet<String>> {
        let mut buckets = BTreeSet::new();
        for pair in &self.pairs {
            buckets.insert(pair.source_bucket.clone());
            buckets.insert(pair.destination_bucket()?.to_string());
        }
        Ok(buckets)
    }
}
