use crrmon_cloud::StorageService;
use crrmon_common::{
    BucketDescriptor, BucketSelection, ReplicationPair, RuleStatus, Topology,
    error::Result,
};
use tracing::{debug, info, warn};

/// Lists the account's buckets and narrows them to the configured selection.
pub async fn select_candidates(
    storage: &dyn StorageService,
    selection: &BucketSelection,
) -> Result<Vec<BucketDescriptor>> {
    let listed = storage
        .list_buckets()
        .await
        .map_err(|err| err.into_discovery("list buckets"))?;
    if let BucketSelection::Named(names) = selection {
        debug!(buckets = ?names, "custom bucket list");
    }
    Ok(selection.select(listed))
}

/// Classifies every candidate and collects the replicating ones.
pub async fn discover(
    storage: &dyn StorageService,
    partition: &str,
    candidates: &[BucketDescriptor],
) -> Result<Topology> {
    let mut topology = Topology::default();
    for bucket in candidates {
        let Some(pair) = classify_bucket(storage, &bucket.name).await else {
            continue;
        };
        topology.monitored.insert(&pair, partition);
        if !topology.pairs.contains(&pair) {
            topology.pairs.push(pair);
        }
    }

    info!(
        source_buckets = ?topology.monitored.source_bucket_names,
        data_resources = ?topology.monitored.data_resource_arns,
        "buckets to monitor"
    );
    Ok(topology)
}

/// `None` when the bucket does not take part in replication. A failed lookup
/// is treated the same as a missing configuration.
pub async fn classify_bucket(storage: &dyn StorageService, bucket: &str) -> Option<ReplicationPair> {
    let config = match storage.get_bucket_replication(bucket).await {
        Ok(Some(config)) => config,
        Ok(None) => {
            debug!(bucket = %bucket, "no replication configuration");
            return None;
        }
        Err(err) => {
            warn!(bucket = %bucket, error = %err, "replication configuration lookup failed");
            return None;
        }
    };

    let rule = config.first_rule()?;
    if rule.status == RuleStatus::Disabled {
        debug!(bucket = %bucket, "replication rule disabled");
        return None;
    }
    Some(ReplicationPair::from_rule(bucket, rule))
}
