use std::collections::BTreeSet;

use crrmon_cloud::StorageService;
use crrmon_common::error::Result;
use tracing::info;

/// Distinct regions of the given buckets, in sorted order.
pub async fn resolve_regions<I, S>(
    storage: &dyn StorageService,
    default_region: &str,
    buckets: I,
) -> Result<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut regions = BTreeSet::new();
    for bucket in buckets {
        regions.insert(resolve_region(storage, default_region, bucket.as_ref()).await?);
    }
    info!(regions = ?regions, "agent regions");
    Ok(regions)
}

pub async fn resolve_region(
    storage: &dyn StorageService,
    default_region: &str,
    bucket: &str,
) -> Result<String> {
    let location = storage
        .get_bucket_location(bucket)
        .await
        .map_err(|err| err.into_discovery(&format!("locate bucket {bucket}")))?;
    Ok(normalize_location(location.as_deref(), default_region))
}

/// S3 reports buckets in the original region with an empty constraint.
pub fn normalize_location(location: Option<&str>, default_region: &str) -> String {
    match location {
        Some(region) if !region.is_empty() => region.to_string(),
        _ => default_region.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crrmon_cloud::MemoryCloud;

    use super::*;

    #[tokio::test]
    async fn empty_constraint_merges_with_explicit_default_region() {
        let cloud = MemoryCloud::new();
        cloud.add_bucket("legacy", None);
        cloud.add_bucket("explicit", Some("us-east-1"));
        cloud.add_bucket("dublin", Some("eu-west-1"));

        let regions = resolve_regions(&cloud, "us-east-1", ["legacy", "explicit"])
            .await
            .unwrap();
        assert_eq!(regions.len(), 1);
        assert!(regions.contains("us-east-1"));

        let regions = resolve_regions(&cloud, "us-east-1", ["legacy", "dublin", "explicit"])
            .await
            .unwrap();
        assert_eq!(
            regions.into_iter().collect::<Vec<_>>(),
            vec!["eu-west-1".to_string(), "us-east-1".to_string()]
        );
    }

    #[tokio::test]
    async fn no_buckets_resolve_to_no_regions() {
        let cloud = MemoryCloud::new();
        let regions = resolve_regions(&cloud, "us-east-1", Vec::<String>::new())
            .await
            .unwrap();
        assert!(regions.is_empty());
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_bucket_is_a_discovery_error() {
        let cloud = MemoryCloud::new();
        let err = resolve_regions(&cloud, "us-east-1", ["ghost"]).await.unwrap_err();
        assert_eq!(err.kind(), "DiscoveryError");
    }

    #[test]
    fn normalize_location_keeps_explicit_regions() {
        assert_eq!(normalize_location(Some("ap-south-1"), "us-east-1"), "ap-south-1");
        assert_eq!(normalize_location(Some(""), "us-east-1"), "us-east-1");
        assert_eq!(normalize_location(None, "us-east-1"), "us-east-1");
    }
}
