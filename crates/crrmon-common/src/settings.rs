pub const DEFAULT_PARTITION: &str = "aws";
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    /// ARN partition, `aws` outside of China and GovCloud.
    pub partition: String,
    /// Region that S3 reports as an absent location constraint.
    pub default_region: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            partition: DEFAULT_PARTITION.to_string(),
            default_region: DEFAULT_REGION.to_string(),
        }
    }
}

impl MonitorSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str, fallback: &str| {
            lookup(key)
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };

        Self {
            partition: read("CRRMON_PARTITION", DEFAULT_PARTITION),
            default_region: read("CRRMON_DEFAULT_REGION", DEFAULT_REGION),
        }
    }
}
