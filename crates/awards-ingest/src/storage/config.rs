use awards_common::error::{env_or, first_env};
use serde::{Deserialize, Serialize};

/// S3 connection settings for the raw award bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    /// Static credentials; both unset means the default AWS provider chain
    pub access_key: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: first_env(&["S3_ENDPOINT"]),
            region: first_env(&["S3_REGION", "AWS_REGION"])
                .unwrap_or_else(|| "us-east-1".to_string()),
            bucket: first_env(&["S3_BUCKET", "S3_BUCKET_RAW"]).unwrap_or_default(),
            access_key: first_env(&["S3_ACCESS_KEY", "AWS_ACCESS_KEY_ID"]),
            secret_key: first_env(&["S3_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"]),
            path_style: env_or("S3_PATH_STYLE", false)?,
        })
    }

    /// Local S3-compatible endpoint with static keys
    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            bucket: bucket.into(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bucket.trim().is_empty() {
            anyhow::bail!("S3 bucket is not set (S3_BUCKET or S3_BUCKET_RAW)");
        }
        if self.access_key.is_some() != self.secret_key.is_some() {
            anyhow::bail!("S3 access key and secret key must be set together");
        }
        Ok(())
    }
}
