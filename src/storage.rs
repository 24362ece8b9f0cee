//! Object storage connectivity
//!
//! The backup subsystem writes to an S3-compatible store. This module holds
//! the connection spec supplied by the caller and a probe that verifies the
//! store is reachable and the target bucket exists, using the MinIO S3
//! client. The probe is advisory during install: an unreachable store is
//! reported, not fatal.

use async_trait::async_trait;
use minio::s3::args::BucketExistsArgs;
use minio::s3::client::Client as S3Client;
use minio::s3::creds::StaticProvider;
use minio::s3::http::BaseUrl;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use std::str::FromStr;
use tracing::debug;

use crate::error::Error;

/// Connection details for an S3-compatible object store
#[derive(Clone, Deserialize)]
pub struct StorageSpec {
    /// Endpoint URL, including scheme and port
    pub endpoint: String,
    /// Bucket backups are written to
    pub bucket: String,
    /// Region hint; S3-compatible stores usually accept any value
    #[serde(default)]
    pub region: Option<String>,
    /// Access key id
    pub access_key: String,
    /// Secret access key
    pub secret_key: String,
    /// Skip TLS certificate verification, for self-signed endpoints
    #[serde(default)]
    pub skip_tls_verify: bool,
}

impl StorageSpec {
    /// Render the AWS-style shared credentials file the backup server reads
    /// from its mounted credential secret
    pub fn aws_credentials_file(&self) -> String {
        format!(
            "[default]\naws_access_key_id = {}\naws_secret_access_key = {}\n",
            self.access_key, self.secret_key
        )
    }
}

// Credentials stay out of logs
impl std::fmt::Debug for StorageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSpec")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("skip_tls_verify", &self.skip_tls_verify)
            .finish()
    }
}

/// Object storage operations used by the executors
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStorageApi: Send + Sync {
    /// Whether the store is reachable and the spec's bucket exists
    async fn verify_bucket(&self, spec: &StorageSpec) -> Result<bool, Error>;
}

/// [`ObjectStorageApi`] backed by the MinIO S3 client
///
/// Stateless; a client is built per call from the spec since each request
/// may target a different store.
#[derive(Clone, Default)]
pub struct MinioStorage;

impl MinioStorage {
    /// Create a storage prober
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ObjectStorageApi for MinioStorage {
    async fn verify_bucket(&self, spec: &StorageSpec) -> Result<bool, Error> {
        let base_url = BaseUrl::from_str(&spec.endpoint)
            .map_err(|e| Error::storage("parse endpoint", e.to_string()))?;
        let provider = StaticProvider::new(&spec.access_key, &spec.secret_key, None);

        let ignore_cert_check = if spec.skip_tls_verify { Some(true) } else { None };
        let client = S3Client::new(base_url, Some(Box::new(provider)), None, ignore_cert_check)
            .map_err(|e| Error::storage("build client", e.to_string()))?;

        let args = BucketExistsArgs::new(&spec.bucket)
            .map_err(|e| Error::storage("bucket name", e.to_string()))?;
        let exists = client
            .bucket_exists(&args)
            .await
            .map_err(|e| Error::storage("bucket exists", e.to_string()))?;

        debug!(endpoint = %spec.endpoint, bucket = %spec.bucket, exists = exists, "Probed object storage");
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec() -> StorageSpec {
        StorageSpec {
            endpoint: "https://minio.local:9000".to_string(),
            bucket: "cluster-backups".to_string(),
            region: Some("minio".to_string()),
            access_key: "AKIA123".to_string(),
            secret_key: "s3cr3t".to_string(),
            skip_tls_verify: true,
        }
    }

    #[test]
    fn test_credentials_file_shape() {
        let rendered = sample_spec().aws_credentials_file();
        assert!(rendered.starts_with("[default]\n"));
        assert!(rendered.contains("aws_access_key_id = AKIA123"));
        assert!(rendered.contains("aws_secret_access_key = s3cr3t"));
        assert!(rendered.ends_with('\n'));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let rendered = format!("{:?}", sample_spec());
        assert!(rendered.contains("minio.local"));
        assert!(!rendered.contains("AKIA123"));
        assert!(!rendered.contains("s3cr3t"));
    }
}
