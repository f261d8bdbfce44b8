use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use crate::config::AppConfig;

/// Hot object storage. Archive storage has no client here: archived bytes are
/// only reachable through an external restore step, so the backend records
/// archive paths but never reads them directly.
#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn put_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<()>;

    async fn create_signed_url(&self, path: &str, expires_in: Duration) -> Result<String>;

    async fn get_object(&self, path: &str) -> Result<Vec<u8>>;

    async fn remove_object(&self, path: &str) -> Result<()>;
}

/// Connection settings for the hot bucket, narrowed out of `AppConfig` so the
/// storage layer only sees the fields it actually needs.
#[derive(Debug, Clone)]
pub struct HotStorageSettings {
    pub region: String,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub bucket: String,
}

impl HotStorageSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            region: config.aws_region.clone(),
            endpoint_url: config.aws_endpoint_url.clone(),
            access_key_id: config.aws_access_key_id.clone(),
            secret_access_key: config.aws_secret_access_key.clone(),
            bucket: config.s3_hot_bucket.clone(),
        }
    }
}

pub struct S3HotStorage {
    client: S3Client,
    bucket: String,
}

impl S3HotStorage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Builds the S3 client and wraps it around the hot bucket. Static
    /// credentials and a custom endpoint are only set when configured, so the
    /// default provider chain still works in real AWS deployments; path-style
    /// addressing keeps MinIO-style endpoints working locally.
    pub async fn connect(settings: HotStorageSettings) -> Result<Self> {
        let region_provider = RegionProviderChain::first_try(Some(Region::new(settings.region)))
            .or_default_provider()
            .or_else("us-east-1");

        #[allow(deprecated)]
        let mut loader = aws_config::from_env().region(region_provider);

        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access_key), Some(secret_key)) =
            (settings.access_key_id, settings.secret_access_key)
        {
            loader = loader
                .credentials_provider(Credentials::new(access_key, secret_key, None, None, "static"));
        }

        let base_config = loader.load().await;
        let s3_config = S3ConfigBuilder::from(&base_config)
            .force_path_style(true)
            .build();

        Ok(Self::new(S3Client::from_conf(s3_config), settings.bucket))
    }
}

#[async_trait]
impl ObjectStorage for S3HotStorage {
    async fn put_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .context("failed to upload object to hot storage")?;

        Ok(())
    }

    async fn create_signed_url(&self, path: &str, expires_in: Duration) -> Result<String> {
        let presign_config = PresigningConfig::builder()
            .expires_in(expires_in)
            .build()
            .context("failed to build S3 presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .presigned(presign_config)
            .await
            .context("failed to generate signed download URL")?;

        Ok(presigned.uri().to_string())
    }

    async fn get_object(&self, path: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .context("failed to download object from hot storage")?;

        let bytes = response
            .body
            .collect()
            .await
            .context("failed to read object stream")?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    async fn remove_object(&self, path: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .context("failed to delete object from hot storage")?;
        Ok(())
    }
}
