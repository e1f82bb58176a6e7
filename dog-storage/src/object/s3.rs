use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream as S3Body;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

use super::{ObjectClient, ObjectStoreFilesystem, OBJECT_CONTENT_TYPE};
use crate::filesystem::BackendKind;
use crate::{ByteStream, KeyStream, StorageError, StorageResult};

/// S3 backed filesystem
pub type S3Filesystem = ObjectStoreFilesystem<S3Client>;

/// Connection parameters for an S3-compatible bucket
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    pub bucket: String,
    pub region: Option<String>,
    /// Custom endpoint for MinIO and other S3-compatible services
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl S3Config {
    pub fn new<S: Into<String>>(bucket: S) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    pub fn with_region<S: Into<String>>(mut self, region: S) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_keys<A: Into<String>, S: Into<String>>(mut self, access_key: A, secret_key: S) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    /// Static keys, when both halves are present and non-empty
    fn static_credentials(&self) -> Option<Credentials> {
        let access = self.access_key.as_deref().filter(|k| !k.is_empty())?;
        let secret = self.secret_key.as_deref().filter(|k| !k.is_empty())?;
        Some(Credentials::new(access, secret, None, None, "dog-storage"))
    }
}

/// [`ObjectClient`] over the AWS SDK
#[derive(Debug, Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    /// Build a client from `config`.
    ///
    /// Static keys are used when configured, otherwise the default provider
    /// chain (environment, profile, IAM role).
    pub async fn connect(config: &S3Config) -> StorageResult<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::configuration("S3 bucket must not be empty"));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        match config.static_credentials() {
            Some(credentials) => {
                debug!("using S3 filesystem with keys");
                loader = loader.credentials_provider(credentials);
            }
            None => debug!("using S3 filesystem with IAM role"),
        }

        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }

        let shared = loader.load().await;
        let mut s3_config = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self::with_client(Client::from_conf(s3_config.build()), config.bucket.clone()))
    }

    /// Wrap an existing SDK client
    pub fn with_client<S: Into<String>>(client: Client, bucket: S) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectClient for S3Client {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn kind(&self) -> BackendKind {
        BackendKind::S3
    }

    async fn put_object(&self, key: &str, body: Bytes) -> StorageResult<()> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(OBJECT_CONTENT_TYPE)
            .body(S3Body::from(body))
            .send()
            .await
            .map_err(StorageError::backend)?;
        debug!(key, size, "put object");
        Ok(())
    }

    async fn get_object(&self, key: &str) -> StorageResult<ByteStream> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                    StorageError::not_found(key)
                } else {
                    StorageError::backend(e)
                }
            })?;

        let mut body = output.body;
        Ok(Box::pin(async_stream::stream! {
            loop {
                match body.try_next().await {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(std::io::Error::other(e));
                        break;
                    }
                }
            }
        }))
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(StorageError::backend)?;
        Ok(())
    }

    async fn head_object(&self, key: &str) -> StorageResult<Option<u64>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(head) => Ok(Some(head.content_length().unwrap_or_default().max(0) as u64)),
            Err(e) if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) => {
                Ok(None)
            }
            Err(e) => Err(StorageError::backend(e)),
        }
    }

    fn list_keys(&self, prefix: &str) -> KeyStream {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        Box::pin(async_stream::stream! {
            while let Some(page) = pages.next().await {
                match page {
                    Ok(page) => {
                        for object in page.contents() {
                            if let Some(key) = object.key() {
                                yield Ok(key.to_string());
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(StorageError::backend(e));
                        break;
                    }
                }
            }
        })
    }
}
