// src/remote/s3.rs

//! Object storage backend (`s3://bucket/prefix` locators)
//!
//! Connection settings come from the standard AWS environment:
//! - `AWS_REGION` / `AWS_DEFAULT_REGION` (default `us-east-1`)
//! - `AWS_ENDPOINT_URL` for S3-compatible services (path-style access)
//! - credentials from the usual environment/profile chain
//!
//! The bucket handle is created on first use so that building a runtime
//! never touches the network or credential sources.

use super::ObjectStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use tokio::sync::OnceCell;
use tracing::debug;

const DEFAULT_REGION: &str = "us-east-1";

pub struct S3Store {
    bucket_name: String,
    bucket: OnceCell<Box<Bucket>>,
}

impl S3Store {
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            bucket: OnceCell::new(),
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    fn region() -> Result<Region> {
        let name = std::env::var("AWS_REGION")
            .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|_| DEFAULT_REGION.to_string());

        match std::env::var("AWS_ENDPOINT_URL") {
            Ok(endpoint) if !endpoint.is_empty() => Ok(Region::Custom {
                region: name,
                endpoint,
            }),
            _ => name
                .parse::<Region>()
                .map_err(|e| Error::SyncFailed(format!("invalid region '{}': {}", name, e))),
        }
    }

    async fn bucket(&self) -> Result<&Bucket> {
        let bucket = self
            .bucket
            .get_or_try_init(|| async {
                let region = Self::region()?;
                let custom_endpoint = matches!(region, Region::Custom { .. });

                // The credential chain may query instance metadata synchronously.
                let credentials = tokio::task::spawn_blocking(Credentials::default)
                    .await
                    .map_err(|e| Error::SyncFailed(format!("credential lookup failed: {}", e)))?
                    .map_err(|e| Error::SyncFailed(format!("failed to load credentials: {}", e)))?;

                let bucket = Bucket::new(&self.bucket_name, region, credentials).map_err(|e| {
                    Error::SyncFailed(format!("failed to create s3 client: {}", e))
                })?;
                debug!("Created s3 client for bucket {}", self.bucket_name);

                Ok::<_, Error>(if custom_endpoint {
                    bucket.with_path_style()
                } else {
                    bucket
                })
            })
            .await?;
        Ok(&**bucket)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let bucket = self.bucket().await?;

        match bucket.get_object(key).await {
            Ok(response) => match response.status_code() {
                200..=299 => Ok(response.bytes().to_vec()),
                404 => Err(Error::NotFound(format!("s3://{}/{}", self.bucket_name, key))),
                status => Err(Error::SyncFailed(format!(
                    "s3://{}/{} returned HTTP {}",
                    self.bucket_name, key, status
                ))),
            },
            Err(S3Error::HttpFailWithBody(404, _)) => {
                Err(Error::NotFound(format!("s3://{}/{}", self.bucket_name, key)))
            }
            Err(e) => Err(Error::SyncFailed(format!(
                "failed to get s3://{}/{}: {}",
                self.bucket_name, key, e
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("s3://{}", self.bucket_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_is_lazy() {
        let store = S3Store::new("artifacts");
        assert_eq!(store.bucket_name(), "artifacts");
        assert!(store.bucket.get().is_none());
        assert_eq!(store.describe(), "s3://artifacts");
    }
}
