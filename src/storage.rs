//! Image fetch and store adapters.
//!
//! Requests reference their image by URL; verified, masked images are
//! written back to S3 under a generated key with a public URL.

use std::io::Cursor;

use anyhow::Context;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use image::{ImageOutputFormat, RgbImage};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::PipelineError;

/// Object store boundary used by the pipeline.
#[async_trait::async_trait]
pub trait ImageStore: Send + Sync {
    /// Download the image behind `uri`.
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, PipelineError>;
    /// Store PNG bytes under a fresh key and return their public URL.
    async fn put_png(&self, png: Vec<u8>) -> anyhow::Result<String>;
}

pub struct S3ImageStore {
    http: reqwest::Client,
    s3: aws_sdk_s3::Client,
    bucket: String,
    region: String,
}

impl S3ImageStore {
    /// Build the S3 client from the AWS default credential chain.
    pub async fn new(http: reqwest::Client, config: &StorageConfig) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .load()
            .await;

        Self {
            http,
            s3: aws_sdk_s3::Client::new(&sdk_config),
            bucket: config.bucket.clone(),
            region: config.region.clone(),
        }
    }
}

/// Public URL of an object in a virtual-hosted-style bucket.
pub fn public_url(bucket: &str, region: &str, key: &str) -> String {
    format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key)
}

#[async_trait::async_trait]
impl ImageStore for S3ImageStore {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, PipelineError> {
        info!("Downloading image: {}", uri);

        let resp = self
            .http
            .get(uri)
            .send()
            .await
            .map_err(|e| PipelineError::Download(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PipelineError::Download(format!(
                "Failed to download image: {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PipelineError::Download(e.to_string()))?;
        info!("Downloaded image: {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    async fn put_png(&self, png: Vec<u8>) -> anyhow::Result<String> {
        let key = format!("{}.png", Uuid::new_v4());
        debug!("Uploading {} bytes to s3://{}/{}", png.len(), self.bucket, key);

        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(png))
            .content_type("image/png")
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .with_context(|| format!("S3 upload failed for key {}", key))?;

        let url = public_url(&self.bucket, &self.region, &key);
        info!("Uploaded masked image: {}", url);
        Ok(url)
    }
}

/// Decode downloaded bytes into an RGB pixel grid.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| PipelineError::Decode(e.to_string()))
}

/// Encode an RGB pixel grid as PNG.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageOutputFormat::Png)
        .map_err(|e| PipelineError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}
