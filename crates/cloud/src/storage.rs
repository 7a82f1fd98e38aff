//! Object storage for finished clips.
//!
//! [`S3Publisher`] uploads the MP4 under a unique key and returns a link
//! the chat channel can open: either the object's public URL or a
//! time-limited presigned GET URL.

use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;

pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Longest lifetime S3 accepts for a SigV4 presigned URL.
const MAX_PRESIGN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Upload of {key} failed: {message}")]
    Upload { key: String, message: String },

    #[error("Presigning {key} failed: {message}")]
    Presign { key: String, message: String },

    #[error("Invalid storage configuration: {0}")]
    Config(String),
}

/// Stores clip bytes and returns a shareable URL.
#[async_trait]
pub trait VideoPublisher: Send + Sync {
    async fn publish(&self, bytes: Vec<u8>) -> Result<String, PublishError>;
}

/// How the returned link grants access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Object uploaded `public-read`; the link is its fixed URL.
    Public,
    /// Object stays private; the link is presigned for `ttl`.
    Presigned { ttl: Duration },
}

/// Bucket, region, and optional static credentials.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub bucket: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Custom endpoint (S3-compatible stores, tests).
    pub endpoint_url: Option<String>,
    pub link_mode: LinkMode,
}

pub struct S3Publisher {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
    link_mode: LinkMode,
}

impl S3Publisher {
    /// Wrap an existing client.
    pub fn new(
        client: aws_sdk_s3::Client,
        bucket: impl Into<String>,
        region: impl Into<String>,
        link_mode: LinkMode,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            region: region.into(),
            link_mode,
        }
    }

    /// Build a client from settings. Static credentials win; otherwise the
    /// default AWS provider chain (env, profile, instance role) applies.
    pub async fn connect(settings: &StorageSettings) -> Result<Self, PublishError> {
        if settings.bucket.trim().is_empty() {
            return Err(PublishError::Config("bucket must not be empty".to_string()));
        }
        if let LinkMode::Presigned { ttl } = settings.link_mode {
            if ttl.is_zero() || ttl > MAX_PRESIGN_TTL {
                return Err(PublishError::Config(format!(
                    "presign ttl must be between 1s and {}s",
                    MAX_PRESIGN_TTL.as_secs()
                )));
            }
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));
        if let (Some(id), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                id.clone(),
                secret.clone(),
                None,
                None,
                "reelgen-env",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &settings.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = aws_sdk_s3::Client::from_conf(builder.build());

        Ok(Self::new(
            client,
            settings.bucket.clone(),
            settings.region.clone(),
            settings.link_mode,
        ))
    }

    /// Fixed URL of an object in a public bucket.
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, key
        )
    }

    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String, PublishError> {
        let presign = |e: String| PublishError::Presign {
            key: key.to_string(),
            message: e,
        };
        let config = PresigningConfig::expires_in(ttl).map_err(|e| presign(e.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| presign(DisplayErrorContext(e).to_string()))?;
        Ok(request.uri().to_string())
    }
}

#[async_trait]
impl VideoPublisher for S3Publisher {
    async fn publish(&self, bytes: Vec<u8>) -> Result<String, PublishError> {
        let key = object_key(chrono::Utc::now().timestamp());
        let size = bytes.len();

        let mut put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(VIDEO_CONTENT_TYPE)
            .body(ByteStream::from(bytes));
        if self.link_mode == LinkMode::Public {
            put = put.acl(ObjectCannedAcl::PublicRead);
        }
        put.send().await.map_err(|e| PublishError::Upload {
            key: key.clone(),
            message: DisplayErrorContext(e).to_string(),
        })?;

        tracing::info!(bucket = %self.bucket, key = %key, size, "Uploaded clip");

        match self.link_mode {
            LinkMode::Public => Ok(self.public_url(&key)),
            LinkMode::Presigned { ttl } => self.presigned_url(&key, ttl).await,
        }
    }
}

/// `video-<unix-seconds>-<8 hex chars>.mp4`; the suffix keeps two uploads
/// in the same second apart.
pub fn object_key(unix_seconds: i64) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("video-{unix_seconds}-{}.mp4", &id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client() -> aws_sdk_s3::Client {
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("ap-south-1"))
            .credentials_provider(Credentials::new("AKIDEXAMPLE", "secret", None, None, "test"))
            .build();
        aws_sdk_s3::Client::from_conf(config)
    }

    #[test]
    fn key_has_timestamp_and_suffix() {
        let key = object_key(1_700_000_000);
        assert!(key.starts_with("video-1700000000-"));
        assert!(key.ends_with(".mp4"));
        assert_eq!(key.len(), "video-1700000000-".len() + 8 + ".mp4".len());
        assert_ne!(object_key(1), object_key(1));
    }

    #[test]
    fn public_url_uses_virtual_host_style() {
        let publisher = S3Publisher::new(offline_client(), "clips", "ap-south-1", LinkMode::Public);
        assert_eq!(
            publisher.public_url("video-1-abcd1234.mp4"),
            "https://clips.s3.ap-south-1.amazonaws.com/video-1-abcd1234.mp4"
        );
    }

    #[tokio::test]
    async fn presigned_url_carries_expiry() {
        let publisher = S3Publisher::new(
            offline_client(),
            "clips",
            "ap-south-1",
            LinkMode::Presigned {
                ttl: Duration::from_secs(900),
            },
        );
        let url = publisher
            .presigned_url("video-1-abcd1234.mp4", Duration::from_secs(900))
            .await
            .unwrap();
        assert!(url.contains("video-1-abcd1234.mp4"));
        assert!(url.contains("X-Amz-Expires=900"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[tokio::test]
    async fn connect_rejects_bad_settings() {
        let mut settings = StorageSettings {
            bucket: " ".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            endpoint_url: None,
            link_mode: LinkMode::Public,
        };
        assert!(matches!(
            S3Publisher::connect(&settings).await,
            Err(PublishError::Config(_))
        ));

        settings.bucket = "clips".to_string();
        settings.link_mode = LinkMode::Presigned {
            ttl: Duration::from_secs(8 * 24 * 60 * 60),
        };
        assert!(matches!(
            S3Publisher::connect(&settings).await,
            Err(PublishError::Config(_))
        ));
    }
}
