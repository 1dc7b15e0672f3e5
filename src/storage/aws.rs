//! AWS S3 storage backend.
//!
//! Uploads land in a single S3 bucket under a folder prefix:
//!   `{prefix}{storage_key}`, e.g. `echoplay-v2/uploads/music/trackFile-...mp3`
//!
//! Public references are absolute URLs, built from `public_base_url` when
//! configured and otherwise from the bucket, region, and endpoint.
//!
//! Credentials are resolved via the standard AWS credential chain
//! (env vars, `~/.aws/credentials`, IAM role, etc.) unless given explicitly.

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use super::backend::StorageBackend;
use crate::config::AwsStorageConfig;

/// Backend that stores uploads in an S3 bucket.
pub struct AwsBackend {
    /// AWS S3 SDK client.
    client: Client,
    /// The S3 bucket name.
    bucket: String,
    /// Key prefix for every upload: empty, or ending in exactly one `/`.
    prefix: String,
    /// URL every public reference starts with, without trailing slash.
    url_base: String,
}

impl AwsBackend {
    /// Create a new S3 backend from its config section.
    pub async fn new(config: &AwsStorageConfig) -> anyhow::Result<Self> {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if !config.endpoint_url.is_empty() {
            config_loader = config_loader.endpoint_url(&config.endpoint_url);
        }

        if !config.access_key_id.is_empty() && !config.secret_access_key.is_empty() {
            let creds = aws_sdk_s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None, // session_token
                None, // expiry
                "echoplay-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;
        let s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.use_path_style);
        let client = Client::from_conf(s3_config_builder.build());

        let url_base = url_base(config);
        info!(
            "AWS storage backend initialized: bucket={} prefix='{}' url_base={}",
            config.bucket, config.prefix, url_base
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            prefix: normalize_prefix(&config.prefix),
            url_base,
        })
    }

    /// Map a storage key to an S3 key.
    fn s3_key(&self, storage_key: &str) -> String {
        format!("{}{}", self.prefix, storage_key)
    }

    /// Map an AWS SDK error to an anyhow error with context.
    fn map_sdk_error(context: &str, err: impl std::fmt::Display) -> anyhow::Error {
        anyhow::anyhow!("AWS S3 {context}: {err}")
    }
}

/// `"a/b"` and `"a/b/"` both become `"a/b/"`; an empty prefix stays empty.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Base URL for public object references.
fn url_base(config: &AwsStorageConfig) -> String {
    if !config.public_base_url.is_empty() {
        return config.public_base_url.trim_end_matches('/').to_string();
    }
    if !config.endpoint_url.is_empty() {
        let endpoint = config.endpoint_url.trim_end_matches('/');
        return format!("{endpoint}/{}", config.bucket);
    }
    if config.use_path_style {
        return format!("https://s3.{}.amazonaws.com/{}", config.region, config.bucket);
    }
    format!("https://{}.s3.{}.amazonaws.com", config.bucket, config.region)
}

impl StorageBackend for AwsBackend {
    fn provision<'a>(
        &'a self,
        folders: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            // S3 has no directories; verifying the bucket is reachable is
            // the only preparation the folders need.
            self.client
                .head_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("head_bucket", e.into_service_error()))?;
            debug!(
                "AWS bucket {} reachable; folders {:?} under '{}'",
                self.bucket, folders, self.prefix
            );
            Ok(())
        })
    }

    fn put(
        &self,
        storage_key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let storage_key = storage_key.to_string();
        let content_type = content_type.map(str::to_string);
        Box::pin(async move {
            let s3_key = self.s3_key(&storage_key);
            debug!("AWS put_object: bucket={} key={}", self.bucket, s3_key);

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .set_content_type(content_type)
                .body(ByteStream::from(data))
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("put_object", e))?;
            Ok(())
        })
    }

    fn delete(
        &self,
        storage_key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let storage_key = storage_key.to_string();
        Box::pin(async move {
            let s3_key = self.s3_key(&storage_key);
            debug!("AWS delete_object: bucket={} key={}", self.bucket, s3_key);

            // S3 delete_object is idempotent -- no error for missing keys.
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("delete_object", e))?;
            Ok(())
        })
    }

    fn public_url(&self, storage_key: &str) -> String {
        format!("{}/{}", self.url_base, self.s3_key(storage_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aws_config(bucket: &str) -> AwsStorageConfig {
        AwsStorageConfig {
            bucket: bucket.to_string(),
            region: "eu-west-1".to_string(),
            prefix: "echoplay-v2/uploads/".to_string(),
            endpoint_url: String::new(),
            use_path_style: false,
            public_base_url: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
        }
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("echoplay-v2/uploads"), "echoplay-v2/uploads/");
        assert_eq!(normalize_prefix("echoplay-v2/uploads/"), "echoplay-v2/uploads/");
        assert_eq!(normalize_prefix("echoplay-v2/uploads//"), "echoplay-v2/uploads/");
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
    }

    #[test]
    fn test_prefix_without_slash_joins_cleanly() {
        let config = aws_config("media");
        let key = format!(
            "{}{}",
            normalize_prefix("echoplay-v2/uploads"),
            "music/trackFile-1-2.mp3"
        );
        assert_eq!(
            format!("{}/{}", url_base(&config), key),
            "https://media.s3.eu-west-1.amazonaws.com/echoplay-v2/uploads/music/trackFile-1-2.mp3"
        );
    }

    #[test]
    fn test_url_base_virtual_hosted() {
        assert_eq!(
            url_base(&aws_config("media")),
            "https://media.s3.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn test_url_base_path_style() {
        let mut config = aws_config("media");
        config.use_path_style = true;
        assert_eq!(
            url_base(&config),
            "https://s3.eu-west-1.amazonaws.com/media"
        );
    }

    #[test]
    fn test_url_base_custom_endpoint() {
        let mut config = aws_config("media");
        config.endpoint_url = "http://localhost:9000/".to_string();
        assert_eq!(url_base(&config), "http://localhost:9000/media");
    }

    #[test]
    fn test_url_base_public_override() {
        let mut config = aws_config("media");
        config.endpoint_url = "http://localhost:9000".to_string();
        config.public_base_url = "https://cdn.example.com/".to_string();
        assert_eq!(url_base(&config), "https://cdn.example.com");
    }
}
