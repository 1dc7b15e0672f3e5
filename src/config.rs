//! Configuration loading and types for EchoPlay.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, token signing, record persistence, file storage,
//! logging, and observability.

use serde::Deserialize;
use std::path::Path;

/// Environment variable that overrides `auth.jwt_secret`.
pub const JWT_SECRET_ENV: &str = "ECHOPLAY_JWT_SECRET";

/// Longest accepted token lifetime (30 days).
pub const MAX_TOKEN_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Token signing settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Metadata store settings.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Upload storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings (metrics + health probe).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Maximum accepted request body for uploads, in bytes (default 50 MiB).
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Enable the `/health` probe.
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            health_check: true,
        }
    }
}

/// Token signing settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign identity tokens.  Overridden by
    /// `ECHOPLAY_JWT_SECRET` when set.
    #[serde(alias = "secret", default)]
    pub jwt_secret: String,

    /// Token lifetime in seconds (default one day).
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_seconds: default_token_ttl(),
        }
    }
}

/// Metadata store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Backend type: `sqlite` or `memory`.
    #[serde(default = "default_metadata_engine")]
    pub engine: String,

    /// SQLite-specific configuration.
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            engine: default_metadata_engine(),
            sqlite: SqliteConfig::default(),
        }
    }
}

/// SQLite-specific metadata configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_metadata_path")]
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
        }
    }
}

/// Upload storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `local`, `aws`, or `memory`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Local storage configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,

    /// S3 object store configuration.
    #[serde(default)]
    pub aws: Option<AwsStorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            local: LocalStorageConfig::default(),
            aws: None,
        }
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Root directory for uploaded files.  `music/` and `images/` live below it.
    #[serde(default = "default_storage_root")]
    pub root_dir: String,

    /// URL prefix the root directory is served under.
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
            public_prefix: default_public_prefix(),
        }
    }
}

/// S3 object store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AwsStorageConfig {
    /// Backing S3 bucket name.
    pub bucket: String,
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Folder prefix for every uploaded key.
    #[serde(default = "default_bucket_prefix")]
    pub prefix: String,
    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: String,
    /// Force path-style URL addressing.
    #[serde(default)]
    pub use_path_style: bool,
    /// Base URL used to build public file URLs (e.g. a CDN).  Derived from
    /// the bucket and region when empty.
    #[serde(default)]
    pub public_base_url: String,
    /// Explicit AWS access key (falls back to env/credential chain).
    #[serde(default)]
    pub access_key_id: String,
    /// Explicit AWS secret key (falls back to env/credential chain).
    #[serde(default)]
    pub secret_access_key: String,
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_upload_size() -> usize {
    50 * 1024 * 1024
}

fn default_token_ttl() -> i64 {
    24 * 60 * 60
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_metadata_engine() -> String {
    "sqlite".to_string()
}

fn default_metadata_path() -> String {
    "./data/echoplay.db".to_string()
}

fn default_storage_backend() -> String {
    "local".to_string()
}

fn default_storage_root() -> String {
    "./uploads".to_string()
}

fn default_public_prefix() -> String {
    "/uploads".to_string()
}

fn default_bucket_prefix() -> String {
    "echoplay-v2/uploads/".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`, then apply
/// environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let mut config = parse_config(&contents)?;
    if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
        config.auth.jwt_secret = secret;
    }
    config.validate()?;
    Ok(config)
}

/// Parse configuration from YAML text without touching the environment.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
}

impl Config {
    /// Reject configurations the server cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.auth.jwt_secret.trim().is_empty() {
            anyhow::bail!(
                "auth.jwt_secret is empty; set it in the config file or via {JWT_SECRET_ENV}"
            );
        }
        if self.auth.token_ttl_seconds <= 0
            || self.auth.token_ttl_seconds > MAX_TOKEN_TTL_SECONDS
        {
            anyhow::bail!(
                "auth.token_ttl_seconds must be between 1 and {MAX_TOKEN_TTL_SECONDS}"
            );
        }
        if !self.storage.local.public_prefix.starts_with('/') {
            anyhow::bail!("storage.local.public_prefix must start with '/'");
        }
        if self.storage.backend == "aws" && self.storage.aws.is_none() {
            anyhow::bail!("storage.backend is 'aws' but storage.aws config section is missing");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.auth.token_ttl_seconds, 86_400);
        assert_eq!(config.storage.backend, "local");
        assert_eq!(config.storage.local.public_prefix, "/uploads");
        assert_eq!(config.metadata.engine, "sqlite");
    }

    #[test]
    fn test_aws_section() {
        let yaml = r#"
auth:
  jwt_secret: s3cret
storage:
  backend: aws
  aws:
    bucket: media
    region: eu-west-1
"#;
        let config = parse_config(yaml).unwrap();
        let aws = config.storage.aws.as_ref().unwrap();
        assert_eq!(aws.bucket, "media");
        assert_eq!(aws.prefix, "echoplay-v2/uploads/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_secret() {
        let config = parse_config("{}").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_ttl() {
        let config = parse_config("auth: {jwt_secret: x, token_ttl_seconds: 0}").unwrap();
        assert!(config.validate().is_err());

        let config =
            parse_config("auth: {jwt_secret: x, token_ttl_seconds: 9223372036854775807}").unwrap();
        assert!(config.validate().is_err());

        let config = parse_config("auth: {jwt_secret: x, token_ttl_seconds: 86400}").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_aws_without_section() {
        let yaml = "auth: {jwt_secret: x}\nstorage: {backend: aws}\n";
        let config = parse_config(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
