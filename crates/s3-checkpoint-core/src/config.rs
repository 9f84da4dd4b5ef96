//! Object store connection settings.
//!
//! [`StoreConfig`] is built either from Hadoop-style `fs.s3a.*` properties
//! (the form checkpoint hosts usually hand around) or deserialized with
//! serde. Credentials are resolved once into a [`CredentialSource`] and never
//! refreshed for the static variants.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use snafu::prelude::*;

/// Property key: `"true"` enables path-style addressing (absent means true).
pub const PATH_STYLE_ACCESS_KEY: &str = "fs.s3a.path.style.access";
/// Property key: endpoint URL of the S3-compatible service.
pub const ENDPOINT_KEY: &str = "fs.s3a.endpoint";
/// Property key: signing region.
pub const REGION_KEY: &str = "fs.s3a.region";
/// Property key: static access key id.
pub const ACCESS_KEY_KEY: &str = "fs.s3a.access.key";
/// Property key: static secret access key.
pub const SECRET_KEY_KEY: &str = "fs.s3a.secret.key";
/// Property key: session token for temporary credentials.
pub const SESSION_TOKEN_KEY: &str = "fs.s3a.session.token";
/// Property key: payload size (bytes) above which uploads go multipart.
pub const MULTIPART_THRESHOLD_KEY: &str = "fs.s3a.multipart.threshold";
/// Property key: multipart part size in bytes.
pub const MULTIPART_SIZE_KEY: &str = "fs.s3a.multipart.size";

/// Default endpoint: a local MinIO.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9000";
/// Default signing region.
pub const DEFAULT_REGION: &str = "us-east-1";
/// Default multipart threshold (64 MiB).
pub const DEFAULT_MULTIPART_THRESHOLD: usize = 64 * 1024 * 1024;
/// Default multipart part size (16 MiB).
pub const DEFAULT_MULTIPART_PART_SIZE: usize = 16 * 1024 * 1024;
/// S3 rejects parts smaller than this, except the last one.
pub const MIN_MULTIPART_PART_SIZE: usize = 5 * 1024 * 1024;

/// Errors raised while building or validating a [`StoreConfig`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// A property could not be parsed.
    #[snafu(display("Invalid value {value:?} for {key}"))]
    InvalidValue {
        /// The property key.
        key: String,
        /// The raw value found.
        value: String,
        /// Parse failure.
        source: std::num::ParseIntError,
    },

    /// The configuration is internally inconsistent.
    #[snafu(display("Invalid object store configuration: {message}"))]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

/// Where the store client gets its credentials from.
#[derive(Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialSource {
    /// Long-lived access key and secret.
    Static {
        /// Access key id.
        access_key: String,
        /// Secret access key.
        secret_key: String,
    },
    /// Temporary credentials with a session token.
    StaticSession {
        /// Access key id.
        access_key: String,
        /// Secret access key.
        secret_key: String,
        /// Session token.
        session_token: String,
    },
    /// The AWS default provider chain (environment, profile, IMDS, ...).
    #[default]
    DefaultChain,
}

impl CredentialSource {
    /// Pick the credential source from optional parts.
    ///
    /// Key and secret together select static credentials (session credentials
    /// when a token is also present). Anything less falls back to the default
    /// chain.
    pub fn from_parts(
        access_key: Option<String>,
        secret_key: Option<String>,
        session_token: Option<String>,
    ) -> Self {
        match (access_key, secret_key, session_token) {
            (Some(access_key), Some(secret_key), Some(session_token)) => {
                CredentialSource::StaticSession {
                    access_key,
                    secret_key,
                    session_token,
                }
            }
            (Some(access_key), Some(secret_key), None) => CredentialSource::Static {
                access_key,
                secret_key,
            },
            _ => CredentialSource::DefaultChain,
        }
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Static { access_key, .. } => f
                .debug_struct("Static")
                .field("access_key", access_key)
                .field("secret_key", &"** redacted **")
                .finish(),
            CredentialSource::StaticSession { access_key, .. } => f
                .debug_struct("StaticSession")
                .field("access_key", access_key)
                .field("secret_key", &"** redacted **")
                .field("session_token", &"** redacted **")
                .finish(),
            CredentialSource::DefaultChain => f.write_str("DefaultChain"),
        }
    }
}

fn default_path_style_access() -> bool {
    true
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_multipart_threshold() -> usize {
    DEFAULT_MULTIPART_THRESHOLD
}

fn default_multipart_part_size() -> usize {
    DEFAULT_MULTIPART_PART_SIZE
}

/// Settings used to build the one store client a manager owns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Address buckets as `endpoint/bucket/key` rather than `bucket.endpoint/key`.
    #[serde(default = "default_path_style_access")]
    pub path_style_access: bool,
    /// Endpoint URL of the service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Signing region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Credential source.
    #[serde(default)]
    pub credentials: CredentialSource,
    /// Payloads strictly larger than this are uploaded in parts.
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: usize,
    /// Size of each part of a multipart upload.
    #[serde(default = "default_multipart_part_size")]
    pub multipart_part_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path_style_access: default_path_style_access(),
            endpoint: default_endpoint(),
            region: default_region(),
            credentials: CredentialSource::default(),
            multipart_threshold: default_multipart_threshold(),
            multipart_part_size: default_multipart_part_size(),
        }
    }
}

fn parse_size(
    props: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match props.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<usize>().context(InvalidValueSnafu {
            key,
            value: raw.as_str(),
        }),
    }
}

impl StoreConfig {
    /// Build a configuration from `fs.s3a.*` properties.
    ///
    /// Missing keys take their defaults. Path-style access is only disabled
    /// by a value other than the exact string `"true"`.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let path_style_access = props
            .get(PATH_STYLE_ACCESS_KEY)
            .is_none_or(|v| v == "true");

        let credentials = CredentialSource::from_parts(
            props.get(ACCESS_KEY_KEY).cloned(),
            props.get(SECRET_KEY_KEY).cloned(),
            props.get(SESSION_TOKEN_KEY).cloned(),
        );

        let config = Self {
            path_style_access,
            endpoint: props
                .get(ENDPOINT_KEY)
                .cloned()
                .unwrap_or_else(default_endpoint),
            region: props
                .get(REGION_KEY)
                .cloned()
                .unwrap_or_else(default_region),
            credentials,
            multipart_threshold: parse_size(
                props,
                MULTIPART_THRESHOLD_KEY,
                DEFAULT_MULTIPART_THRESHOLD,
            )?,
            multipart_part_size: parse_size(
                props,
                MULTIPART_SIZE_KEY,
                DEFAULT_MULTIPART_PART_SIZE,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check invariants the store client relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            !self.endpoint.trim().is_empty(),
            InvalidSnafu {
                message: "endpoint cannot be empty",
            }
        );
        ensure!(
            !self.region.trim().is_empty(),
            InvalidSnafu {
                message: "region cannot be empty",
            }
        );
        ensure!(
            self.multipart_part_size >= MIN_MULTIPART_PART_SIZE,
            InvalidSnafu {
                message: format!(
                    "multipart part size {} is below the {MIN_MULTIPART_PART_SIZE} byte minimum",
                    self.multipart_part_size
                ),
            }
        );
        ensure!(
            self.multipart_threshold >= self.multipart_part_size,
            InvalidSnafu {
                message: format!(
                    "multipart threshold {} is smaller than the part size {}",
                    self.multipart_threshold, self.multipart_part_size
                ),
            }
        );
        Ok(())
    }
}
