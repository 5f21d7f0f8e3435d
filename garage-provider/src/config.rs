//! Provider configuration
//!
//! The provider block is parsed into a [`ProviderConfig`] and resolved once
//! into a [`GarageConfig`], which every handler receives at construction.

use std::collections::HashMap;

use garage_core::resource::Value;
use garage_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use serde::Deserialize;
use thiserror::Error;

pub const ACCESS_KEY_ENV: &str = "GARAGE_ACCESS_KEY";
pub const SECRET_KEY_ENV: &str = "GARAGE_SECRET_KEY";

/// Region reported to the S3 API; Garage's default `s3_region`.
pub const S3_REGION: &str = "garage";

/// Errors raised while resolving the provider configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("The 'endpoint' attribute is no longer supported; set 'endpoints.admin' (and 'endpoints.s3' for objects) instead")]
    DeprecatedEndpoint,

    #[error("Missing admin endpoint: set 'endpoints.admin'")]
    MissingAdminEndpoint,

    #[error(
        "'endpoints.s3' is set but S3 credentials are missing: set 'access_key' and 'secret_key' or GARAGE_ACCESS_KEY and GARAGE_SECRET_KEY"
    )]
    MissingS3Credentials,

    #[error("Invalid provider configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Admin(#[from] garage_admin::AdminError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointsConfig {
    #[serde(default)]
    pub admin: Option<String>,
    #[serde(default)]
    pub s3: Option<String>,
}

/// Provider block as written by the user
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default)]
    pub endpoints: Option<EndpointsConfig>,
    /// Removed flat endpoint; only kept to reject it with a clear message
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoints", &self.endpoints)
            .field("endpoint", &self.endpoint)
            .field("token", &redacted(&self.token))
            .field("access_key", &self.access_key)
            .field("secret_key", &redacted(&self.secret_key))
            .finish()
    }
}

/// S3 credentials taken from the provider block or the environment
#[derive(Clone, PartialEq, Eq)]
pub struct S3Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Resolved configuration shared by every handler
#[derive(Clone, PartialEq, Eq)]
pub struct GarageConfig {
    pub admin_endpoint: String,
    pub token: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_credentials: Option<S3Credentials>,
}

impl std::fmt::Debug for GarageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarageConfig")
            .field("admin_endpoint", &self.admin_endpoint)
            .field("token", &redacted(&self.token))
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_credentials", &self.s3_credentials)
            .finish()
    }
}

fn redacted(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "<redacted>")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ProviderConfig {
    /// Parse a provider block given as attributes
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> Result<Self, ConfigError> {
        let json =
            serde_json::to_value(attributes).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        serde_json::from_value(json).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Parse a provider block given as a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Resolve against the process environment
    pub fn resolve(self) -> Result<GarageConfig, ConfigError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve with `env` supplying fallback values for the S3 credentials
    pub fn resolve_with<F>(self, env: F) -> Result<GarageConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if non_empty(self.endpoint).is_some() {
            return Err(ConfigError::DeprecatedEndpoint);
        }

        let endpoints = self.endpoints.unwrap_or_default();
        let admin_endpoint = non_empty(endpoints.admin).ok_or(ConfigError::MissingAdminEndpoint)?;
        // Fail on a malformed URL before any request is issued
        garage_admin::normalize_endpoint(&admin_endpoint)?;

        let s3_endpoint = non_empty(endpoints.s3);
        let access_key = non_empty(self.access_key).or_else(|| non_empty(env(ACCESS_KEY_ENV)));
        let secret_key = non_empty(self.secret_key).or_else(|| non_empty(env(SECRET_KEY_ENV)));

        let s3_credentials = match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => Some(S3Credentials {
                access_key,
                secret_key,
            }),
            _ => None,
        };
        if s3_endpoint.is_some() && s3_credentials.is_none() {
            return Err(ConfigError::MissingS3Credentials);
        }

        Ok(GarageConfig {
            admin_endpoint,
            token: non_empty(self.token),
            s3_endpoint,
            s3_credentials,
        })
    }
}

/// Schema of the provider block
pub fn provider_schema() -> ResourceSchema {
    ResourceSchema::new("garage")
        .with_description("Connection settings for a Garage cluster")
        .attribute(
            AttributeSchema::new("endpoints", AttributeType::Map(Box::new(AttributeType::String)))
                .required()
                .with_description(
                    "Cluster endpoints: 'admin' (e.g. http://localhost:3903) and optional 's3' (e.g. http://localhost:3900)",
                ),
        )
        .attribute(
            AttributeSchema::new("token", AttributeType::String)
                .sensitive()
                .with_description("Admin API bearer token"),
        )
        .attribute(
            AttributeSchema::new("access_key", AttributeType::String).with_description(
                "S3 access key ID for object operations (falls back to GARAGE_ACCESS_KEY)",
            ),
        )
        .attribute(
            AttributeSchema::new("secret_key", AttributeType::String)
                .sensitive()
                .with_description(
                    "S3 secret access key for object operations (falls back to GARAGE_SECRET_KEY)",
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn endpoints(admin: Option<&str>, s3: Option<&str>) -> Option<EndpointsConfig> {
        Some(EndpointsConfig {
            admin: admin.map(str::to_string),
            s3: s3.map(str::to_string),
        })
    }

    #[test]
    fn admin_only_config() {
        let config = ProviderConfig {
            endpoints: endpoints(Some("http://localhost:3903"), None),
            token: Some("t0k3n".to_string()),
            ..Default::default()
        }
        .resolve_with(no_env)
        .unwrap();

        assert_eq!(config.admin_endpoint, "http://localhost:3903");
        assert_eq!(config.token.as_deref(), Some("t0k3n"));
        assert_eq!(config.s3_endpoint, None);
        assert_eq!(config.s3_credentials, None);
    }

    #[test]
    fn missing_admin_endpoint_is_rejected() {
        let err = ProviderConfig::default().resolve_with(no_env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingAdminEndpoint));

        let err = ProviderConfig {
            endpoints: endpoints(Some("  "), Some("http://localhost:3900")),
            ..Default::default()
        }
        .resolve_with(no_env)
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingAdminEndpoint));
    }

    #[test]
    fn flat_endpoint_is_rejected() {
        let err = ProviderConfig {
            endpoint: Some("http://localhost:3903".to_string()),
            endpoints: endpoints(Some("http://localhost:3903"), None),
            ..Default::default()
        }
        .resolve_with(no_env)
        .unwrap_err();
        assert!(matches!(err, ConfigError::DeprecatedEndpoint));
        assert!(err.to_string().contains("endpoints.admin"));
    }

    #[test]
    fn malformed_admin_endpoint_is_rejected() {
        let err = ProviderConfig {
            endpoints: endpoints(Some("localhost:3903"), None),
            ..Default::default()
        }
        .resolve_with(no_env)
        .unwrap_err();
        assert!(matches!(err, ConfigError::Admin(_)));
    }

    #[test]
    fn s3_endpoint_requires_credentials() {
        let err = ProviderConfig {
            endpoints: endpoints(Some("http://localhost:3903"), Some("http://localhost:3900")),
            access_key: Some("GK123".to_string()),
            ..Default::default()
        }
        .resolve_with(no_env)
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingS3Credentials));
    }

    #[test]
    fn credentials_fall_back_to_environment() {
        let env = |name: &str| match name {
            ACCESS_KEY_ENV => Some("GKenv".to_string()),
            SECRET_KEY_ENV => Some("env-secret".to_string()),
            _ => None,
        };
        let config = ProviderConfig {
            endpoints: endpoints(Some("http://localhost:3903"), Some("http://localhost:3900")),
            secret_key: Some("explicit-secret".to_string()),
            ..Default::default()
        }
        .resolve_with(env)
        .unwrap();

        let creds = config.s3_credentials.unwrap();
        assert_eq!(creds.access_key, "GKenv");
        assert_eq!(creds.secret_key, "explicit-secret");
    }

    #[test]
    fn parses_provider_block_attributes() {
        let mut attrs = HashMap::new();
        attrs.insert(
            "endpoints".to_string(),
            Value::string_map([("admin", "http://garage:3903"), ("s3", "http://garage:3900")]),
        );
        attrs.insert("access_key".to_string(), Value::String("GK1".to_string()));
        attrs.insert("secret_key".to_string(), Value::String("s".to_string()));

        let config = ProviderConfig::from_attributes(&attrs)
            .unwrap()
            .resolve_with(no_env)
            .unwrap();
        assert_eq!(config.s3_endpoint.as_deref(), Some("http://garage:3900"));
    }

    #[test]
    fn unknown_attributes_are_rejected() {
        let err = ProviderConfig::from_json(r#"{"endpoints":{"admin":"http://x:3903"},"region":"eu"}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = ProviderConfig::from_json(
            r#"{"endpoints":{"admin":"http://x:3903","s3":"http://x:3900"},"token":"tok","access_key":"GK1","secret_key":"shh"}"#,
        )
        .unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("\"tok\""));
        assert!(!printed.contains("shh"));

        let resolved = format!("{:?}", config.resolve_with(no_env).unwrap());
        assert!(!resolved.contains("shh"));
        assert!(resolved.contains("GK1"));
    }
}
