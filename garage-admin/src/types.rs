//! Request and response bodies of the Garage admin API v2.
//!
//! Field names follow the upstream camelCase schema. Optional substructures
//! are `Option`s that are omitted from request bodies when `None`, so an
//! absent website or quota block leaves the server-side value untouched.

use serde::{Deserialize, Serialize};

use crate::error::{AdminError, AdminResult};

/// Entry of `GET /v2/ListBuckets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSummary {
    pub id: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub global_aliases: Vec<String>,
    #[serde(default)]
    pub local_aliases: Vec<BucketLocalAlias>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketLocalAlias {
    pub access_key_id: String,
    pub alias: String,
}

/// Full bucket record returned by `GetBucketInfo` and every bucket mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    pub id: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub global_aliases: Vec<String>,
    #[serde(default)]
    pub website_access: bool,
    #[serde(default)]
    pub website_config: Option<WebsiteConfig>,
    #[serde(default)]
    pub keys: Vec<BucketKeyInfo>,
    #[serde(default)]
    pub objects: i64,
    #[serde(default)]
    pub bytes: i64,
    #[serde(default)]
    pub unfinished_uploads: i64,
    #[serde(default)]
    pub unfinished_multipart_uploads: i64,
    #[serde(default)]
    pub quotas: Option<BucketQuotas>,
}

impl BucketInfo {
    /// Permissions held by `access_key_id` on this bucket, if any
    pub fn key_permissions(&self, access_key_id: &str) -> Option<&BucketPermissions> {
        self.keys
            .iter()
            .find(|k| k.access_key_id == access_key_id)
            .map(|k| &k.permissions)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteConfig {
    #[serde(default)]
    pub index_document: Option<String>,
    #[serde(default)]
    pub error_document: Option<String>,
}

/// Bucket quotas.
///
/// Inside a present quota block a `None` field is sent as `null`, which
/// removes that quota.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketQuotas {
    #[serde(default)]
    pub max_size: Option<u64>,
    #[serde(default)]
    pub max_objects: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketKeyInfo {
    pub access_key_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub permissions: BucketPermissions,
    #[serde(default)]
    pub bucket_local_aliases: Vec<String>,
}

/// Capability set of one key on one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketPermissions {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub owner: bool,
}

impl BucketPermissions {
    pub fn new(read: bool, write: bool, owner: bool) -> Self {
        Self { read, write, owner }
    }

    pub fn all() -> Self {
        Self::new(true, true, true)
    }

    pub fn is_empty(&self) -> bool {
        !(self.read || self.write || self.owner)
    }

    /// Flags that are not set here
    pub fn complement(&self) -> Self {
        Self::new(!self.read, !self.write, !self.owner)
    }
}

/// How a bucket is addressed by `GetBucketInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketLookup {
    Id(String),
    GlobalAlias(String),
}

impl BucketLookup {
    /// Build a lookup from optional attributes; exactly one must be set
    pub fn from_parts(id: Option<&str>, global_alias: Option<&str>) -> AdminResult<Self> {
        match (id, global_alias) {
            (Some(id), None) => Ok(BucketLookup::Id(id.to_string())),
            (None, Some(alias)) => Ok(BucketLookup::GlobalAlias(alias.to_string())),
            (None, None) => Err(AdminError::MissingAttribute(
                "either 'id' or 'global_alias' must be specified".to_string(),
            )),
            (Some(_), Some(_)) => Err(AdminError::InvalidRequest(
                "only one of 'id' or 'global_alias' may be specified".to_string(),
            )),
        }
    }

    pub(crate) fn query(&self) -> (&'static str, &str) {
        match self {
            BucketLookup::Id(id) => ("id", id),
            BucketLookup::GlobalAlias(alias) => ("globalAlias", alias),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBucketRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBucketRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_access: Option<WebsiteAccess>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quotas: Option<BucketQuotas>,
}

impl UpdateBucketRequest {
    pub fn is_empty(&self) -> bool {
        self.website_access.is_none() && self.quotas.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteAccess {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_document: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_document: Option<String>,
}

impl WebsiteAccess {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            index_document: None,
            error_document: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BucketAliasRequest<'a> {
    pub bucket_id: &'a str,
    pub global_alias: &'a str,
}

/// Entry of `GET /v2/ListKeys`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub expiration: Option<String>,
    #[serde(default)]
    pub expired: bool,
}

/// Access key record.
///
/// `secret_access_key` is only populated by `CreateKey` and `ImportKey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub access_key_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub expiration: Option<String>,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub permissions: KeyPermissions,
    #[serde(default)]
    pub buckets: Vec<KeyBucketInfo>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPermissions {
    #[serde(default)]
    pub create_bucket: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyBucketInfo {
    pub id: String,
    #[serde(default)]
    pub global_aliases: Vec<String>,
    #[serde(default)]
    pub local_aliases: Vec<String>,
    #[serde(default)]
    pub permissions: BucketPermissions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportKeyRequest {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ImportKeyRequest {
    /// Build an import request from optional credentials; both parts are
    /// required together
    pub fn from_parts(
        access_key_id: Option<&str>,
        secret_access_key: Option<&str>,
        name: Option<&str>,
    ) -> AdminResult<Self> {
        match (access_key_id, secret_access_key) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Ok(Self {
                access_key_id: id.to_string(),
                secret_access_key: secret.to_string(),
                name: name.map(str::to_string),
            }),
            _ => Err(AdminError::InvalidRequest(
                "both 'id' and 'secret_access_key' must be provided to import a key".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateKeyRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Body of `AllowBucketKey` / `DenyBucketKey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketKeyPermRequest {
    pub bucket_id: String,
    pub access_key_id: String,
    pub permissions: BucketPermissions,
}

/// Structured error body returned on non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}
