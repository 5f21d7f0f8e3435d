//! garage_bucket resource and data source

use std::collections::HashMap;

use garage_admin::AdminClient;
use garage_admin::types::{
    BucketInfo, BucketLookup, BucketQuotas, CreateBucketRequest, UpdateBucketRequest,
    WebsiteAccess,
};
use garage_core::provider::{ProviderError, ProviderResult};
use garage_core::resource::{Attributes, Resource, ResourceId, State, Value};
use tracing::{debug, trace, warn};

use super::{admin_error, identifier_of, int_value, positive_u64, validated};
use crate::schemas::bucket::{bucket_data_source_schema, bucket_schema};

/// Website settings as declared, normalized so a disabled website carries no
/// documents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct WebsiteSettings {
    enabled: bool,
    index_document: Option<String>,
    error_document: Option<String>,
}

impl WebsiteSettings {
    fn from_attributes(attrs: &impl Attributes) -> Self {
        let enabled = attrs.get_bool_or("website_enabled", false);
        if !enabled {
            return Self::default();
        }
        Self {
            enabled,
            index_document: attrs.get_string("website_index_document").map(str::to_string),
            error_document: attrs.get_string("website_error_document").map(str::to_string),
        }
    }

    fn check(&self, id: &ResourceId) -> ProviderResult<()> {
        if self.enabled && self.index_document.is_none() {
            return Err(ProviderError::new(
                "'website_index_document' is required when 'website_enabled' is true",
            )
            .for_resource(id.clone()));
        }
        Ok(())
    }

    fn to_request(&self) -> WebsiteAccess {
        if !self.enabled {
            return WebsiteAccess::disabled();
        }
        WebsiteAccess {
            enabled: true,
            index_document: self.index_document.clone(),
            error_document: self.error_document.clone(),
        }
    }
}

const WEBSITE_ATTRIBUTES: &[&str] = &[
    "website_enabled",
    "website_index_document",
    "website_error_document",
];
const QUOTA_ATTRIBUTES: &[&str] = &["max_size", "max_objects"];

fn any_set(resource: &Resource, names: &[&str]) -> bool {
    names.iter().any(|n| resource.attributes.contains_key(*n))
}

fn quotas_of(attrs: &impl Attributes) -> BucketQuotas {
    BucketQuotas {
        max_size: positive_u64(attrs.get_int("max_size")),
        max_objects: positive_u64(attrs.get_int("max_objects")),
    }
}

/// Attributes reported for a bucket
///
/// `global_alias` is `preferred` when the bucket still carries it, else the
/// first alias.
fn bucket_attributes(info: &BucketInfo, preferred: Option<&str>) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert("id".to_string(), Value::String(info.id.clone()));

    let alias = preferred
        .filter(|p| info.global_aliases.iter().any(|a| a.as_str() == *p))
        .or_else(|| info.global_aliases.first().map(String::as_str));
    if let Some(alias) = alias {
        attrs.insert("global_alias".to_string(), Value::String(alias.to_string()));
    }
    attrs.insert(
        "global_aliases".to_string(),
        Value::string_list(info.global_aliases.iter().cloned()),
    );

    attrs.insert(
        "website_enabled".to_string(),
        Value::Bool(info.website_access),
    );
    if info.website_access
        && let Some(website) = &info.website_config
    {
        if let Some(index) = &website.index_document {
            attrs.insert(
                "website_index_document".to_string(),
                Value::String(index.clone()),
            );
        }
        if let Some(error) = &website.error_document {
            attrs.insert(
                "website_error_document".to_string(),
                Value::String(error.clone()),
            );
        }
    }

    if let Some(quotas) = &info.quotas {
        if let Some(max_size) = quotas.max_size {
            attrs.insert("max_size".to_string(), int_value(max_size));
        }
        if let Some(max_objects) = quotas.max_objects {
            attrs.insert("max_objects".to_string(), int_value(max_objects));
        }
    }

    attrs.insert("objects".to_string(), Value::Int(info.objects));
    attrs.insert("bytes".to_string(), Value::Int(info.bytes));
    attrs.insert(
        "unfinished_uploads".to_string(),
        Value::Int(info.unfinished_uploads),
    );
    attrs
}

fn bucket_state(id: &ResourceId, info: &BucketInfo, preferred: Option<&str>) -> State {
    State::existing(id.clone(), bucket_attributes(info, preferred)).with_identifier(&info.id)
}

/// Handler for the `garage_bucket` resource
pub struct BucketResource {
    admin: AdminClient,
}

impl BucketResource {
    pub fn new(admin: AdminClient) -> Self {
        Self { admin }
    }

    async fn fetch(&self, id: &ResourceId, bucket_id: &str) -> ProviderResult<Option<BucketInfo>> {
        self.admin
            .get_bucket_info(&BucketLookup::Id(bucket_id.to_string()))
            .await
            .map_err(|e| admin_error(id, "read bucket", e))
    }

    async fn read_back(
        &self,
        id: &ResourceId,
        bucket_id: &str,
        preferred: Option<&str>,
    ) -> ProviderResult<State> {
        let info = self.fetch(id, bucket_id).await?.ok_or_else(|| {
            ProviderError::new(format!("Bucket {} disappeared while being configured", bucket_id))
                .for_resource(id.clone())
        })?;
        Ok(bucket_state(id, &info, preferred))
    }

    pub async fn create(&self, resource: &Resource) -> ProviderResult<State> {
        let desired = validated(&bucket_schema(), resource)?;
        let website = WebsiteSettings::from_attributes(&desired);
        website.check(&resource.id)?;

        let alias = desired.get_string("global_alias");
        debug!(resource = %resource.id, alias, "Creating bucket");
        let info = self
            .admin
            .create_bucket(&CreateBucketRequest {
                global_alias: alias.map(str::to_string),
            })
            .await
            .map_err(|e| admin_error(&resource.id, "create bucket", e))?;

        // Only the blocks the caller wrote are sent
        let request = UpdateBucketRequest {
            website_access: any_set(resource, WEBSITE_ATTRIBUTES).then(|| website.to_request()),
            quotas: any_set(resource, QUOTA_ATTRIBUTES).then(|| quotas_of(&desired)),
        };
        if !request.is_empty()
            && let Err(e) = self.admin.update_bucket(&info.id, &request).await
        {
            // A failed create records no state, so the new bucket is removed
            if let Err(cleanup) = self.admin.delete_bucket(&info.id).await {
                warn!(
                    resource = %resource.id,
                    bucket_id = %info.id,
                    error = %cleanup,
                    "Failed to remove partially created bucket"
                );
            }
            return Err(admin_error(&resource.id, "configure bucket", e));
        }

        let state = self.read_back(&resource.id, &info.id, alias).await?;
        trace!(resource = %resource.id, bucket_id = %info.id, "Bucket created");
        Ok(state)
    }

    pub async fn read(&self, prior: &State) -> ProviderResult<State> {
        let bucket_id = identifier_of(prior)?;
        match self.fetch(&prior.id, bucket_id).await? {
            Some(info) => Ok(bucket_state(&prior.id, &info, prior.get_string("global_alias"))),
            None => {
                warn!(resource = %prior.id, bucket_id, "Bucket no longer exists");
                Ok(State::not_found(prior.id.clone()))
            }
        }
    }

    pub async fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let desired = validated(&bucket_schema(), to)?;
        let website = WebsiteSettings::from_attributes(&desired);
        website.check(id)?;
        debug!(resource = %id, bucket_id = identifier, "Updating bucket");

        let current_alias = from.get_string("global_alias");
        let desired_alias = desired.get_string("global_alias");
        if let Some(new_alias) = desired_alias
            && current_alias != Some(new_alias)
        {
            // Add first: a bucket may not lose its last alias
            let info = self
                .admin
                .add_bucket_alias(identifier, new_alias)
                .await
                .map_err(|e| admin_error(id, "add bucket alias", e))?;
            if let Some(old_alias) = current_alias
                && info.global_aliases.iter().any(|a| a == old_alias)
            {
                self.admin
                    .remove_bucket_alias(identifier, old_alias)
                    .await
                    .map_err(|e| admin_error(id, "remove bucket alias", e))?;
            }
        }

        // A block none of whose attributes were written is left as it is
        let mut request = UpdateBucketRequest::default();
        if any_set(to, WEBSITE_ATTRIBUTES) && website != WebsiteSettings::from_attributes(from) {
            request.website_access = Some(website.to_request());
        }
        let quotas = quotas_of(&desired);
        if any_set(to, QUOTA_ATTRIBUTES) && quotas != quotas_of(from) {
            request.quotas = Some(quotas);
        }
        if !request.is_empty() {
            self.admin
                .update_bucket(identifier, &request)
                .await
                .map_err(|e| admin_error(id, "update bucket", e))?;
        }

        let state = self
            .read_back(id, identifier, desired_alias.or(current_alias))
            .await?;
        trace!(resource = %id, bucket_id = identifier, "Bucket updated");
        Ok(state)
    }

    pub async fn delete(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        debug!(resource = %id, bucket_id = identifier, "Deleting bucket");
        match self.admin.delete_bucket(identifier).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(resource = %id, bucket_id = identifier, "Bucket already gone");
            }
            Err(e) => return Err(admin_error(id, "delete bucket", e)),
        }
        trace!(resource = %id, bucket_id = identifier, "Bucket deleted");
        Ok(())
    }

    pub async fn import(&self, id: &ResourceId, import_id: &str) -> ProviderResult<State> {
        debug!(resource = %id, bucket_id = import_id, "Importing bucket");
        let info = self.fetch(id, import_id).await?.ok_or_else(|| {
            ProviderError::new(format!("Cannot import bucket {}: not found", import_id))
                .for_resource(id.clone())
        })?;
        Ok(bucket_state(id, &info, None))
    }
}

/// Handler for the `garage_bucket` data source
pub struct BucketDataSource {
    admin: AdminClient,
}

impl BucketDataSource {
    pub fn new(admin: AdminClient) -> Self {
        Self { admin }
    }

    pub async fn read(&self, resource: &Resource) -> ProviderResult<State> {
        let query = validated(&bucket_data_source_schema(), resource)?;
        let lookup = BucketLookup::from_parts(query.get_string("id"), query.get_string("global_alias"))
            .map_err(|e| admin_error(&resource.id, "look up bucket", e))?;
        debug!(resource = %resource.id, lookup = ?lookup, "Reading bucket data source");

        let info = self
            .admin
            .get_bucket_info(&lookup)
            .await
            .map_err(|e| admin_error(&resource.id, "read bucket", e))?
            .ok_or_else(|| {
                let what = match &lookup {
                    BucketLookup::Id(id) => format!("ID '{}'", id),
                    BucketLookup::GlobalAlias(alias) => format!("global alias '{}'", alias),
                };
                ProviderError::new(format!("No bucket with {}", what))
                    .for_resource(resource.id.clone())
            })?;

        Ok(bucket_state(
            &resource.id,
            &info,
            query.get_string("global_alias"),
        ))
    }
}
