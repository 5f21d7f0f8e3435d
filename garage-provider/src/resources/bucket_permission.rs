//! garage_bucket_permission resource

use std::collections::HashMap;

use garage_admin::AdminClient;
use garage_admin::types::{BucketKeyPermRequest, BucketLookup, BucketPermissions};
use garage_core::provider::{ProviderError, ProviderResult};
use garage_core::resource::{Attributes, Resource, ResourceId, State, Value};
use tracing::{debug, trace, warn};

use super::{admin_error, ensure_in_place, identifier_of, split_import_id, validated};
use crate::schemas::bucket_permission::bucket_permission_schema;

const IMPORT_FORMAT: &str = "bucket_id/access_key_id";

/// One (bucket, key) pair
#[derive(Debug, Clone, PartialEq, Eq)]
struct Grant {
    bucket_id: String,
    access_key_id: String,
}

impl Grant {
    fn from_attributes(attrs: &impl Attributes, id: &ResourceId) -> ProviderResult<Self> {
        match (attrs.get_string("bucket_id"), attrs.get_string("access_key_id")) {
            (Some(bucket_id), Some(access_key_id)) => Ok(Self {
                bucket_id: bucket_id.to_string(),
                access_key_id: access_key_id.to_string(),
            }),
            _ => Err(ProviderError::new("Both 'bucket_id' and 'access_key_id' are required")
                .for_resource(id.clone())),
        }
    }

    /// Pair of a tracked grant, falling back to its `bucket_id/access_key_id` identifier
    fn from_state(prior: &State) -> ProviderResult<Self> {
        if let Ok(grant) = Self::from_attributes(prior, &prior.id) {
            return Ok(grant);
        }
        let identifier = identifier_of(prior)?;
        let (bucket_id, access_key_id) = split_import_id(&prior.id, identifier, IMPORT_FORMAT)?;
        Ok(Self {
            bucket_id: bucket_id.to_string(),
            access_key_id: access_key_id.to_string(),
        })
    }

    fn identifier(&self) -> String {
        format!("{}/{}", self.bucket_id, self.access_key_id)
    }

    fn request(&self, permissions: BucketPermissions) -> BucketKeyPermRequest {
        BucketKeyPermRequest {
            bucket_id: self.bucket_id.clone(),
            access_key_id: self.access_key_id.clone(),
            permissions,
        }
    }

    fn state(&self, id: &ResourceId, permissions: BucketPermissions) -> State {
        let mut attrs = HashMap::new();
        attrs.insert("id".to_string(), Value::String(self.identifier()));
        attrs.insert(
            "bucket_id".to_string(),
            Value::String(self.bucket_id.clone()),
        );
        attrs.insert(
            "access_key_id".to_string(),
            Value::String(self.access_key_id.clone()),
        );
        attrs.insert("read".to_string(), Value::Bool(permissions.read));
        attrs.insert("write".to_string(), Value::Bool(permissions.write));
        attrs.insert("owner".to_string(), Value::Bool(permissions.owner));
        State::existing(id.clone(), attrs).with_identifier(self.identifier())
    }
}

/// Desired flags; a pair without any flag is not tracked by Garage, so it is refused
fn desired_permissions(attrs: &impl Attributes, id: &ResourceId) -> ProviderResult<BucketPermissions> {
    let wanted = BucketPermissions::new(
        attrs.get_bool_or("read", false),
        attrs.get_bool_or("write", false),
        attrs.get_bool_or("owner", false),
    );
    if wanted.is_empty() {
        return Err(ProviderError::new(
            "At least one of 'read', 'write' or 'owner' must be true; delete the permission to revoke all access",
        )
        .for_resource(id.clone()));
    }
    Ok(wanted)
}

/// Handler for the `garage_bucket_permission` resource
pub struct BucketPermissionResource {
    admin: AdminClient,
}

impl BucketPermissionResource {
    pub fn new(admin: AdminClient) -> Self {
        Self { admin }
    }

    /// Make the pair hold exactly `wanted`: grant the set flags, revoke the rest
    async fn apply(
        &self,
        id: &ResourceId,
        grant: &Grant,
        wanted: BucketPermissions,
    ) -> ProviderResult<State> {
        debug!(
            resource = %id,
            bucket_id = %grant.bucket_id,
            access_key_id = %grant.access_key_id,
            permissions = ?wanted,
            "Applying bucket permission"
        );

        let mut info = None;
        if !wanted.is_empty() {
            info = Some(
                self.admin
                    .set_bucket_permission(&grant.request(wanted))
                    .await
                    .map_err(|e| admin_error(id, "grant bucket permission", e))?,
            );
        }
        let revoked = wanted.complement();
        if !revoked.is_empty() {
            info = Some(
                self.admin
                    .clear_bucket_permission(&grant.request(revoked))
                    .await
                    .map_err(|e| admin_error(id, "revoke bucket permission", e))?,
            );
        }

        let actual = info
            .as_ref()
            .and_then(|info| info.key_permissions(&grant.access_key_id))
            .copied()
            .unwrap_or_default();
        trace!(resource = %id, permissions = ?actual, "Bucket permission applied");
        Ok(grant.state(id, actual))
    }

    async fn fetch(&self, id: &ResourceId, grant: &Grant) -> ProviderResult<Option<BucketPermissions>> {
        let info = self
            .admin
            .get_bucket_info(&BucketLookup::Id(grant.bucket_id.clone()))
            .await
            .map_err(|e| admin_error(id, "read bucket permission", e))?;
        Ok(info
            .as_ref()
            .and_then(|info| info.key_permissions(&grant.access_key_id))
            .copied()
            .filter(|perms| !perms.is_empty()))
    }

    pub async fn create(&self, resource: &Resource) -> ProviderResult<State> {
        let desired = validated(&bucket_permission_schema(), resource)?;
        let grant = Grant::from_attributes(&desired, &resource.id)?;
        let wanted = desired_permissions(&desired, &resource.id)?;
        self.apply(&resource.id, &grant, wanted).await
    }

    pub async fn read(&self, prior: &State) -> ProviderResult<State> {
        let grant = Grant::from_state(prior)?;
        match self.fetch(&prior.id, &grant).await? {
            Some(perms) => Ok(grant.state(&prior.id, perms)),
            None => {
                warn!(
                    resource = %prior.id,
                    bucket_id = %grant.bucket_id,
                    access_key_id = %grant.access_key_id,
                    "Bucket permission no longer exists"
                );
                Ok(State::not_found(prior.id.clone()))
            }
        }
    }

    pub async fn update(
        &self,
        id: &ResourceId,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let schema = bucket_permission_schema();
        let desired = validated(&schema, to)?;
        ensure_in_place(&schema, from, &desired)?;
        let grant = Grant::from_attributes(&desired, id)?;
        let wanted = desired_permissions(&desired, id)?;
        self.apply(id, &grant, wanted).await
    }

    /// Revoke all three flags
    pub async fn delete(&self, id: &ResourceId, prior: &State) -> ProviderResult<()> {
        let grant = Grant::from_state(prior)?;
        debug!(
            resource = %id,
            bucket_id = %grant.bucket_id,
            access_key_id = %grant.access_key_id,
            "Revoking bucket permission"
        );
        match self
            .admin
            .clear_bucket_permission(&grant.request(BucketPermissions::all()))
            .await
        {
            Ok(_) => Ok(()),
            // Bucket or key deleted: nothing left to revoke
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(admin_error(id, "revoke bucket permission", e)),
        }
    }

    pub async fn import(&self, id: &ResourceId, import_id: &str) -> ProviderResult<State> {
        let (bucket_id, access_key_id) = split_import_id(id, import_id, IMPORT_FORMAT)?;
        let grant = Grant {
            bucket_id: bucket_id.to_string(),
            access_key_id: access_key_id.to_string(),
        };
        let perms = self.fetch(id, &grant).await?.ok_or_else(|| {
            ProviderError::new(format!(
                "Cannot import bucket permission {}: key has no access to the bucket",
                import_id
            ))
            .for_resource(id.clone())
        })?;
        Ok(grant.state(id, perms))
    }
}
