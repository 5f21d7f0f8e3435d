//! Garage Provider
//!
//! Buckets, access keys and their permissions through the Garage admin API,
//! and objects through the S3 API.

pub mod config;
pub mod resources;
pub mod schemas;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::{Credentials, RequestChecksumCalculation, ResponseChecksumValidation};
use garage_admin::AdminClient;
use garage_core::provider::{
    BoxFuture, Provider, ProviderError, ProviderResult, ResourceKind, ResourceType,
};
use garage_core::resource::{Resource, ResourceId, State};
use garage_core::schema::ResourceSchema;
use tracing::debug;

use crate::config::{ConfigError, GarageConfig, S3_REGION, S3Credentials};
use crate::resources::bucket::{BucketDataSource, BucketResource};
use crate::resources::bucket_permission::BucketPermissionResource;
use crate::resources::key::KeyResource;
use crate::resources::object::{ObjectDataSource, ObjectResource};
use crate::schemas::{BUCKET, BUCKET_PERMISSION, KEY, OBJECT};

/// garage_bucket resource type
pub struct BucketType;

impl ResourceType for BucketType {
    fn name(&self) -> &'static str {
        BUCKET
    }

    fn schema(&self) -> ResourceSchema {
        schemas::bucket::bucket_schema()
    }
}

/// garage_key resource type
pub struct KeyType;

impl ResourceType for KeyType {
    fn name(&self) -> &'static str {
        KEY
    }

    fn schema(&self) -> ResourceSchema {
        schemas::key::key_schema()
    }
}

/// garage_bucket_permission resource type
pub struct BucketPermissionType;

impl ResourceType for BucketPermissionType {
    fn name(&self) -> &'static str {
        BUCKET_PERMISSION
    }

    fn schema(&self) -> ResourceSchema {
        schemas::bucket_permission::bucket_permission_schema()
    }
}

/// garage_object resource type
pub struct ObjectType;

impl ResourceType for ObjectType {
    fn name(&self) -> &'static str {
        OBJECT
    }

    fn schema(&self) -> ResourceSchema {
        schemas::object::object_schema()
    }
}

/// garage_bucket data source
pub struct BucketDataSourceType;

impl ResourceType for BucketDataSourceType {
    fn name(&self) -> &'static str {
        BUCKET
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::DataSource
    }

    fn schema(&self) -> ResourceSchema {
        schemas::bucket::bucket_data_source_schema()
    }
}

/// garage_object data source
pub struct ObjectDataSourceType;

impl ResourceType for ObjectDataSourceType {
    fn name(&self) -> &'static str {
        OBJECT
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::DataSource
    }

    fn schema(&self) -> ResourceSchema {
        schemas::object::object_data_source_schema()
    }
}

/// Build an S3 client for a Garage S3 endpoint
///
/// Garage serves buckets path-style and only accepts payload checksums it
/// was asked for, so both are pinned here.
pub async fn connect_s3(endpoint: &str, credentials: &S3Credentials) -> S3Client {
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(S3_REGION))
        .endpoint_url(endpoint)
        .credentials_provider(Credentials::new(
            &credentials.access_key,
            &credentials.secret_key,
            None,
            None,
            "garage-provider",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(true)
        .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
        .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
        .build();
    S3Client::from_conf(s3_config)
}

/// Garage Provider
pub struct GarageProvider {
    buckets: BucketResource,
    keys: KeyResource,
    permissions: BucketPermissionResource,
    objects: ObjectResource,
    bucket_data: BucketDataSource,
    object_data: ObjectDataSource,
}

impl GarageProvider {
    /// Create a provider from a resolved configuration
    ///
    /// The S3 client is only built when an S3 endpoint is configured; object
    /// operations fail without one.
    pub async fn new(config: &GarageConfig) -> Result<Self, ConfigError> {
        let admin = AdminClient::new(&config.admin_endpoint, config.token.clone())?;
        let s3 = match (&config.s3_endpoint, &config.s3_credentials) {
            (Some(endpoint), Some(credentials)) => {
                debug!(endpoint = %endpoint, "Connecting to S3 endpoint");
                Some(connect_s3(endpoint, credentials).await)
            }
            (Some(_), None) => return Err(ConfigError::MissingS3Credentials),
            (None, _) => None,
        };
        debug!(admin_endpoint = %admin.base_url(), s3 = s3.is_some(), "Garage provider ready");
        Ok(Self::with_clients(admin, s3))
    }

    /// Create with pre-built clients (for testing)
    pub fn with_clients(admin: AdminClient, s3: Option<S3Client>) -> Self {
        Self {
            buckets: BucketResource::new(admin.clone()),
            keys: KeyResource::new(admin.clone()),
            permissions: BucketPermissionResource::new(admin.clone()),
            objects: ObjectResource::new(s3.clone()),
            bucket_data: BucketDataSource::new(admin),
            object_data: ObjectDataSource::new(s3),
        }
    }
}

fn unknown_type(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

impl Provider for GarageProvider {
    fn name(&self) -> &'static str {
        "garage"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        vec![
            Box::new(BucketType),
            Box::new(KeyType),
            Box::new(BucketPermissionType),
            Box::new(ObjectType),
            Box::new(BucketDataSourceType),
            Box::new(ObjectDataSourceType),
        ]
    }

    fn read<'a>(&'a self, prior: &'a State) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(async move {
            match prior.id.resource_type.as_str() {
                BUCKET => self.buckets.read(prior).await,
                KEY => self.keys.read(prior).await,
                BUCKET_PERMISSION => self.permissions.read(prior).await,
                OBJECT => self.objects.read(prior).await,
                _ => Err(unknown_type(&prior.id)),
            }
        })
    }

    fn read_data_source<'a>(
        &'a self,
        resource: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                BUCKET => self.bucket_data.read(resource).await,
                OBJECT => self.object_data.read(resource).await,
                _ => Err(ProviderError::new(format!(
                    "Unknown data source type: {}",
                    resource.id.resource_type
                ))
                .for_resource(resource.id.clone())),
            }
        })
    }

    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                BUCKET => self.buckets.create(resource).await,
                KEY => self.keys.create(resource).await,
                BUCKET_PERMISSION => self.permissions.create(resource).await,
                OBJECT => self.objects.create(resource).await,
                _ => Err(unknown_type(&resource.id)),
            }
        })
    }

    fn update<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(async move {
            match id.resource_type.as_str() {
                BUCKET => self.buckets.update(id, identifier, from, to).await,
                KEY => self.keys.update(id, identifier, from, to).await,
                // Pair identity lives in the attributes
                BUCKET_PERMISSION => self.permissions.update(id, from, to).await,
                OBJECT => self.objects.update(from, to).await,
                _ => Err(unknown_type(id)),
            }
        })
    }

    fn delete<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        prior: &'a State,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            match id.resource_type.as_str() {
                BUCKET => self.buckets.delete(id, identifier).await,
                KEY => self.keys.delete(id, identifier).await,
                BUCKET_PERMISSION => self.permissions.delete(id, prior).await,
                OBJECT => self.objects.delete(id, prior).await,
                _ => Err(unknown_type(id)),
            }
        })
    }

    fn import<'a>(
        &'a self,
        id: &'a ResourceId,
        import_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(async move {
            match id.resource_type.as_str() {
                BUCKET => self.buckets.import(id, import_id).await,
                KEY => self.keys.import(id, import_id).await,
                BUCKET_PERMISSION => self.permissions.import(id, import_id).await,
                OBJECT => self.objects.import(id, import_id).await,
                _ => Err(unknown_type(id)),
            }
        })
    }
}
