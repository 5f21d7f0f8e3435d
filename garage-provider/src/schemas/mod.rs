//! Garage resource and data source schema definitions

pub mod bucket;
pub mod bucket_permission;
pub mod key;
pub mod object;

use garage_core::schema::ResourceSchema;

pub const BUCKET: &str = "garage_bucket";
pub const KEY: &str = "garage_key";
pub const BUCKET_PERMISSION: &str = "garage_bucket_permission";
pub const OBJECT: &str = "garage_object";

/// Returns all resource schemas
pub fn resource_schemas() -> Vec<ResourceSchema> {
    vec![
        bucket::bucket_schema(),
        key::key_schema(),
        bucket_permission::bucket_permission_schema(),
        object::object_schema(),
    ]
}

/// Returns all data source schemas
pub fn data_source_schemas() -> Vec<ResourceSchema> {
    vec![
        bucket::bucket_data_source_schema(),
        object::object_data_source_schema(),
    ]
}
