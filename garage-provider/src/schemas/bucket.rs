//! Bucket schema definitions

use garage_core::resource::Value;
use garage_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::BUCKET;

/// Returns the schema for the bucket resource
pub fn bucket_schema() -> ResourceSchema {
    ResourceSchema::new(BUCKET)
        .with_description("A Garage bucket")
        .attribute(
            AttributeSchema::new("id", AttributeType::String)
                .read_only()
                .with_description("Bucket ID assigned by the cluster"),
        )
        .attribute(
            AttributeSchema::new("global_alias", types::bucket_alias())
                .computed()
                .with_description(
                    "Global alias of the bucket; changing it swaps the alias in place",
                ),
        )
        .attribute(
            AttributeSchema::new("website_enabled", AttributeType::Bool)
                .with_default(Value::Bool(false))
                .with_description("Serve the bucket as a static website"),
        )
        .attribute(
            AttributeSchema::new("website_index_document", AttributeType::String)
                .with_description("Index document, required when website access is enabled"),
        )
        .attribute(
            AttributeSchema::new("website_error_document", AttributeType::String)
                .with_description("Error document for website access"),
        )
        .attribute(
            AttributeSchema::new("max_size", types::positive_int())
                .with_description("Maximum total size of the bucket in bytes"),
        )
        .attribute(
            AttributeSchema::new("max_objects", types::positive_int())
                .with_description("Maximum number of objects in the bucket"),
        )
        .attribute(
            AttributeSchema::new("global_aliases", types::string_list())
                .read_only()
                .with_description("All global aliases of the bucket"),
        )
        .attribute(AttributeSchema::new("objects", AttributeType::Int).read_only())
        .attribute(AttributeSchema::new("bytes", AttributeType::Int).read_only())
        .attribute(AttributeSchema::new("unfinished_uploads", AttributeType::Int).read_only())
}

/// Returns the schema for the bucket data source
pub fn bucket_data_source_schema() -> ResourceSchema {
    ResourceSchema::new(BUCKET)
        .with_description("Look up an existing bucket by ID or global alias")
        .attribute(
            AttributeSchema::new("id", AttributeType::String)
                .computed()
                .with_description("Bucket ID; exactly one of 'id' or 'global_alias' is required"),
        )
        .attribute(
            AttributeSchema::new("global_alias", AttributeType::String)
                .computed()
                .with_description("Global alias to look up; reported as the first alias"),
        )
        .attribute(AttributeSchema::new("global_aliases", types::string_list()).read_only())
        .attribute(AttributeSchema::new("website_enabled", AttributeType::Bool).read_only())
        .attribute(AttributeSchema::new("website_index_document", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("website_error_document", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("max_size", AttributeType::Int).read_only())
        .attribute(AttributeSchema::new("max_objects", AttributeType::Int).read_only())
        .attribute(AttributeSchema::new("objects", AttributeType::Int).read_only())
        .attribute(AttributeSchema::new("bytes", AttributeType::Int).read_only())
        .attribute(AttributeSchema::new("unfinished_uploads", AttributeType::Int).read_only())
}
