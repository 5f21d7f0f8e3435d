//! Object schema definitions

use garage_core::schema::{AttributeSchema, AttributeType, Constraint, ResourceSchema, types};

use super::OBJECT;

/// Returns the schema for the object resource
pub fn object_schema() -> ResourceSchema {
    ResourceSchema::new(OBJECT)
        .with_description("An object stored through the S3 API")
        .attribute(
            AttributeSchema::new("bucket", AttributeType::String)
                .required()
                .requires_replace()
                .with_description("Bucket name (global alias)"),
        )
        .attribute(
            AttributeSchema::new("key", AttributeType::String)
                .required()
                .requires_replace()
                .with_description("Object key"),
        )
        .attribute(
            AttributeSchema::new("source", AttributeType::String)
                .with_description("Path of a local file to upload"),
        )
        .attribute(
            AttributeSchema::new("content", AttributeType::String)
                .sensitive()
                .with_description("Literal string value to use as object content"),
        )
        .attribute(
            AttributeSchema::new("content_type", AttributeType::String)
                .computed()
                .with_description(
                    "MIME type; defaults to application/octet-stream for files and text/plain for content",
                ),
        )
        .attribute(
            AttributeSchema::new("metadata", types::string_map())
                .with_description("User metadata stored with the object"),
        )
        .attribute(AttributeSchema::new("etag", AttributeType::String).read_only())
        .attribute(
            AttributeSchema::new("id", AttributeType::String)
                .read_only()
                .with_description("'<bucket>/<key>'"),
        )
        .constraint(Constraint::exactly_one_of(["source", "content"]))
}

/// Returns the schema for the object data source
pub fn object_data_source_schema() -> ResourceSchema {
    ResourceSchema::new(OBJECT)
        .with_description("Download an existing object")
        .attribute(AttributeSchema::new("bucket", AttributeType::String).required())
        .attribute(AttributeSchema::new("key", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("body", AttributeType::String)
                .read_only()
                .sensitive()
                .with_description("Object content decoded as UTF-8"),
        )
        .attribute(AttributeSchema::new("content_type", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("content_length", AttributeType::Int).read_only())
        .attribute(AttributeSchema::new("etag", AttributeType::String).read_only())
        .attribute(
            AttributeSchema::new("last_modified", AttributeType::String)
                .read_only()
                .with_description("RFC 3339 timestamp"),
        )
        .attribute(AttributeSchema::new("metadata", types::string_map()).read_only())
        .attribute(AttributeSchema::new("version_id", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("id", AttributeType::String).read_only())
}
