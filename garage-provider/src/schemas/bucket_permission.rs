//! Bucket permission schema definition

use garage_core::resource::Value;
use garage_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::BUCKET_PERMISSION;

/// Returns the schema for bucket permissions
pub fn bucket_permission_schema() -> ResourceSchema {
    ResourceSchema::new(BUCKET_PERMISSION)
        .with_description("Capabilities of one access key on one bucket; at least one flag must be true")
        .attribute(
            AttributeSchema::new("bucket_id", AttributeType::String)
                .required()
                .requires_replace(),
        )
        .attribute(
            AttributeSchema::new("access_key_id", AttributeType::String)
                .required()
                .requires_replace(),
        )
        .attribute(flag("read", "Allow reading objects"))
        .attribute(flag("write", "Allow writing and deleting objects"))
        .attribute(flag("owner", "Allow changing bucket settings"))
        .attribute(
            AttributeSchema::new("id", AttributeType::String)
                .read_only()
                .with_description("'<bucket_id>/<access_key_id>'"),
        )
}

fn flag(name: &str, description: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::Bool)
        .with_default(Value::Bool(false))
        .with_description(description)
}
