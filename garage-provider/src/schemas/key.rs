//! Access key schema definition

use garage_core::schema::{AttributeSchema, AttributeType, Constraint, ResourceSchema};

use super::KEY;

/// Returns the schema for access keys
///
/// Supplying both `id` and `secret_access_key` imports existing credentials;
/// supplying neither lets the cluster generate them.
pub fn key_schema() -> ResourceSchema {
    ResourceSchema::new(KEY)
        .with_description("A Garage S3 access key")
        .attribute(
            AttributeSchema::new("id", AttributeType::String)
                .computed()
                .requires_replace()
                .with_description("Access key ID; set together with 'secret_access_key' to import"),
        )
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .computed()
                .with_description("Human-readable name of the key"),
        )
        .attribute(
            AttributeSchema::new("secret_access_key", AttributeType::String)
                .computed()
                .sensitive()
                .requires_replace()
                .with_description("Secret access key; only known after create or import"),
        )
        .constraint(Constraint::required_together(["id", "secret_access_key"]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use garage_core::resource::Value;
    use garage_core::schema::TypeError;
    use std::collections::HashMap;

    #[test]
    fn generated_key() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("ci".to_string()));
        assert!(key_schema().validate(&attrs).is_ok());
    }

    #[test]
    fn imported_key() {
        let mut attrs = HashMap::new();
        attrs.insert("id".to_string(), Value::String("GK123".to_string()));
        attrs.insert(
            "secret_access_key".to_string(),
            Value::String("secret".to_string()),
        );
        assert!(key_schema().validate(&attrs).is_ok());
    }

    #[test]
    fn id_without_secret() {
        let mut attrs = HashMap::new();
        attrs.insert("id".to_string(), Value::String("GK123".to_string()));
        assert_eq!(
            key_schema().validate(&attrs).unwrap_err(),
            vec![TypeError::RequiredTogether {
                names: vec!["id".to_string(), "secret_access_key".to_string()]
            }]
        );
    }

    #[test]
    fn secret_is_sensitive() {
        assert_eq!(key_schema().sensitive_attributes(), vec!["secret_access_key"]);
    }
}
