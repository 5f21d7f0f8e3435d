//! Resource and data source handlers

pub mod bucket;
pub mod bucket_permission;
pub mod key;
pub mod object;

use garage_admin::AdminError;
use garage_core::provider::{ProviderError, ProviderResult};
use garage_core::resource::{Attributes, Resource, ResourceId, State, Value};
use garage_core::schema::ResourceSchema;

/// Validate desired attributes and fill in schema defaults
pub(crate) fn validated(schema: &ResourceSchema, resource: &Resource) -> ProviderResult<Resource> {
    schema
        .validate(&resource.attributes)
        .map_err(|errors| ProviderError::invalid(errors).for_resource(resource.id.clone()))?;
    Ok(Resource {
        attributes: schema.with_defaults(&resource.attributes),
        ..resource.clone()
    })
}

/// Refuse an in-place update that changes a `requires_replace` attribute
pub(crate) fn ensure_in_place(
    schema: &ResourceSchema,
    from: &State,
    to: &Resource,
) -> ProviderResult<()> {
    let changed = schema.replacement_changes(&from.attributes, &to.attributes);
    if changed.is_empty() {
        return Ok(());
    }
    Err(ProviderError::new(format!(
        "Changing {} requires replacing the resource",
        changed
            .iter()
            .map(|n| format!("'{}'", n))
            .collect::<Vec<_>>()
            .join(", ")
    ))
    .for_resource(to.id.clone()))
}

/// Cluster-side identifier of a tracked resource
pub(crate) fn identifier_of(prior: &State) -> ProviderResult<&str> {
    prior
        .identifier
        .as_deref()
        .or_else(|| prior.get_string("id"))
        .ok_or_else(|| {
            ProviderError::new("Resource has no identifier").for_resource(prior.id.clone())
        })
}

pub(crate) fn admin_error(id: &ResourceId, action: &str, err: AdminError) -> ProviderError {
    ProviderError::new(format!("Unable to {}", action))
        .for_resource(id.clone())
        .with_cause(err)
}

/// Counters and quotas are unsigned on the wire
pub(crate) fn int_value(n: u64) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

pub(crate) fn positive_u64(n: Option<i64>) -> Option<u64> {
    n.and_then(|n| u64::try_from(n).ok())
}

/// Split an import ID of the form `<first>/<rest>` at the first `/`
pub(crate) fn split_import_id<'a>(
    id: &ResourceId,
    import_id: &'a str,
    expected: &str,
) -> ProviderResult<(&'a str, &'a str)> {
    match import_id.split_once('/') {
        Some((first, rest)) if !first.is_empty() && !rest.is_empty() => Ok((first, rest)),
        _ => Err(ProviderError::new(format!(
            "Expected import ID in format '{}', got: {}",
            expected, import_id
        ))
        .for_resource(id.clone())),
    }
}
