//! garage_key resource

use std::collections::HashMap;

use garage_admin::AdminClient;
use garage_admin::types::{CreateKeyRequest, ImportKeyRequest, KeyInfo, UpdateKeyRequest};
use garage_core::provider::{ProviderError, ProviderResult};
use garage_core::resource::{Attributes, Resource, ResourceId, State, Value};
use tracing::{debug, trace, warn};

use super::{admin_error, ensure_in_place, identifier_of, validated};
use crate::schemas::key::key_schema;

/// State for a key; the secret is never returned by reads, so it is passed
/// in from whoever last knew it
fn key_state(id: &ResourceId, info: &KeyInfo, secret: Option<&str>) -> State {
    let mut attrs = HashMap::new();
    attrs.insert("id".to_string(), Value::String(info.access_key_id.clone()));
    attrs.insert("name".to_string(), Value::String(info.name.clone()));
    if let Some(secret) = secret {
        attrs.insert(
            "secret_access_key".to_string(),
            Value::String(secret.to_string()),
        );
    }
    State::existing(id.clone(), attrs).with_identifier(&info.access_key_id)
}

/// Handler for the `garage_key` resource
pub struct KeyResource {
    admin: AdminClient,
}

impl KeyResource {
    pub fn new(admin: AdminClient) -> Self {
        Self { admin }
    }

    async fn fetch(&self, id: &ResourceId, key_id: &str) -> ProviderResult<Option<KeyInfo>> {
        self.admin
            .get_key_info(key_id)
            .await
            .map_err(|e| admin_error(id, "read access key", e))
    }

    pub async fn create(&self, resource: &Resource) -> ProviderResult<State> {
        let desired = validated(&key_schema(), resource)?;
        let name = desired.get_string("name");
        let key_id = desired.get_string("id");
        let secret = desired.get_string("secret_access_key");

        let (info, secret) = if key_id.is_some() || secret.is_some() {
            let request = ImportKeyRequest::from_parts(key_id, secret, name)
                .map_err(|e| admin_error(&resource.id, "import access key", e))?;
            debug!(resource = %resource.id, key_id = %request.access_key_id, "Importing access key");
            let info = self
                .admin
                .import_key(&request)
                .await
                .map_err(|e| admin_error(&resource.id, "import access key", e))?;
            (info, request.secret_access_key)
        } else {
            debug!(resource = %resource.id, name, "Creating access key");
            let info = self
                .admin
                .create_key(&CreateKeyRequest {
                    name: name.map(str::to_string),
                })
                .await
                .map_err(|e| admin_error(&resource.id, "create access key", e))?;
            let secret = info.secret_access_key.clone().ok_or_else(|| {
                ProviderError::new("Cluster did not return a secret for the new key")
                    .for_resource(resource.id.clone())
            })?;
            (info, secret)
        };

        trace!(resource = %resource.id, key_id = %info.access_key_id, "Access key created");
        Ok(key_state(&resource.id, &info, Some(&secret)))
    }

    pub async fn read(&self, prior: &State) -> ProviderResult<State> {
        let key_id = identifier_of(prior)?;
        match self.fetch(&prior.id, key_id).await? {
            Some(info) => Ok(key_state(
                &prior.id,
                &info,
                prior.get_string("secret_access_key"),
            )),
            None => {
                warn!(resource = %prior.id, key_id, "Access key no longer exists");
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
        let schema = key_schema();
        let desired = validated(&schema, to)?;
        ensure_in_place(&schema, from, &desired)?;

        if let Some(name) = desired.get_string("name")
            && from.get_string("name") != Some(name)
        {
            debug!(resource = %id, key_id = identifier, name, "Renaming access key");
            self.admin
                .update_key(
                    identifier,
                    &UpdateKeyRequest {
                        name: Some(name.to_string()),
                    },
                )
                .await
                .map_err(|e| admin_error(id, "update access key", e))?;
        }

        let info = self.fetch(id, identifier).await?.ok_or_else(|| {
            ProviderError::new(format!("Access key {} disappeared during update", identifier))
                .for_resource(id.clone())
        })?;
        Ok(key_state(id, &info, from.get_string("secret_access_key")))
    }

    pub async fn delete(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        debug!(resource = %id, key_id = identifier, "Deleting access key");
        match self.admin.delete_key(identifier).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(resource = %id, key_id = identifier, "Access key already gone");
                Ok(())
            }
            Err(e) => Err(admin_error(id, "delete access key", e)),
        }
    }

    /// Import by key ID; the secret stays unknown
    pub async fn import(&self, id: &ResourceId, import_id: &str) -> ProviderResult<State> {
        debug!(resource = %id, key_id = import_id, "Importing access key into state");
        let info = self.fetch(id, import_id).await?.ok_or_else(|| {
            ProviderError::new(format!("Cannot import access key {}: not found", import_id))
                .for_resource(id.clone())
        })?;
        Ok(key_state(id, &info, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garage_admin::testing::FakeGarage;

    const TOKEN: &str = "key-test-token";
    const IMPORT_ID: &str = "GK5a1e2f3d4c5b6a7980a1b2c3";

    fn key(name: &str) -> Resource {
        Resource::new("garage_key", name)
    }

    fn text(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[tokio::test]
    async fn generated_key_keeps_secret_across_reads() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let handler = KeyResource::new(garage.client());

        let created = handler.create(&key("ci")).await.unwrap();
        let key_id = created.get_string("id").unwrap().to_string();
        let secret = created.get_string("secret_access_key").unwrap().to_string();
        assert!(!key_id.is_empty());
        assert!(!secret.is_empty());
        assert_eq!(created.get_string("name"), Some(""));

        let read = handler.read(&created).await.unwrap();
        assert_eq!(read.get_string("id"), Some(key_id.as_str()));
        assert_eq!(read.get_string("name"), Some(""));
        assert_eq!(read.get_string("secret_access_key"), Some(secret.as_str()));
        assert_eq!(garage.key(&key_id).unwrap().secret_access_key, Some(secret));
    }

    #[tokio::test]
    async fn partial_import_is_rejected_without_network() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let handler = KeyResource::new(garage.client());

        let err = handler
            .create(&key("half").with_attribute("id", text(IMPORT_ID)))
            .await
            .unwrap_err();
        assert!(err.message.starts_with("Invalid configuration"));

        let err = handler
            .create(&key("half").with_attribute("secret_access_key", text("s")))
            .await
            .unwrap_err();
        assert!(err.message.starts_with("Invalid configuration"));
        assert_eq!(garage.request_count(), 0);
    }

    #[tokio::test]
    async fn import_uses_supplied_credentials() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let handler = KeyResource::new(garage.client());
        let desired = key("legacy")
            .with_attribute("id", text(IMPORT_ID))
            .with_attribute("secret_access_key", text(&"f".repeat(64)))
            .with_attribute("name", text("legacy"));

        let state = handler.create(&desired).await.unwrap();
        assert_eq!(state.identifier.as_deref(), Some(IMPORT_ID));
        assert_eq!(state.get_string("name"), Some("legacy"));
        assert_eq!(
            garage.key(IMPORT_ID).unwrap().secret_access_key,
            Some("f".repeat(64))
        );

        let err = handler.create(&desired).await.unwrap_err();
        assert!(err.to_string().contains("409"));
    }

    #[tokio::test]
    async fn rename_in_place_and_refuse_id_change() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let handler = KeyResource::new(garage.client());
        let created = handler
            .create(&key("ci").with_attribute("name", text("before")))
            .await
            .unwrap();
        let key_id = created.identifier.clone().unwrap();

        let desired = key("ci").with_attribute("name", text("after"));
        let updated = handler
            .update(&desired.id, &key_id, &created, &desired)
            .await
            .unwrap();
        assert_eq!(updated.get_string("name"), Some("after"));
        assert_eq!(
            updated.get_string("secret_access_key"),
            created.get_string("secret_access_key")
        );

        let requests = garage.request_count();
        let desired = key("ci")
            .with_attribute("id", text(IMPORT_ID))
            .with_attribute("secret_access_key", text("other"));
        let err = handler
            .update(&desired.id, &key_id, &updated, &desired)
            .await
            .unwrap_err();
        assert!(err.message.contains("requires replacing"));
        assert_eq!(garage.request_count(), requests);
    }

    #[tokio::test]
    async fn deleted_key_is_dropped_on_read() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let handler = KeyResource::new(garage.client());
        let created = handler.create(&key("tmp")).await.unwrap();
        let key_id = created.identifier.clone().unwrap();

        handler.delete(&created.id, &key_id).await.unwrap();
        assert!(!handler.read(&created).await.unwrap().exists);
        handler.delete(&created.id, &key_id).await.unwrap();
    }

    #[tokio::test]
    async fn import_existing_key_without_secret() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let handler = KeyResource::new(garage.client());
        let created = handler.create(&key("orig")).await.unwrap();
        let key_id = created.identifier.unwrap();

        let state = handler
            .import(&ResourceId::new("garage_key", "copy"), &key_id)
            .await
            .unwrap();
        assert_eq!(state.get_string("id"), Some(key_id.as_str()));
        assert_eq!(state.get_string("secret_access_key"), None);
    }
}
