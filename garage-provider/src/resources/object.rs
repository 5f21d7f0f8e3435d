//! garage_object resource and data source

use std::collections::HashMap;

use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTimeFormat};
use garage_core::provider::{ProviderError, ProviderResult};
use garage_core::resource::{Attributes, Resource, ResourceId, State, Value};
use tracing::{debug, trace, warn};

use super::{ensure_in_place, identifier_of, split_import_id, validated};
use crate::schemas::object::{object_data_source_schema, object_schema};

const IMPORT_FORMAT: &str = "bucket/key";
const FILE_CONTENT_TYPE: &str = "application/octet-stream";
const TEXT_CONTENT_TYPE: &str = "text/plain";

fn s3_error<E>(id: &ResourceId, action: &str, err: SdkError<E>) -> ProviderError
where
    E: std::error::Error + 'static,
{
    ProviderError::new(format!("Unable to {}: {}", action, DisplayErrorContext(&err)))
        .for_resource(id.clone())
}

fn is_not_found<E>(err: &SdkError<E>) -> bool {
    match err {
        SdkError::ServiceError(service_err) => service_err.raw().status().as_u16() == 404,
        _ => false,
    }
}

fn missing_s3(id: &ResourceId) -> ProviderError {
    ProviderError::new("S3 endpoint must be configured in 'endpoints.s3' for object operations")
        .for_resource(id.clone())
}

fn object_id(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, key)
}

/// Bucket and key of a tracked object
fn location(prior: &State) -> ProviderResult<(String, String)> {
    if let (Some(bucket), Some(key)) = (prior.get_string("bucket"), prior.get_string("key")) {
        return Ok((bucket.to_string(), key.to_string()));
    }
    let identifier = identifier_of(prior)?;
    let (bucket, key) = split_import_id(&prior.id, identifier, IMPORT_FORMAT)?;
    Ok((bucket.to_string(), key.to_string()))
}

/// Everything needed for one PutObject call
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Upload {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub metadata: HashMap<String, String>,
}

impl Upload {
    /// Resolve the body from `source` (file path) or `content` (literal)
    pub(crate) async fn from_resource(desired: &Resource) -> ProviderResult<Self> {
        let id = &desired.id;
        let required = |name: &str| {
            desired.get_string(name).map(str::to_string).ok_or_else(|| {
                ProviderError::new(format!("'{}' is required", name)).for_resource(id.clone())
            })
        };
        let bucket = required("bucket")?;
        let key = required("key")?;

        let (body, default_type) = match (desired.get_string("source"), desired.get_string("content")) {
            (Some(path), None) => {
                let body = tokio::fs::read(path).await.map_err(|e| {
                    ProviderError::new(format!("Unable to read source file '{}'", path))
                        .for_resource(id.clone())
                        .with_cause(e)
                })?;
                (body, FILE_CONTENT_TYPE)
            }
            (None, Some(content)) => (content.as_bytes().to_vec(), TEXT_CONTENT_TYPE),
            _ => {
                return Err(ProviderError::new(
                    "Exactly one of 'source' or 'content' must be specified",
                )
                .for_resource(id.clone()));
            }
        };

        Ok(Self {
            bucket,
            key,
            body,
            content_type: desired
                .get_string("content_type")
                .unwrap_or(default_type)
                .to_string(),
            metadata: desired.get_string_map("metadata").unwrap_or_default(),
        })
    }
}

/// Handler for the `garage_object` resource
pub struct ObjectResource {
    s3: Option<S3Client>,
}

impl ObjectResource {
    pub fn new(s3: Option<S3Client>) -> Self {
        Self { s3 }
    }

    fn client(&self, id: &ResourceId) -> ProviderResult<&S3Client> {
        self.s3.as_ref().ok_or_else(|| missing_s3(id))
    }

    /// Shared by create and update: objects are always replaced whole
    async fn upload(&self, desired: &Resource) -> ProviderResult<State> {
        let s3 = self.client(&desired.id)?;
        let upload = Upload::from_resource(desired).await?;
        debug!(
            resource = %desired.id,
            bucket = %upload.bucket,
            key = %upload.key,
            size = upload.body.len(),
            content_type = %upload.content_type,
            "Uploading object"
        );

        let metadata = (!upload.metadata.is_empty()).then(|| upload.metadata.clone());
        let output = s3
            .put_object()
            .bucket(&upload.bucket)
            .key(&upload.key)
            .content_type(&upload.content_type)
            .set_metadata(metadata)
            .body(ByteStream::from(upload.body))
            .send()
            .await
            .map_err(|e| s3_error(&desired.id, "upload object", e))?;

        let identifier = object_id(&upload.bucket, &upload.key);
        let mut attrs = desired.attributes.clone();
        attrs.insert(
            "content_type".to_string(),
            Value::String(upload.content_type),
        );
        attrs.insert("id".to_string(), Value::String(identifier.clone()));
        if let Some(etag) = output.e_tag() {
            attrs.insert("etag".to_string(), Value::String(etag.to_string()));
        }
        trace!(resource = %desired.id, id = %identifier, "Object uploaded");
        Ok(State::existing(desired.id.clone(), attrs).with_identifier(identifier))
    }

    pub async fn create(&self, resource: &Resource) -> ProviderResult<State> {
        let desired = validated(&object_schema(), resource)?;
        self.upload(&desired).await
    }

    pub async fn update(&self, from: &State, to: &Resource) -> ProviderResult<State> {
        let schema = object_schema();
        let desired = validated(&schema, to)?;
        ensure_in_place(&schema, from, &desired)?;
        self.upload(&desired).await
    }

    /// HeadObject; a 404 drops the object, other failures surface
    pub async fn read(&self, prior: &State) -> ProviderResult<State> {
        let s3 = self.client(&prior.id)?;
        let (bucket, key) = location(prior)?;

        let head = match s3.head_object().bucket(&bucket).key(&key).send().await {
            Ok(head) => head,
            Err(e) if is_not_found(&e) => {
                warn!(resource = %prior.id, bucket = %bucket, key = %key, "Object no longer exists");
                return Ok(State::not_found(prior.id.clone()));
            }
            Err(e) => return Err(s3_error(&prior.id, "read object", e)),
        };

        let mut attrs = prior.attributes.clone();
        attrs.insert("bucket".to_string(), Value::String(bucket.clone()));
        attrs.insert("key".to_string(), Value::String(key.clone()));
        attrs.insert("id".to_string(), Value::String(object_id(&bucket, &key)));
        if let Some(etag) = head.e_tag() {
            attrs.insert("etag".to_string(), Value::String(etag.to_string()));
        }
        if let Some(content_type) = head.content_type() {
            attrs.insert(
                "content_type".to_string(),
                Value::String(content_type.to_string()),
            );
        }
        match head.metadata() {
            Some(metadata) if !metadata.is_empty() => {
                attrs.insert(
                    "metadata".to_string(),
                    Value::string_map(metadata.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
                );
            }
            _ => {
                attrs.remove("metadata");
            }
        }
        Ok(State::existing(prior.id.clone(), attrs).with_identifier(object_id(&bucket, &key)))
    }

    pub async fn delete(&self, id: &ResourceId, prior: &State) -> ProviderResult<()> {
        let s3 = self.client(id)?;
        let (bucket, key) = location(prior)?;
        debug!(resource = %id, bucket = %bucket, key = %key, "Deleting object");
        s3.delete_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| s3_error(id, "delete object", e))?;
        Ok(())
    }

    /// Import from `bucket/key`; keys may themselves contain `/`
    pub async fn import(&self, id: &ResourceId, import_id: &str) -> ProviderResult<State> {
        let (bucket, key) = split_import_id(id, import_id, IMPORT_FORMAT)?;
        let prior = State::existing(id.clone(), HashMap::new())
            .with_attribute("bucket", Value::String(bucket.to_string()))
            .with_attribute("key", Value::String(key.to_string()))
            .with_identifier(import_id);

        let state = self.read(&prior).await?;
        if !state.exists {
            return Err(
                ProviderError::new(format!("Cannot import object {}: not found", import_id))
                    .for_resource(id.clone()),
            );
        }
        Ok(state)
    }
}

/// Handler for the `garage_object` data source
pub struct ObjectDataSource {
    s3: Option<S3Client>,
}

impl ObjectDataSource {
    pub fn new(s3: Option<S3Client>) -> Self {
        Self { s3 }
    }

    pub async fn read(&self, resource: &Resource) -> ProviderResult<State> {
        let query = validated(&object_data_source_schema(), resource)?;
        let s3 = self.s3.as_ref().ok_or_else(|| missing_s3(&resource.id))?;
        let (bucket, key) = match (query.get_string("bucket"), query.get_string("key")) {
            (Some(bucket), Some(key)) => (bucket, key),
            _ => {
                return Err(ProviderError::new("'bucket' and 'key' are required")
                    .for_resource(resource.id.clone()));
            }
        };
        debug!(resource = %resource.id, bucket, key, "Downloading object");

        let output = s3
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error(&resource.id, "download object", e))?;

        let mut attrs = query.attributes.clone();
        attrs.insert("id".to_string(), Value::String(object_id(bucket, key)));
        attrs.insert(
            "content_type".to_string(),
            Value::String(output.content_type().unwrap_or(FILE_CONTENT_TYPE).to_string()),
        );
        if let Some(etag) = output.e_tag() {
            attrs.insert("etag".to_string(), Value::String(etag.to_string()));
        }
        if let Some(last_modified) = output
            .last_modified()
            .and_then(|t| t.fmt(DateTimeFormat::DateTime).ok())
        {
            attrs.insert("last_modified".to_string(), Value::String(last_modified));
        }
        if let Some(version_id) = output.version_id() {
            attrs.insert("version_id".to_string(), Value::String(version_id.to_string()));
        }
        if let Some(metadata) = output.metadata().filter(|m| !m.is_empty()) {
            attrs.insert(
                "metadata".to_string(),
                Value::string_map(metadata.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            );
        }
        let content_length = output.content_length();

        let body = output.body.collect().await.map_err(|e| {
            ProviderError::new("Unable to read object body")
                .for_resource(resource.id.clone())
                .with_cause(e)
        })?;
        let body = body.into_bytes();
        attrs.insert(
            "content_length".to_string(),
            Value::Int(content_length.unwrap_or(body.len() as i64)),
        );
        attrs.insert(
            "body".to_string(),
            Value::String(String::from_utf8_lossy(&body).into_owned()),
        );

        Ok(State::existing(resource.id.clone(), attrs).with_identifier(object_id(bucket, key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::config::S3Credentials;
    use crate::connect_s3;

    fn object(name: &str) -> Resource {
        Resource::new("garage_object", name)
            .with_attribute("bucket", Value::String("site".to_string()))
            .with_attribute("key", Value::String("docs/index.html".to_string()))
    }

    fn text(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[tokio::test]
    async fn content_defaults_to_text_plain() {
        let upload = Upload::from_resource(&object("page").with_attribute("content", text("hello")))
            .await
            .unwrap();
        assert_eq!(upload.body, b"hello");
        assert_eq!(upload.content_type, "text/plain");
        assert!(upload.metadata.is_empty());
    }

    #[tokio::test]
    async fn source_file_defaults_to_octet_stream() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x00\x01binary").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let upload = Upload::from_resource(
            &object("blob")
                .with_attribute("source", text(&path))
                .with_attribute("metadata", Value::string_map([("origin", "ci")])),
        )
        .await
        .unwrap();
        assert_eq!(upload.body, b"\x00\x01binary");
        assert_eq!(upload.content_type, "application/octet-stream");
        assert_eq!(upload.metadata.get("origin").map(String::as_str), Some("ci"));
    }

    #[tokio::test]
    async fn explicit_content_type_wins() {
        let upload = Upload::from_resource(
            &object("page")
                .with_attribute("content", text("<h1>hi</h1>"))
                .with_attribute("content_type", text("text/html")),
        )
        .await
        .unwrap();
        assert_eq!(upload.content_type, "text/html");
    }

    #[tokio::test]
    async fn missing_source_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        let path = path.to_string_lossy().into_owned();

        let err = Upload::from_resource(&object("blob").with_attribute("source", text(&path)))
            .await
            .unwrap_err();
        assert!(err.message.contains(&path));
        assert!(err.cause.is_some());
    }

    #[tokio::test]
    async fn validation_runs_before_s3_check() {
        let handler = ObjectResource::new(None);
        let err = handler.create(&object("page")).await.unwrap_err();
        assert!(err.message.starts_with("Invalid configuration"));

        let err = handler
            .create(&object("page").with_attribute("content", text("x")))
            .await
            .unwrap_err();
        assert!(err.message.contains("endpoints.s3"));
    }

    #[tokio::test]
    async fn bad_import_id_is_rejected() {
        let handler = ObjectResource::new(None);
        let err = handler
            .import(&ResourceId::new("garage_object", "x"), "just-a-bucket")
            .await
            .unwrap_err();
        assert!(err.message.contains("bucket/key"));
    }

    mod fake_s3 {
        use std::collections::HashMap;
        use std::net::SocketAddr;
        use std::sync::{Arc, Mutex};

        use axum::Router;
        use axum::body::Bytes;
        use axum::extract::{Path, State};
        use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
        use axum::response::{IntoResponse, Response};
        use axum::routing::get;
        use tokio::net::TcpListener;

        #[derive(Clone)]
        struct Stored {
            body: Bytes,
            content_type: String,
            metadata: Vec<(String, String)>,
        }

        type Objects = Arc<Mutex<HashMap<(String, String), Stored>>>;

        fn etag(body: &[u8]) -> String {
            let sum = body
                .iter()
                .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ u64::from(*b)).wrapping_mul(0x100_0000_01b3));
            format!("\"{:016x}\"", sum)
        }

        async fn store(
            State(objects): State<Objects>,
            Path((bucket, key)): Path<(String, String)>,
            headers: HeaderMap,
            body: Bytes,
        ) -> Response {
            let content_type = headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("binary/octet-stream")
                .to_string();
            let metadata = headers
                .iter()
                .filter_map(|(name, value)| {
                    let name = name.as_str().strip_prefix("x-amz-meta-")?;
                    Some((name.to_string(), value.to_str().ok()?.to_string()))
                })
                .collect();
            let tag = etag(&body);
            objects.lock().unwrap().insert(
                (bucket, key),
                Stored {
                    body,
                    content_type,
                    metadata,
                },
            );
            (StatusCode::OK, [(header::ETAG, tag)]).into_response()
        }

        async fn fetch(
            State(objects): State<Objects>,
            Path((bucket, key)): Path<(String, String)>,
        ) -> Response {
            let Some(stored) = objects.lock().unwrap().get(&(bucket, key)).cloned() else {
                return (
                    StatusCode::NOT_FOUND,
                    [(header::CONTENT_TYPE, "application/xml")],
                    "<Error><Code>NoSuchKey</Code><Message>Key not found</Message></Error>",
                )
                    .into_response();
            };

            let mut headers = HeaderMap::new();
            headers.insert(header::ETAG, HeaderValue::from_str(&etag(&stored.body)).unwrap());
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_str(&stored.content_type).unwrap(),
            );
            headers.insert(
                header::LAST_MODIFIED,
                HeaderValue::from_static("Wed, 01 Jan 2025 00:00:00 GMT"),
            );
            for (name, value) in &stored.metadata {
                headers.insert(
                    HeaderName::from_bytes(format!("x-amz-meta-{}", name).as_bytes()).unwrap(),
                    HeaderValue::from_str(value).unwrap(),
                );
            }
            (StatusCode::OK, headers, stored.body).into_response()
        }

        async fn remove(
            State(objects): State<Objects>,
            Path((bucket, key)): Path<(String, String)>,
        ) -> StatusCode {
            objects.lock().unwrap().remove(&(bucket, key));
            StatusCode::NO_CONTENT
        }

        /// Path-style S3 subset: PUT, GET, HEAD and DELETE on objects
        pub async fn start() -> String {
            let objects: Objects = Arc::default();
            let router = Router::new()
                .route("/{bucket}/{*key}", get(fetch).put(store).delete(remove))
                .with_state(objects);
            let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
                .await
                .unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, router).await.unwrap();
            });
            format!("http://{}", addr)
        }
    }

    async fn s3_handlers() -> (ObjectResource, ObjectDataSource) {
        let endpoint = fake_s3::start().await;
        let credentials = S3Credentials {
            access_key: "GKtest".to_string(),
            secret_key: "test-secret".to_string(),
        };
        let client = connect_s3(&endpoint, &credentials).await;
        (
            ObjectResource::new(Some(client.clone())),
            ObjectDataSource::new(Some(client)),
        )
    }

    #[tokio::test]
    async fn object_lifecycle() {
        let (handler, source) = s3_handlers().await;
        let desired = object("page")
            .with_attribute("content", text("<h1>v1</h1>"))
            .with_attribute("metadata", Value::string_map([("owner", "web")]));

        let created = handler.create(&desired).await.unwrap();
        assert_eq!(created.identifier.as_deref(), Some("site/docs/index.html"));
        assert_eq!(created.get_string("content_type"), Some("text/plain"));
        let first_etag = created.get_string("etag").unwrap().to_string();

        let read = handler.read(&created).await.unwrap();
        assert!(read.exists);
        assert_eq!(read.get_string("etag"), Some(first_etag.as_str()));
        assert_eq!(
            read.get_string_map("metadata").unwrap().get("owner").map(String::as_str),
            Some("web")
        );

        let desired = desired.with_attribute("content", text("<h1>v2</h1>"));
        let updated = handler.update(&read, &desired).await.unwrap();
        assert_ne!(updated.get_string("etag"), Some(first_etag.as_str()));

        let downloaded = source
            .read(
                &Resource::new("garage_object", "page")
                    .with_attribute("bucket", text("site"))
                    .with_attribute("key", text("docs/index.html"))
                    .with_read_only(true),
            )
            .await
            .unwrap();
        assert_eq!(downloaded.get_string("body"), Some("<h1>v2</h1>"));
        assert_eq!(downloaded.get_int("content_length"), Some(11));
        assert_eq!(downloaded.get_string("content_type"), Some("text/plain"));
        assert_eq!(
            downloaded.get_string("last_modified"),
            Some("2025-01-01T00:00:00Z")
        );

        handler.delete(&updated.id, &updated).await.unwrap();
        assert!(!handler.read(&updated).await.unwrap().exists);
    }

    #[tokio::test]
    async fn import_existing_object() {
        let (handler, _) = s3_handlers().await;
        handler
            .create(&object("page").with_attribute("content", text("hi")))
            .await
            .unwrap();

        let id = ResourceId::new("garage_object", "imported");
        let state = handler.import(&id, "site/docs/index.html").await.unwrap();
        assert_eq!(state.get_string("bucket"), Some("site"));
        assert_eq!(state.get_string("key"), Some("docs/index.html"));
        assert!(state.get_string("etag").is_some());

        let err = handler.import(&id, "site/missing.txt").await.unwrap_err();
        assert!(err.message.contains("not found"));
    }
}
