//! In-process fake of the Garage admin API for tests.
//!
//! Serves the v2 endpoints used by [`AdminClient`] from an in-memory cluster
//! on a random local port. IDs are deterministic and the fake enforces the
//! same refusals as a real cluster: taken aliases, duplicate key imports,
//! deleting a non-empty bucket and removing a bucket's last alias.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::AdminClient;
use crate::types::{
    BucketInfo, BucketKeyInfo, BucketKeyPermRequest, BucketPermissions, BucketQuotas,
    BucketSummary, KeyBucketInfo, KeyInfo, KeyPermissions, KeySummary, WebsiteConfig,
};

const CREATED_AT: &str = "2025-01-01T00:00:00Z";

/// Running fake admin API. The server stops when this is dropped.
pub struct FakeGarage {
    addr: SocketAddr,
    prefix: String,
    client: AdminClient,
    state: Shared,
    handle: JoinHandle<()>,
}

type Shared = Arc<Mutex<Cluster>>;

impl FakeGarage {
    /// Start a fake that requires `token` as bearer token
    pub async fn start(token: &str) -> io::Result<Self> {
        Self::start_with_prefix(token, "").await
    }

    /// Start a fake serving the API below `prefix` (e.g. `/admin`)
    pub async fn start_with_prefix(token: &str, prefix: &str) -> io::Result<Self> {
        let prefix = prefix.trim_end_matches('/').to_string();
        let state: Shared = Arc::new(Mutex::new(Cluster {
            token: token.to_string(),
            prefix: prefix.clone(),
            ..Cluster::default()
        }));

        let router = Router::new().fallback(dispatch).with_state(state.clone());
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                tracing::warn!("Fake admin API stopped: {}", err);
            }
        });

        let endpoint = format!("http://{}{}", addr, prefix);
        let token = (!token.is_empty()).then(|| token.to_string());
        let client = AdminClient::new(&endpoint, token).map_err(io::Error::other)?;

        Ok(Self {
            addr,
            prefix,
            client,
            state,
            handle,
        })
    }

    /// Base endpoint, including the path prefix
    pub fn endpoint(&self) -> String {
        format!("http://{}{}", self.addr, self.prefix)
    }

    /// Client configured with the right endpoint and token
    pub fn client(&self) -> AdminClient {
        self.client.clone()
    }

    /// Number of requests received so far, including rejected ones
    pub fn request_count(&self) -> usize {
        self.lock().requests
    }

    /// Pretend the bucket holds `objects` objects totalling `bytes` bytes
    pub fn set_bucket_usage(&self, id: &str, objects: i64, bytes: i64) {
        if let Some(bucket) = self.lock().buckets.get_mut(id) {
            bucket.objects = objects;
            bucket.bytes = bytes;
        }
    }

    /// Current server-side view of a bucket
    pub fn bucket(&self, id: &str) -> Option<BucketInfo> {
        self.lock().bucket_info(id).ok()
    }

    /// Current server-side view of a key, secret included
    pub fn key(&self, id: &str) -> Option<KeyInfo> {
        self.lock().key_info(id, true).ok()
    }

    fn lock(&self) -> MutexGuard<'_, Cluster> {
        lock(&self.state)
    }
}

impl Drop for FakeGarage {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn lock(state: &Shared) -> MutexGuard<'_, Cluster> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Cluster {
    token: String,
    prefix: String,
    next_id: u64,
    requests: usize,
    buckets: BTreeMap<String, FakeBucket>,
    keys: BTreeMap<String, FakeKey>,
}

#[derive(Default)]
struct FakeBucket {
    global_aliases: Vec<String>,
    website: Option<WebsiteConfig>,
    quotas: BucketQuotas,
    objects: i64,
    bytes: i64,
    permissions: BTreeMap<String, BucketPermissions>,
}

struct FakeKey {
    name: String,
    secret: String,
}

struct Failure {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl Failure {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidRequest", message)
    }

    fn no_such_bucket(id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NoSuchBucket",
            format!("Bucket not found: {}", id),
        )
    }

    fn no_such_key(id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NoSuchAccessKey",
            format!("Access key not found: {}", id),
        )
    }
}

type Outcome = Result<Option<Value>, Failure>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBucketBody {
    global_alias: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateBucketBody {
    website_access: Option<WebsiteAccessBody>,
    quotas: Option<BucketQuotas>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebsiteAccessBody {
    enabled: bool,
    index_document: Option<String>,
    error_document: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AliasBody {
    bucket_id: String,
    global_alias: String,
}

#[derive(Deserialize)]
struct NameBody {
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportKeyBody {
    access_key_id: String,
    secret_access_key: String,
    name: Option<String>,
}

async fn dispatch(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let mut cluster = lock(&state);
    cluster.requests += 1;

    if !cluster.authorized(&headers) {
        return failure_response(
            Failure::new(
                StatusCode::FORBIDDEN,
                "AccessDenied",
                "Forbidden: Invalid authorization token",
            ),
            &path,
        );
    }

    let prefix = cluster.prefix.clone();
    let Some(operation) = path
        .strip_prefix(prefix.as_str())
        .and_then(|rest| rest.strip_prefix("/v2/"))
    else {
        return failure_response(
            Failure::bad_request(format!("Unknown admin endpoint: {}", path)),
            &path,
        );
    };

    let query: HashMap<String, String> = uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let outcome = match (&method, operation) {
        (&Method::GET, "ListBuckets") => cluster.list_buckets(),
        (&Method::GET, "GetBucketInfo") => cluster.get_bucket_info(&query),
        (&Method::POST, "CreateBucket") => parse(&body).and_then(|b| cluster.create_bucket(b)),
        (&Method::POST, "UpdateBucket") => {
            param(&query, "id").and_then(|id| parse(&body).and_then(|b| cluster.update_bucket(id, b)))
        }
        (&Method::POST, "DeleteBucket") => param(&query, "id").and_then(|id| cluster.delete_bucket(id)),
        (&Method::POST, "AddBucketAlias") => parse(&body).and_then(|b| cluster.add_alias(b)),
        (&Method::POST, "RemoveBucketAlias") => parse(&body).and_then(|b| cluster.remove_alias(b)),
        (&Method::GET, "ListKeys") => cluster.list_keys(),
        (&Method::POST, "CreateKey") => parse(&body).and_then(|b| cluster.create_key(b)),
        (&Method::POST, "ImportKey") => parse(&body).and_then(|b| cluster.import_key(b)),
        (&Method::GET, "GetKeyInfo") => param(&query, "id").and_then(|id| {
            let show_secret = query.get("showSecretKey").is_some_and(|v| v == "true");
            cluster.key_info(id, show_secret).and_then(to_json)
        }),
        (&Method::POST, "UpdateKey") => {
            param(&query, "id").and_then(|id| parse(&body).and_then(|b| cluster.update_key(id, b)))
        }
        (&Method::POST, "DeleteKey") => param(&query, "id").and_then(|id| cluster.delete_key(id)),
        (&Method::POST, "AllowBucketKey") => parse(&body).and_then(|b| cluster.allow(b)),
        (&Method::POST, "DenyBucketKey") => parse(&body).and_then(|b| cluster.deny(b)),
        _ => Err(Failure::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "InvalidRequest",
            format!("{} {} is not an admin endpoint", method, operation),
        )),
    };

    match outcome {
        Ok(Some(value)) => (StatusCode::OK, Json(value)).into_response(),
        Ok(None) => StatusCode::OK.into_response(),
        Err(failure) => failure_response(failure, &path),
    }
}

fn failure_response(failure: Failure, path: &str) -> Response {
    let body = json!({
        "code": failure.code,
        "message": failure.message,
        "region": "garage",
        "path": path,
    });
    (failure.status, Json(body)).into_response()
}

fn parse<T: DeserializeOwned>(body: &Bytes) -> Result<T, Failure> {
    serde_json::from_slice(body)
        .map_err(|err| Failure::bad_request(format!("Invalid request body: {}", err)))
}

fn param<'q>(query: &'q HashMap<String, String>, name: &str) -> Result<&'q str, Failure> {
    query
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Failure::bad_request(format!("Missing query parameter '{}'", name)))
}

fn to_json<T: Serialize>(value: T) -> Outcome {
    serde_json::to_value(value)
        .map(Some)
        .map_err(|err| Failure::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", err.to_string()))
}

impl Cluster {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        if self.token.is_empty() {
            return true;
        }
        let expected = format!("Bearer {}", self.token);
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected)
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn alias_owner(&self, alias: &str) -> Option<&str> {
        self.buckets
            .iter()
            .find(|(_, b)| b.global_aliases.iter().any(|a| a == alias))
            .map(|(id, _)| id.as_str())
    }

    fn bucket_mut(&mut self, id: &str) -> Result<&mut FakeBucket, Failure> {
        self.buckets
            .get_mut(id)
            .ok_or_else(|| Failure::no_such_bucket(id))
    }

    fn bucket_info(&self, id: &str) -> Result<BucketInfo, Failure> {
        let bucket = self
            .buckets
            .get(id)
            .ok_or_else(|| Failure::no_such_bucket(id))?;
        let keys = bucket
            .permissions
            .iter()
            .map(|(key_id, permissions)| BucketKeyInfo {
                access_key_id: key_id.clone(),
                name: self
                    .keys
                    .get(key_id)
                    .map(|k| k.name.clone())
                    .unwrap_or_default(),
                permissions: *permissions,
                bucket_local_aliases: Vec::new(),
            })
            .collect();

        Ok(BucketInfo {
            id: id.to_string(),
            created: Some(CREATED_AT.to_string()),
            global_aliases: bucket.global_aliases.clone(),
            website_access: bucket.website.is_some(),
            website_config: bucket.website.clone(),
            keys,
            objects: bucket.objects,
            bytes: bucket.bytes,
            unfinished_uploads: 0,
            unfinished_multipart_uploads: 0,
            quotas: Some(bucket.quotas.clone()),
        })
    }

    fn key_info(&self, id: &str, show_secret: bool) -> Result<KeyInfo, Failure> {
        let key = self.keys.get(id).ok_or_else(|| Failure::no_such_key(id))?;
        let buckets = self
            .buckets
            .iter()
            .filter_map(|(bucket_id, bucket)| {
                bucket.permissions.get(id).map(|permissions| KeyBucketInfo {
                    id: bucket_id.clone(),
                    global_aliases: bucket.global_aliases.clone(),
                    local_aliases: Vec::new(),
                    permissions: *permissions,
                })
            })
            .collect();

        Ok(KeyInfo {
            access_key_id: id.to_string(),
            name: key.name.clone(),
            secret_access_key: show_secret.then(|| key.secret.clone()),
            created: Some(CREATED_AT.to_string()),
            expiration: None,
            expired: false,
            permissions: KeyPermissions::default(),
            buckets,
        })
    }

    fn list_buckets(&self) -> Outcome {
        let summaries: Vec<BucketSummary> = self
            .buckets
            .iter()
            .map(|(id, bucket)| BucketSummary {
                id: id.clone(),
                created: Some(CREATED_AT.to_string()),
                global_aliases: bucket.global_aliases.clone(),
                local_aliases: Vec::new(),
            })
            .collect();
        to_json(summaries)
    }

    fn get_bucket_info(&self, query: &HashMap<String, String>) -> Outcome {
        let id = match (query.get("id"), query.get("globalAlias")) {
            (Some(id), None) => id.clone(),
            (None, Some(alias)) => self
                .alias_owner(alias)
                .map(str::to_string)
                .ok_or_else(|| Failure::no_such_bucket(alias))?,
            _ => {
                return Err(Failure::bad_request(
                    "Exactly one of 'id' or 'globalAlias' is required",
                ));
            }
        };
        self.bucket_info(&id).and_then(to_json)
    }

    fn create_bucket(&mut self, body: CreateBucketBody) -> Outcome {
        if let Some(alias) = &body.global_alias
            && self.alias_owner(alias).is_some()
        {
            return Err(Failure::new(
                StatusCode::CONFLICT,
                "BucketAlreadyExists",
                format!("Bucket alias already in use: {}", alias),
            ));
        }

        let id = format!("{:064x}", self.next_id());
        self.buckets.insert(
            id.clone(),
            FakeBucket {
                global_aliases: body.global_alias.into_iter().collect(),
                ..FakeBucket::default()
            },
        );
        self.bucket_info(&id).and_then(to_json)
    }

    fn update_bucket(&mut self, id: &str, body: UpdateBucketBody) -> Outcome {
        let bucket = self.bucket_mut(id)?;
        if let Some(website) = body.website_access {
            bucket.website = if website.enabled {
                if website.index_document.is_none() {
                    return Err(Failure::bad_request(
                        "indexDocument is required when website access is enabled",
                    ));
                }
                Some(WebsiteConfig {
                    index_document: website.index_document,
                    error_document: website.error_document,
                })
            } else {
                None
            };
        }
        if let Some(quotas) = body.quotas {
            bucket.quotas = quotas;
        }
        self.bucket_info(id).and_then(to_json)
    }

    fn delete_bucket(&mut self, id: &str) -> Outcome {
        let bucket = self.bucket_mut(id)?;
        if bucket.objects > 0 {
            return Err(Failure::new(
                StatusCode::CONFLICT,
                "BucketNotEmpty",
                "Bucket is not empty",
            ));
        }
        self.buckets.remove(id);
        Ok(None)
    }

    fn add_alias(&mut self, body: AliasBody) -> Outcome {
        if let Some(owner) = self.alias_owner(&body.global_alias)
            && owner != body.bucket_id
        {
            return Err(Failure::new(
                StatusCode::CONFLICT,
                "BucketAlreadyExists",
                format!("Bucket alias already in use: {}", body.global_alias),
            ));
        }
        let bucket = self.bucket_mut(&body.bucket_id)?;
        if !bucket.global_aliases.contains(&body.global_alias) {
            bucket.global_aliases.push(body.global_alias);
        }
        self.bucket_info(&body.bucket_id).and_then(to_json)
    }

    fn remove_alias(&mut self, body: AliasBody) -> Outcome {
        let bucket = self.bucket_mut(&body.bucket_id)?;
        if !bucket.global_aliases.contains(&body.global_alias) {
            return Err(Failure::bad_request(format!(
                "Alias {} does not point to bucket {}",
                body.global_alias, body.bucket_id
            )));
        }
        if bucket.global_aliases.len() == 1 {
            return Err(Failure::bad_request(
                "Bucket has no other aliases, delete it instead of removing its last alias",
            ));
        }
        bucket.global_aliases.retain(|a| *a != body.global_alias);
        self.bucket_info(&body.bucket_id).and_then(to_json)
    }

    fn list_keys(&self) -> Outcome {
        let summaries: Vec<KeySummary> = self
            .keys
            .iter()
            .map(|(id, key)| KeySummary {
                id: id.clone(),
                name: key.name.clone(),
                created: Some(CREATED_AT.to_string()),
                expiration: None,
                expired: false,
            })
            .collect();
        to_json(summaries)
    }

    fn create_key(&mut self, body: NameBody) -> Outcome {
        let n = self.next_id();
        let id = format!("GK{:024x}", n);
        self.keys.insert(
            id.clone(),
            FakeKey {
                name: body.name.unwrap_or_default(),
                secret: format!("{:064x}", n.wrapping_mul(0x9e37_79b9_7f4a_7c15)),
            },
        );
        self.key_info(&id, true).and_then(to_json)
    }

    fn import_key(&mut self, body: ImportKeyBody) -> Outcome {
        if self.keys.contains_key(&body.access_key_id) {
            return Err(Failure::new(
                StatusCode::CONFLICT,
                "KeyAlreadyExists",
                format!("Key {} already exists", body.access_key_id),
            ));
        }
        self.keys.insert(
            body.access_key_id.clone(),
            FakeKey {
                name: body.name.unwrap_or_default(),
                secret: body.secret_access_key,
            },
        );
        self.key_info(&body.access_key_id, false).and_then(to_json)
    }

    fn update_key(&mut self, id: &str, body: NameBody) -> Outcome {
        let key = self
            .keys
            .get_mut(id)
            .ok_or_else(|| Failure::no_such_key(id))?;
        if let Some(name) = body.name {
            key.name = name;
        }
        self.key_info(id, false).and_then(to_json)
    }

    fn delete_key(&mut self, id: &str) -> Outcome {
        if self.keys.remove(id).is_none() {
            return Err(Failure::no_such_key(id));
        }
        for bucket in self.buckets.values_mut() {
            bucket.permissions.remove(id);
        }
        Ok(None)
    }

    fn allow(&mut self, body: BucketKeyPermRequest) -> Outcome {
        self.change_permissions(body, |current, flags| {
            BucketPermissions::new(
                current.read || flags.read,
                current.write || flags.write,
                current.owner || flags.owner,
            )
        })
    }

    fn deny(&mut self, body: BucketKeyPermRequest) -> Outcome {
        self.change_permissions(body, |current, flags| {
            BucketPermissions::new(
                current.read && !flags.read,
                current.write && !flags.write,
                current.owner && !flags.owner,
            )
        })
    }

    fn change_permissions(
        &mut self,
        body: BucketKeyPermRequest,
        apply: impl Fn(BucketPermissions, BucketPermissions) -> BucketPermissions,
    ) -> Outcome {
        if !self.keys.contains_key(&body.access_key_id) {
            return Err(Failure::no_such_key(&body.access_key_id));
        }
        let bucket = self.bucket_mut(&body.bucket_id)?;
        let current = bucket
            .permissions
            .get(&body.access_key_id)
            .copied()
            .unwrap_or_default();
        let next = apply(current, body.permissions);
        if next.is_empty() {
            bucket.permissions.remove(&body.access_key_id);
        } else {
            bucket.permissions.insert(body.access_key_id, next);
        }
        self.bucket_info(&body.bucket_id).and_then(to_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CreateBucketRequest;

    #[tokio::test]
    async fn last_alias_cannot_be_removed() {
        let garage = FakeGarage::start("t").await.unwrap();
        let client = garage.client();
        let bucket = client
            .create_bucket(&CreateBucketRequest {
                global_alias: Some("only".to_string()),
            })
            .await
            .unwrap();

        let err = client
            .remove_bucket_alias(&bucket.id, "only")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(reqwest::StatusCode::BAD_REQUEST));
        assert_eq!(garage.bucket(&bucket.id).unwrap().global_aliases, vec!["only"]);
    }

    #[tokio::test]
    async fn serves_below_prefix_and_counts_requests() {
        let garage = FakeGarage::start_with_prefix("t", "/admin/").await.unwrap();
        assert!(garage.endpoint().ends_with("/admin"));

        let client = garage.client();
        assert_eq!(client.base_url().path(), "/admin/");
        assert!(client.list_buckets().await.unwrap().is_empty());
        assert!(client.list_keys().await.unwrap().is_empty());
        assert_eq!(garage.request_count(), 2);
    }

    #[tokio::test]
    async fn deleting_key_revokes_its_grants() {
        let garage = FakeGarage::start("t").await.unwrap();
        let client = garage.client();
        let bucket = client
            .create_bucket(&CreateBucketRequest::default())
            .await
            .unwrap();
        let key = client.create_key(&Default::default()).await.unwrap();
        client
            .set_bucket_permission(&BucketKeyPermRequest {
                bucket_id: bucket.id.clone(),
                access_key_id: key.access_key_id.clone(),
                permissions: BucketPermissions::new(true, false, false),
            })
            .await
            .unwrap();
        assert_eq!(garage.key(&key.access_key_id).unwrap().buckets.len(), 1);

        client.delete_key(&key.access_key_id).await.unwrap();
        assert!(garage.bucket(&bucket.id).unwrap().keys.is_empty());
    }
}
