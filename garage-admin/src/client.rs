//! HTTP client for the Garage admin API v2.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{AdminError, AdminResult};
use crate::types::{
    ApiErrorBody, BucketAliasRequest, BucketInfo, BucketKeyPermRequest, BucketLookup,
    BucketSummary, CreateBucketRequest, CreateKeyRequest, ImportKeyRequest, KeyInfo, KeySummary,
    UpdateBucketRequest, UpdateKeyRequest,
};

/// Request timeout used by [`AdminClient::new`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const LIST_BUCKETS_PATH: &str = "v2/ListBuckets";
const GET_BUCKET_INFO_PATH: &str = "v2/GetBucketInfo";
const CREATE_BUCKET_PATH: &str = "v2/CreateBucket";
const UPDATE_BUCKET_PATH: &str = "v2/UpdateBucket";
const DELETE_BUCKET_PATH: &str = "v2/DeleteBucket";
const ADD_BUCKET_ALIAS_PATH: &str = "v2/AddBucketAlias";
const REMOVE_BUCKET_ALIAS_PATH: &str = "v2/RemoveBucketAlias";
const LIST_KEYS_PATH: &str = "v2/ListKeys";
const CREATE_KEY_PATH: &str = "v2/CreateKey";
const IMPORT_KEY_PATH: &str = "v2/ImportKey";
const GET_KEY_INFO_PATH: &str = "v2/GetKeyInfo";
const UPDATE_KEY_PATH: &str = "v2/UpdateKey";
const DELETE_KEY_PATH: &str = "v2/DeleteKey";
const ALLOW_BUCKET_KEY_PATH: &str = "v2/AllowBucketKey";
const DENY_BUCKET_KEY_PATH: &str = "v2/DenyBucketKey";

/// Client for the Garage admin API.
///
/// Holds only the base endpoint, the bearer token and a pooled HTTP client.
/// Every call is a single attempt; there is no retry or caching. Cloning is
/// cheap and clones share the connection pool.
#[derive(Clone)]
pub struct AdminClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl std::fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AdminClient {
    /// Build a client for `endpoint` (e.g. `http://localhost:3903`).
    pub fn new(endpoint: &str, token: Option<String>) -> AdminResult<Self> {
        Self::with_timeout(endpoint, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> AdminResult<Self> {
        let base_url = normalize_endpoint(endpoint)?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AdminError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: format!("cannot build HTTP client: {err}"),
            })?;
        Ok(Self {
            http,
            base_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Normalized base URL, always ending in `/`
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ========== Buckets ==========

    pub async fn list_buckets(&self) -> AdminResult<Vec<BucketSummary>> {
        self.get(LIST_BUCKETS_PATH, &[]).await
    }

    /// Fetch a bucket by ID or global alias; `None` when it does not exist.
    pub async fn get_bucket_info(&self, lookup: &BucketLookup) -> AdminResult<Option<BucketInfo>> {
        let (param, value) = lookup.query();
        not_found_as_none(self.get(GET_BUCKET_INFO_PATH, &[(param, value)]).await)
    }

    pub async fn create_bucket(&self, request: &CreateBucketRequest) -> AdminResult<BucketInfo> {
        debug!(global_alias = ?request.global_alias, "Creating bucket");
        self.post(CREATE_BUCKET_PATH, &[], request).await
    }

    /// Apply the present parts of `request`; absent parts stay untouched.
    pub async fn update_bucket(
        &self,
        id: &str,
        request: &UpdateBucketRequest,
    ) -> AdminResult<BucketInfo> {
        debug!(
            id,
            website = request.website_access.is_some(),
            quotas = request.quotas.is_some(),
            "Updating bucket"
        );
        self.post(UPDATE_BUCKET_PATH, &[("id", id)], request).await
    }

    /// Delete an empty bucket; a non-empty bucket is refused by the API.
    pub async fn delete_bucket(&self, id: &str) -> AdminResult<()> {
        debug!(id, "Deleting bucket");
        self.post_empty(DELETE_BUCKET_PATH, &[("id", id)]).await
    }

    pub async fn add_bucket_alias(&self, id: &str, global_alias: &str) -> AdminResult<BucketInfo> {
        debug!(id, global_alias, "Adding bucket alias");
        let body = BucketAliasRequest {
            bucket_id: id,
            global_alias,
        };
        self.post(ADD_BUCKET_ALIAS_PATH, &[], &body).await
    }

    pub async fn remove_bucket_alias(
        &self,
        id: &str,
        global_alias: &str,
    ) -> AdminResult<BucketInfo> {
        debug!(id, global_alias, "Removing bucket alias");
        let body = BucketAliasRequest {
            bucket_id: id,
            global_alias,
        };
        self.post(REMOVE_BUCKET_ALIAS_PATH, &[], &body).await
    }

    // ========== Access keys ==========

    pub async fn list_keys(&self) -> AdminResult<Vec<KeySummary>> {
        self.get(LIST_KEYS_PATH, &[]).await
    }

    /// Generate a new key. The returned secret is never retrievable again.
    pub async fn create_key(&self, request: &CreateKeyRequest) -> AdminResult<KeyInfo> {
        debug!(name = ?request.name, "Creating access key");
        self.post(CREATE_KEY_PATH, &[], request).await
    }

    /// Register caller-supplied credentials; fails if the ID already exists.
    pub async fn import_key(&self, request: &ImportKeyRequest) -> AdminResult<KeyInfo> {
        debug!(id = %request.access_key_id, name = ?request.name, "Importing access key");
        self.post(IMPORT_KEY_PATH, &[], request).await
    }

    /// Fetch a key without its secret; `None` when it does not exist.
    pub async fn get_key_info(&self, id: &str) -> AdminResult<Option<KeyInfo>> {
        not_found_as_none(self.get(GET_KEY_INFO_PATH, &[("id", id)]).await)
    }

    pub async fn update_key(&self, id: &str, request: &UpdateKeyRequest) -> AdminResult<KeyInfo> {
        debug!(id, name = ?request.name, "Updating access key");
        self.post(UPDATE_KEY_PATH, &[("id", id)], request).await
    }

    pub async fn delete_key(&self, id: &str) -> AdminResult<()> {
        debug!(id, "Deleting access key");
        self.post_empty(DELETE_KEY_PATH, &[("id", id)]).await
    }

    // ========== Permissions ==========

    /// Grant the flags set in `request.permissions`; other flags are unchanged.
    pub async fn set_bucket_permission(
        &self,
        request: &BucketKeyPermRequest,
    ) -> AdminResult<BucketInfo> {
        debug!(
            bucket_id = %request.bucket_id,
            access_key_id = %request.access_key_id,
            permissions = ?request.permissions,
            "Granting bucket permission"
        );
        self.post(ALLOW_BUCKET_KEY_PATH, &[], request).await
    }

    /// Revoke the flags set in `request.permissions`; other flags are unchanged.
    pub async fn clear_bucket_permission(
        &self,
        request: &BucketKeyPermRequest,
    ) -> AdminResult<BucketInfo> {
        debug!(
            bucket_id = %request.bucket_id,
            access_key_id = %request.access_key_id,
            permissions = ?request.permissions,
            "Revoking bucket permission"
        );
        self.post(DENY_BUCKET_KEY_PATH, &[], request).await
    }

    // ========== Transport ==========

    fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> AdminResult<(Url, RequestBuilder)> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|err| AdminError::InvalidEndpoint {
                endpoint: self.base_url.to_string(),
                reason: err.to_string(),
            })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let mut builder = self.http.request(method, url.clone());
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        Ok((url, builder))
    }

    async fn get<T>(&self, path: &str, query: &[(&str, &str)]) -> AdminResult<T>
    where
        T: DeserializeOwned,
    {
        let (url, builder) = self.request(Method::GET, path, query)?;
        let resp = send(&url, builder).await?;
        decode_json(&url, resp).await
    }

    async fn post<B, T>(&self, path: &str, query: &[(&str, &str)], body: &B) -> AdminResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (url, builder) = self.request(Method::POST, path, query)?;
        let resp = send(&url, builder.json(body)).await?;
        decode_json(&url, resp).await
    }

    /// POST without a body, for operations whose response carries no data
    async fn post_empty(&self, path: &str, query: &[(&str, &str)]) -> AdminResult<()> {
        let (url, builder) = self.request(Method::POST, path, query)?;
        send(&url, builder).await?;
        Ok(())
    }
}

async fn send(url: &Url, builder: RequestBuilder) -> AdminResult<Response> {
    debug!(url = %url, "Admin API request");
    let resp = builder
        .send()
        .await
        .map_err(|err| AdminError::transport(url, err))?;

    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp
        .text()
        .await
        .map_err(|err| AdminError::transport(url, err))?;
    debug!(url = %url, %status, "Admin API request failed");
    Err(api_error(status, &body))
}

async fn decode_json<T>(url: &Url, resp: Response) -> AdminResult<T>
where
    T: DeserializeOwned,
{
    let bytes = resp
        .bytes()
        .await
        .map_err(|err| AdminError::transport(url, err))?;
    serde_json::from_slice(&bytes).map_err(|err| AdminError::decode(url, err.to_string()))
}

fn api_error(status: StatusCode, body: &str) -> AdminError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => AdminError::Api {
            status,
            code: Some(parsed.code),
            message: parsed.message,
        },
        Err(_) => {
            let text = body.trim();
            let message = if text.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("empty response body")
                    .to_string()
            } else {
                text.to_string()
            };
            AdminError::Api {
                status,
                code: None,
                message,
            }
        }
    }
}

fn not_found_as_none<T>(result: AdminResult<T>) -> AdminResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Parse `endpoint` into a base URL whose path ends in `/`, so that joining
/// `v2/...` keeps any path prefix.
pub fn normalize_endpoint(endpoint: &str) -> AdminResult<Url> {
    let invalid = |reason: &str| AdminError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(invalid("endpoint is empty"));
    }

    let mut url = Url::parse(trimmed).map_err(|err| invalid(&err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }

    url.set_query(None);
    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::Router;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{get, post};
    use tokio::net::TcpListener;

    use super::*;
    use crate::testing::FakeGarage;
    use crate::types::{BucketPermissions, BucketQuotas, WebsiteAccess};

    const TOKEN: &str = "test-admin-token";

    async fn serve(router: Router) -> SocketAddr {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    #[test]
    fn normalize_endpoint_appends_slash() {
        let url = normalize_endpoint("http://localhost:3903").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3903/");

        let url = normalize_endpoint("http://localhost:3903/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3903/");

        let url = normalize_endpoint(" https://garage.example.com/admin ").unwrap();
        assert_eq!(url.as_str(), "https://garage.example.com/admin/");
        assert_eq!(
            url.join(LIST_BUCKETS_PATH).unwrap().as_str(),
            "https://garage.example.com/admin/v2/ListBuckets"
        );
    }

    #[test]
    fn normalize_endpoint_rejects_garbage() {
        assert!(matches!(
            normalize_endpoint(""),
            Err(AdminError::InvalidEndpoint { .. })
        ));
        assert!(normalize_endpoint("localhost:3903").is_err());
        assert!(normalize_endpoint("ftp://localhost:3903").is_err());
        assert!(normalize_endpoint("not a url").is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let client = AdminClient::new("http://localhost:3903", Some("s3cr3t".into())).unwrap();
        let printed = format!("{:?}", client);
        assert!(!printed.contains("s3cr3t"));
        assert!(printed.contains("<redacted>"));
    }

    #[tokio::test]
    async fn sends_bearer_token_and_preserves_path_prefix() {
        let router = Router::new().route(
            "/admin/v2/ListBuckets",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth == "Bearer test-admin-token" {
                    (AxumStatus::OK, r#"[{"id":"b1","globalAliases":["a"]}]"#)
                } else {
                    (AxumStatus::FORBIDDEN, "forbidden")
                }
            }),
        );
        let addr = serve(router).await;

        let client = AdminClient::new(&format!("http://{addr}/admin/"), Some(TOKEN.into())).unwrap();
        let buckets = client.list_buckets().await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].global_aliases, vec!["a"]);

        let anonymous = AdminClient::new(&format!("http://{addr}/admin"), None).unwrap();
        let err = anonymous.list_buckets().await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn structured_error_body_is_decoded() {
        let router = Router::new().route(
            "/v2/DeleteBucket",
            post(|| async {
                (
                    AxumStatus::CONFLICT,
                    r#"{"code":"BucketNotEmpty","message":"Bucket is not empty","region":"garage","path":"/v2/DeleteBucket"}"#,
                )
            }),
        );
        let addr = serve(router).await;
        let client = AdminClient::new(&format!("http://{addr}"), None).unwrap();

        match client.delete_bucket("b1").await.unwrap_err() {
            AdminError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, StatusCode::CONFLICT);
                assert_eq!(code.as_deref(), Some("BucketNotEmpty"));
                assert_eq!(message, "Bucket is not empty");
            }
            other => panic!("Expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unstructured_error_body_is_kept_as_message() {
        let router = Router::new()
            .route(
                "/v2/ListKeys",
                get(|| async { (AxumStatus::BAD_GATEWAY, "upstream exploded\n") }),
            )
            .route(
                "/v2/ListBuckets",
                get(|| async { AxumStatus::INTERNAL_SERVER_ERROR }),
            );
        let addr = serve(router).await;
        let client = AdminClient::new(&format!("http://{addr}"), None).unwrap();

        match client.list_keys().await.unwrap_err() {
            AdminError::Api { code, message, .. } => {
                assert_eq!(code, None);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("Expected Api error, got {other:?}"),
        }

        match client.list_buckets().await.unwrap_err() {
            AdminError::Api { message, .. } => assert_eq!(message, "Internal Server Error"),
            other => panic!("Expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unexpected_shape_is_a_decode_error() {
        let router = Router::new().route(
            "/v2/GetKeyInfo",
            get(|| async { (AxumStatus::OK, r#"{"unexpected":true}"#) }),
        );
        let addr = serve(router).await;
        let client = AdminClient::new(&format!("http://{addr}"), None).unwrap();

        let err = client.get_key_info("GK1").await.unwrap_err();
        assert!(matches!(err, AdminError::Decode { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_error() {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = AdminClient::new(&format!("http://{addr}"), None).unwrap();
        let err = client.list_buckets().await.unwrap_err();
        assert!(matches!(err, AdminError::Transport { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn create_then_lookup_by_alias() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let client = garage.client();

        let created = client
            .create_bucket(&CreateBucketRequest {
                global_alias: Some("my-bucket".to_string()),
            })
            .await
            .unwrap();
        assert!(!created.id.is_empty());

        let info = client
            .get_bucket_info(&BucketLookup::GlobalAlias("my-bucket".to_string()))
            .await
            .unwrap()
            .expect("bucket should exist");
        assert_eq!(info.id, created.id);
        assert_eq!(info.global_aliases, vec!["my-bucket"]);
        assert!(!info.website_access);
        assert_eq!(info.objects, 0);
        assert_eq!(info.bytes, 0);

        let again = client
            .get_bucket_info(&BucketLookup::Id(created.id.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.id, created.id);

        let listed = client.list_buckets().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
    }

    #[tokio::test]
    async fn missing_bucket_is_none() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let client = garage.client();

        let info = client
            .get_bucket_info(&BucketLookup::GlobalAlias("nope".to_string()))
            .await
            .unwrap();
        assert!(info.is_none());
        assert!(client.get_key_info("GKmissing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn quota_update_leaves_website_untouched() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let client = garage.client();
        let bucket = client
            .create_bucket(&CreateBucketRequest {
                global_alias: Some("site".to_string()),
            })
            .await
            .unwrap();

        client
            .update_bucket(
                &bucket.id,
                &UpdateBucketRequest {
                    website_access: Some(WebsiteAccess {
                        enabled: true,
                        index_document: Some("index.html".to_string()),
                        error_document: Some("error.html".to_string()),
                    }),
                    quotas: None,
                },
            )
            .await
            .unwrap();

        let updated = client
            .update_bucket(
                &bucket.id,
                &UpdateBucketRequest {
                    website_access: None,
                    quotas: Some(BucketQuotas {
                        max_size: Some(1_073_741_824),
                        max_objects: None,
                    }),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.quotas.unwrap().max_size, Some(1_073_741_824));

        let info = client
            .get_bucket_info(&BucketLookup::Id(bucket.id.clone()))
            .await
            .unwrap()
            .unwrap();
        assert!(info.website_access);
        let website = info.website_config.unwrap();
        assert_eq!(website.index_document.as_deref(), Some("index.html"));
        assert_eq!(website.error_document.as_deref(), Some("error.html"));
    }

    #[tokio::test]
    async fn delete_non_empty_bucket_is_refused() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let client = garage.client();
        let bucket = client
            .create_bucket(&CreateBucketRequest::default())
            .await
            .unwrap();
        garage.set_bucket_usage(&bucket.id, 2, 10);

        let err = client.delete_bucket(&bucket.id).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(
            client
                .get_bucket_info(&BucketLookup::Id(bucket.id.clone()))
                .await
                .unwrap()
                .is_some()
        );

        garage.set_bucket_usage(&bucket.id, 0, 0);
        client.delete_bucket(&bucket.id).await.unwrap();
        assert!(
            client
                .get_bucket_info(&BucketLookup::Id(bucket.id))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn alias_add_and_remove() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let client = garage.client();
        let bucket = client
            .create_bucket(&CreateBucketRequest {
                global_alias: Some("old-name".to_string()),
            })
            .await
            .unwrap();

        let info = client.add_bucket_alias(&bucket.id, "new-name").await.unwrap();
        assert_eq!(info.global_aliases, vec!["old-name", "new-name"]);

        let info = client
            .remove_bucket_alias(&bucket.id, "old-name")
            .await
            .unwrap();
        assert_eq!(info.global_aliases, vec!["new-name"]);

        let other = client
            .create_bucket(&CreateBucketRequest::default())
            .await
            .unwrap();
        let err = client.add_bucket_alias(&other.id, "new-name").await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn created_key_secret_is_shown_once() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let client = garage.client();

        let key = client.create_key(&CreateKeyRequest::default()).await.unwrap();
        assert!(!key.access_key_id.is_empty());
        assert!(key.name.is_empty());
        assert!(key.secret_access_key.as_deref().is_some_and(|s| !s.is_empty()));

        let fetched = client
            .get_key_info(&key.access_key_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.access_key_id, key.access_key_id);
        assert_eq!(fetched.name, key.name);
        assert_eq!(fetched.secret_access_key, None);

        let listed = client.list_keys().await.unwrap();
        assert_eq!(listed[0].id, key.access_key_id);
    }

    #[tokio::test]
    async fn import_key_rejects_existing_id() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let client = garage.client();
        let request = ImportKeyRequest {
            access_key_id: "GK0123456789abcdef01234567".to_string(),
            secret_access_key: "a".repeat(64),
            name: Some("imported".to_string()),
        };

        let key = client.import_key(&request).await.unwrap();
        assert_eq!(key.access_key_id, request.access_key_id);
        assert_eq!(key.name, "imported");

        let err = client.import_key(&request).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn update_and_delete_key() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let client = garage.client();
        let key = client
            .create_key(&CreateKeyRequest {
                name: Some("before".to_string()),
            })
            .await
            .unwrap();

        let renamed = client
            .update_key(
                &key.access_key_id,
                &UpdateKeyRequest {
                    name: Some("after".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "after");

        client.delete_key(&key.access_key_id).await.unwrap();
        assert!(client.get_key_info(&key.access_key_id).await.unwrap().is_none());
        assert!(client.delete_key(&key.access_key_id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn repeated_grant_is_idempotent() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let client = garage.client();
        let bucket = client
            .create_bucket(&CreateBucketRequest::default())
            .await
            .unwrap();
        let key = client.create_key(&CreateKeyRequest::default()).await.unwrap();

        let request = BucketKeyPermRequest {
            bucket_id: bucket.id.clone(),
            access_key_id: key.access_key_id.clone(),
            permissions: BucketPermissions::new(true, true, false),
        };
        let first = client.set_bucket_permission(&request).await.unwrap();
        let second = client.set_bucket_permission(&request).await.unwrap();

        assert_eq!(first.keys, second.keys);
        assert_eq!(second.keys.len(), 1);
        assert_eq!(
            second.key_permissions(&key.access_key_id),
            Some(&BucketPermissions::new(true, true, false))
        );

        let cleared = client
            .clear_bucket_permission(&BucketKeyPermRequest {
                permissions: BucketPermissions::all(),
                ..request
            })
            .await
            .unwrap();
        assert_eq!(cleared.key_permissions(&key.access_key_id), None);
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let garage = FakeGarage::start(TOKEN).await.unwrap();
        let client = AdminClient::new(&garage.endpoint(), Some("wrong".into())).unwrap();
        let err = client.list_buckets().await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
    }
}
