use std::path::Path;

use reqwest::header::CONTENT_TYPE;
use reqwest::{
    Client as HttpClient, ClientBuilder, Method, RequestBuilder, Response, StatusCode, Url,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use riaklite_core::config::Config;
use riaklite_core::models::{
    self, BucketProps, Counter, CounterOp, IndexDefinition, SearchResults, DEFAULT_BUCKET_TYPE,
    SEARCH_INDEX_PROPERTY,
};
use riaklite_core::query::Query;

use crate::files;
use crate::{ClientError, Result};

const OCTET_STREAM: &str = "application/octet-stream";
const XML: &str = "application/xml";

/// Riak HTTP API Client
///
/// Holds only the immutable connection settings; every operation issues
/// its own request(s) and keeps no state between calls.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    endpoint: Url,
    auth: Option<(String, String)>,
    client: HttpClient,
}

impl Client {
    /// Create a client for the given settings.
    ///
    /// Fails on a malformed base URL or an unusable client certificate.
    pub fn new(config: Config) -> Result<Self> {
        let base_url = config.base_url()?;
        let endpoint = config.endpoint()?;
        let client = build_http_client(&config)?;
        let auth = config
            .basic_auth()
            .map(|(user, pass)| (user.to_string(), pass.to_string()));

        tracing::debug!(base_url = %base_url, auth = auth.is_some(), "Riak client created");

        Ok(Self {
            base_url,
            endpoint,
            auth,
            client,
        })
    }

    /// Create a client with default settings for `url`
    pub fn connect(url: impl Into<String>) -> Result<Self> {
        Self::new(Config::new(url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Store `data` as JSON under `bucket/key` in the default bucket type
    pub async fn set<T: Serialize + ?Sized>(&self, bucket: &str, key: &str, data: &T) -> Result<()> {
        self.set_in(DEFAULT_BUCKET_TYPE, bucket, key, data).await
    }

    #[tracing::instrument(skip(self, data))]
    pub async fn set_in<T: Serialize + ?Sized>(
        &self,
        bucket_type: &str,
        bucket: &str,
        key: &str,
        data: &T,
    ) -> Result<()> {
        let body = serde_json::to_vec(data)?;
        let response = self
            .request(Method::PUT, &models::key_route(bucket_type, bucket, key))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        expect_success(response).await?;
        Ok(())
    }

    /// Fetch `bucket/key` from the default bucket type.
    ///
    /// `None` when the key is missing or the body is empty or not JSON.
    pub async fn get(&self, bucket: &str, key: &str) -> Result<Option<serde_json::Value>> {
        self.get_in(DEFAULT_BUCKET_TYPE, bucket, key).await
    }

    pub async fn get_in(
        &self,
        bucket_type: &str,
        bucket: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>> {
        self.get_as(bucket_type, bucket, key).await
    }

    /// Fetch and decode into `T`
    #[tracing::instrument(skip(self))]
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        bucket_type: &str,
        bucket: &str,
        key: &str,
    ) -> Result<Option<T>> {
        let response = self
            .request(Method::GET, &models::key_route(bucket_type, bucket, key))
            .send()
            .await?;

        read_json(response).await
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.delete_in(DEFAULT_BUCKET_TYPE, bucket, key).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_in(&self, bucket_type: &str, bucket: &str, key: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &models::key_route(bucket_type, bucket, key))
            .send()
            .await?;

        expect_success(response).await?;
        Ok(())
    }

    /// Run a search query, returning its `response` object
    pub async fn search(&self, query: &Query) -> Result<Option<SearchResults>> {
        match self.search_raw(query).await? {
            Some(value) => match serde_json::from_value(value) {
                Ok(results) => Ok(Some(results)),
                Err(e) => {
                    tracing::warn!(bucket = %query.bucket(), "Undecodable search response: {}", e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Run a search query, returning the undecoded `response` object
    #[tracing::instrument(skip(self, query), fields(bucket = %query.bucket()))]
    pub async fn search_raw(&self, query: &Query) -> Result<Option<serde_json::Value>> {
        let response = self
            .request(Method::GET, &models::search_route(query.bucket()))
            .query(&query.search_params())
            .send()
            .await?;

        let body: Option<serde_json::Value> = read_json(response).await?;
        Ok(body.and_then(|mut body| body.get_mut("response").map(serde_json::Value::take)))
    }

    /// Current value of a counter, `None` if it does not exist yet
    #[tracing::instrument(skip(self))]
    pub async fn get_counter(&self, bucket: &str, key: &str) -> Result<Option<Counter>> {
        let response = self
            .request(Method::GET, &models::counter_route(bucket, key))
            .send()
            .await?;

        read_json(response).await
    }

    /// Add `amount` to a counter, creating it first when absent.
    ///
    /// Creation and update are two separate requests. Concurrent callers may
    /// both create the counter; creation posts a zero increment so duplicates
    /// are no-ops on the store.
    pub async fn increment(&self, bucket: &str, key: &str, amount: u64) -> Result<()> {
        self.update_counter(bucket, key, CounterOp::Increment(amount))
            .await
    }

    /// Subtract `amount` from a counter, creating it first when absent.
    pub async fn decrement(&self, bucket: &str, key: &str, amount: u64) -> Result<()> {
        self.update_counter(bucket, key, CounterOp::Decrement(amount))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn update_counter(&self, bucket: &str, key: &str, op: CounterOp) -> Result<()> {
        if self.get_counter(bucket, key).await?.is_none() {
            self.create_counter(bucket, key).await?;
        }

        let response = self
            .request(Method::POST, &models::counter_route(bucket, key))
            .json(&op)
            .send()
            .await?;

        expect_success(response).await?;
        Ok(())
    }

    async fn create_counter(&self, bucket: &str, key: &str) -> Result<()> {
        tracing::info!(bucket, key, "Creating counter");

        let result: Result<()> = match self
            .request(Method::POST, &models::counter_route(bucket, key))
            .json(&CounterOp::Increment(0))
            .send()
            .await
        {
            Ok(response) => expect_success(response).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };

        result.map_err(|e| ClientError::CounterCreation {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Upload a local file (at most 2 MiB) as a raw object.
    ///
    /// `key` defaults to the file name. Returns the key used.
    #[tracing::instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn upload_binary(
        &self,
        bucket: &str,
        path: impl AsRef<Path>,
        key: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<String> {
        let upload = files::load_upload(path.as_ref(), key).await?;
        tracing::debug!(
            key = %upload.key,
            size = upload.contents.len(),
            "Uploading {}",
            upload.path.display()
        );

        let response = self
            .request(Method::PUT, &models::binary_route(bucket, &upload.key))
            .header(CONTENT_TYPE, content_type.unwrap_or(OCTET_STREAM))
            .body(upload.contents)
            .send()
            .await?;

        expect_success(response).await?;
        Ok(upload.key)
    }

    /// Stream a raw object into a local file, truncating it first.
    ///
    /// Returns the number of bytes written.
    #[tracing::instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn download_binary(
        &self,
        bucket: &str,
        key: &str,
        path: impl AsRef<Path>,
    ) -> Result<u64> {
        let mut file = files::create_download(path.as_ref()).await?;

        let response = self
            .request(Method::GET, &models::binary_route(bucket, key))
            .send()
            .await?;
        let mut response = expect_success(response).await?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    /// Schema XML, `None` if no schema has that name
    #[tracing::instrument(skip(self))]
    pub async fn fetch_schema(&self, name: &str) -> Result<Option<String>> {
        let response = self
            .request(Method::GET, &models::schema_route(name))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let text = expect_success(response).await?.text().await?;
        Ok(if text.is_empty() { None } else { Some(text) })
    }

    /// Upload a schema definition from a local XML file (at most 2 MiB)
    #[tracing::instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn create_schema(&self, name: &str, path: impl AsRef<Path>) -> Result<()> {
        let schema = files::load_upload(path.as_ref(), None).await?;

        let response = self
            .request(Method::PUT, &models::schema_route(name))
            .header(CONTENT_TYPE, XML)
            .body(schema.contents)
            .send()
            .await?;

        expect_success(response).await?;
        Ok(())
    }

    /// Create a search index. An `n_val` of zero falls back to 3.
    #[tracing::instrument(skip(self))]
    pub async fn create_index(&self, name: &str, schema: &str, n_val: u32) -> Result<()> {
        let response = self
            .request(Method::PUT, &models::index_route(name))
            .json(&IndexDefinition::new(schema, n_val))
            .send()
            .await?;

        expect_success(response).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, value))]
    pub async fn set_bucket_property(
        &self,
        bucket: &str,
        property: &str,
        value: impl Into<serde_json::Value>,
    ) -> Result<()> {
        let response = self
            .request(Method::PUT, &models::props_route(bucket))
            .json(&BucketProps::single(property, value))
            .send()
            .await?;

        expect_success(response).await?;
        Ok(())
    }

    /// Point `bucket` at a search index
    pub async fn associate_index(&self, bucket: &str, index: &str) -> Result<()> {
        self.set_bucket_property(bucket, SEARCH_INDEX_PROPERTY, index)
            .await
    }

    fn request(&self, method: Method, route: &[&str]) -> RequestBuilder {
        let url = self.url_for(route);
        tracing::debug!(%method, path = url.path(), "Riak request");

        let request = self.client.request(method, url);

        match &self.auth {
            Some((user, pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        }
    }

    /// Endpoint with each route segment percent-encoded onto its path
    fn url_for(&self, route: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        // The endpoint always has a host, so it can carry path segments
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(route);
        }
        url
    }
}

fn build_http_client(config: &Config) -> Result<HttpClient> {
    // One connection per request, released when the response is consumed
    let mut builder = HttpClient::builder().pool_max_idle_per_host(0);

    if let Some(timeout) = config.timeout() {
        builder = builder.timeout(timeout);
    }

    if let Some((path, passphrase)) = config.certificate() {
        let bytes = std::fs::read(path)
            .map_err(|e| ClientError::Tls(format!("cannot read certificate {}: {}", path, e)))?;

        builder = match passphrase {
            Some(passphrase) => with_pkcs12_identity(builder, &bytes, passphrase)?,
            None => {
                let identity = reqwest::Identity::from_pem(&bytes)
                    .map_err(|e| ClientError::Tls(format!("invalid certificate {}: {}", path, e)))?;
                builder.use_rustls_tls().identity(identity)
            }
        };
    }

    if config.insecure_skip_verify {
        tracing::warn!("TLS certificate and hostname verification disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    Ok(builder.build()?)
}

#[cfg(feature = "pkcs12")]
fn with_pkcs12_identity(builder: ClientBuilder, der: &[u8], passphrase: &str) -> Result<ClientBuilder> {
    let identity = reqwest::Identity::from_pkcs12_der(der, passphrase)
        .map_err(|e| ClientError::Tls(format!("invalid PKCS#12 certificate: {}", e)))?;
    Ok(builder.use_native_tls().identity(identity))
}

#[cfg(not(feature = "pkcs12"))]
fn with_pkcs12_identity(_builder: ClientBuilder, _der: &[u8], _passphrase: &str) -> Result<ClientBuilder> {
    Err(ClientError::Tls(
        "passphrase-protected certificates require the `pkcs12` feature".to_string(),
    ))
}

async fn expect_success(response: Response) -> Result<Response> {
    if !response.status().is_success() {
        return Err(ClientError::Server {
            status: response.status().as_u16(),
            message: response.text().await.unwrap_or_default(),
        });
    }

    Ok(response)
}

/// Decode a JSON body; missing objects and empty or malformed bodies are `None`
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<Option<T>> {
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }

    let body = expect_success(response).await?.bytes().await?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    match serde_json::from_slice(&body) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!("Undecodable response body: {}", e);
            Ok(None)
        }
    }
}
