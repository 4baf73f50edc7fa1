//! Azure File Storage REST client.
//!
//! Speaks the handful of Azure File REST calls the adapter consumes, using
//! `reqwest`.  Every call targets a single share:
//!
//!   Files:        `{endpoint}/{share}/{encoded path}`
//!   Directories:  `{endpoint}/{share}/{encoded path}?restype=directory`
//!
//! Uploads are Create File (sets size and content headers) followed by
//! Put Range calls of at most 4 MiB each.
//!
//! Credentials are either a Shared Key (HMAC-SHA256 signed requests) or a
//! SAS token appended to every URL.  [`AzureAuth::from_env`] resolves them
//! from:
//!   - `AZURE_STORAGE_KEY` environment variable (Shared Key auth)
//!   - `AZURE_STORAGE_CONNECTION_STRING` environment variable
//!   - `AZURE_STORAGE_SAS_TOKEN` environment variable (SAS token auth)

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::{HeaderMap, Method};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::error::{parse_error, RemoteError};
use super::{
    ClientFuture, CreateFileOptions, DirectoryProperties, FileProperties, FileShareClient,
    ListResult,
};
use crate::metrics;
use crate::path::encode_path_segments;

/// Azure REST API version used for all requests.
const AZURE_API_VERSION: &str = "2023-11-03";

/// Largest body a single Put Range call accepts.
const MAX_RANGE_BYTES: usize = 4 * 1024 * 1024;

/// Prefix of user metadata headers.
const META_HEADER_PREFIX: &str = "x-ms-meta-";

/// Client for a single Azure File share.
pub struct AzureFileClient {
    /// HTTP client for Azure File REST API calls.
    client: reqwest::Client,
    /// Azure storage account name.
    account: String,
    /// The remote share name.
    share: String,
    /// Service endpoint without trailing slash.
    endpoint: String,
    /// Authentication method.
    auth: AzureAuth,
}

/// Azure authentication method.
#[derive(Clone)]
pub enum AzureAuth {
    /// Shared Key authentication using the storage account key.
    SharedKey { key_bytes: Vec<u8> },
    /// SAS token authentication (appended as query parameter).
    SasToken { token: String },
}

impl std::fmt::Debug for AzureAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AzureAuth::SharedKey { .. } => f.write_str("SharedKey(..)"),
            AzureAuth::SasToken { .. } => f.write_str("SasToken(..)"),
        }
    }
}

impl AzureAuth {
    /// Shared Key auth from a base64 account key.
    pub fn shared_key(key: &str) -> anyhow::Result<Self> {
        let key_bytes = BASE64_STANDARD
            .decode(key.trim())
            .map_err(|e| anyhow::anyhow!("Invalid account key (not valid base64): {}", e))?;
        Ok(AzureAuth::SharedKey { key_bytes })
    }

    /// SAS token auth.  A leading `?` is dropped.
    pub fn sas_token(token: &str) -> Self {
        AzureAuth::SasToken {
            token: token.trim_start_matches('?').to_string(),
        }
    }

    /// Resolve Azure authentication from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        // 1. Try AZURE_STORAGE_KEY
        if let Ok(key) = std::env::var("AZURE_STORAGE_KEY") {
            return Self::shared_key(&key)
                .map_err(|e| anyhow::anyhow!("Invalid AZURE_STORAGE_KEY: {}", e));
        }

        // 2. Try AZURE_STORAGE_CONNECTION_STRING (AccountKey or SharedAccessSignature)
        if let Ok(conn_str) = std::env::var("AZURE_STORAGE_CONNECTION_STRING") {
            let parsed = crate::config::ConnectionString::parse(&conn_str)?;
            if let Some(auth) = parsed.auth()? {
                return Ok(auth);
            }
        }

        // 3. Try AZURE_STORAGE_SAS_TOKEN
        if let Ok(sas) = std::env::var("AZURE_STORAGE_SAS_TOKEN") {
            return Ok(Self::sas_token(&sas));
        }

        Err(anyhow::anyhow!(
            "No Azure credentials found. Set AZURE_STORAGE_KEY, \
             AZURE_STORAGE_CONNECTION_STRING, or AZURE_STORAGE_SAS_TOKEN."
        ))
    }
}

/// One REST call, before signing.
struct AzureRequest<'a> {
    operation: &'static str,
    method: Method,
    /// Share-relative, unencoded path.
    path: &'a str,
    query: Vec<(&'static str, String)>,
    /// Lowercase header names.
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl<'a> AzureRequest<'a> {
    fn new(operation: &'static str, method: Method, path: &'a str) -> Self {
        Self {
            operation,
            method,
            path,
            query: Vec::new(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_lowercase(), value.into()));
        self
    }

    fn body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }
}

impl AzureFileClient {
    /// Create a new client for `share`.
    ///
    /// `endpoint` defaults to `https://{account}.file.core.windows.net`.
    pub fn new(
        account: String,
        share: String,
        endpoint: Option<String>,
        auth: AzureAuth,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        let endpoint = endpoint
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| format!("https://{}.file.core.windows.net", account))
            .trim_end_matches('/')
            .to_string();

        info!(
            "Azure file client initialized: endpoint={} share={} account={}",
            endpoint, share, account
        );

        Ok(Self {
            client,
            account,
            share,
            endpoint,
            auth,
        })
    }

    /// URL path of a share-relative path: `/{share}/{encoded path}`.
    fn url_path(&self, path: &str) -> String {
        format!("/{}/{}", self.share, encode_path_segments(path))
    }

    /// Build the full request URL, query string and SAS token included.
    fn request_url(&self, path: &str, query: &[(&'static str, String)]) -> String {
        let mut url = format!("{}{}", self.endpoint, self.url_path(path));
        let mut pairs: Vec<String> = query
            .iter()
            .map(|(k, v)| format!("{}={}", k, utf8_percent_encode(v, NON_ALPHANUMERIC)))
            .collect();
        if let AzureAuth::SasToken { token } = &self.auth {
            pairs.push(token.clone());
        }
        if !pairs.is_empty() {
            url.push('?');
            url.push_str(&pairs.join("&"));
        }
        url
    }

    /// Canonicalized resource for Shared Key signing:
    /// `/{account}/{share}/{encoded path}` followed by sorted query params.
    fn canonicalized_resource(&self, path: &str, query: &[(&'static str, String)]) -> String {
        let mut resource = format!("/{}{}", self.account, self.url_path(path));
        let mut sorted: Vec<_> = query.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        for (k, v) in &sorted {
            resource.push_str(&format!("\n{}:{}", k.to_lowercase(), v));
        }
        resource
    }

    /// Build the Shared Key string-to-sign.
    ///
    /// ```text
    /// VERB\n
    /// Content-Encoding\n
    /// Content-Language\n
    /// Content-Length\n
    /// Content-MD5\n
    /// Content-Type\n
    /// Date\n
    /// If-Modified-Since\n
    /// If-Match\n
    /// If-None-Match\n
    /// If-Unmodified-Since\n
    /// Range\n
    /// CanonicalizedHeaders\n
    /// CanonicalizedResource
    /// ```
    fn string_to_sign(
        method: &Method,
        headers: &[(String, String)],
        content_length: usize,
        canonicalized_resource: &str,
    ) -> String {
        let standard = |name: &str| -> &str {
            headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
                .unwrap_or("")
        };

        // Content-Length: empty for 0 (version 2015-02-21 and later).
        let content_length_str = match content_length {
            0 => String::new(),
            len => len.to_string(),
        };

        let mut ms_headers: Vec<(&str, &str)> = headers
            .iter()
            .filter(|(k, _)| k.starts_with("x-ms-"))
            .map(|(k, v)| (k.as_str(), v.trim()))
            .collect();
        ms_headers.sort_by(|a, b| a.0.cmp(b.0));
        let canonicalized_headers = ms_headers
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n\n\n\n\n\n{}\n{}\n{}",
            method.as_str(),
            standard("content-encoding"),
            standard("content-language"),
            content_length_str,
            standard("content-md5"),
            standard("content-type"),
            standard("range"),
            canonicalized_headers,
            canonicalized_resource
        )
    }

    /// Sign a string-to-sign and return the Authorization header value.
    fn sign(&self, string_to_sign: &str) -> Result<Option<String>, RemoteError> {
        let key_bytes = match &self.auth {
            AzureAuth::SharedKey { key_bytes } => key_bytes,
            AzureAuth::SasToken { .. } => return Ok(None),
        };

        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(key_bytes)
            .map_err(|e| RemoteError::invalid("sign", format!("HMAC key error: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        Ok(Some(format!("SharedKey {}:{}", self.account, signature)))
    }

    /// Get the current UTC date in RFC 1123 format for Azure headers.
    fn rfc1123_date() -> String {
        httpdate::fmt_http_date(std::time::SystemTime::now())
    }

    /// Sign and send a request.  Non-success statuses become [`RemoteError`].
    async fn send(&self, req: AzureRequest<'_>) -> Result<reqwest::Response, RemoteError> {
        let AzureRequest {
            operation,
            method,
            path,
            query,
            mut headers,
            body,
        } = req;

        debug!(
            "Azure {}: share={} path={} method={}",
            operation, self.share, path, method
        );

        headers.push(("x-ms-date".to_string(), Self::rfc1123_date()));
        headers.push(("x-ms-version".to_string(), AZURE_API_VERSION.to_string()));
        headers.push((
            "x-ms-client-request-id".to_string(),
            uuid::Uuid::new_v4().to_string(),
        ));

        let string_to_sign = Self::string_to_sign(
            &method,
            &headers,
            body.len(),
            &self.canonicalized_resource(path, &query),
        );
        let authorization = self.sign(&string_to_sign)?;

        let url = self.request_url(path, &query);
        let mut builder = self
            .client
            .request(method, &url)
            .header("Content-Length", body.len());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(authorization) = authorization {
            builder = builder.header("Authorization", authorization);
        }

        let start = Instant::now();
        let result = builder.body(body).send().await;
        let elapsed = start.elapsed().as_secs_f64();

        let resp = match result {
            Ok(resp) => resp,
            Err(source) => {
                metrics::record_remote_request(operation, 0, elapsed);
                return Err(RemoteError::Transport { operation, source });
            }
        };

        let status = resp.status();
        metrics::record_remote_request(operation, status.as_u16(), elapsed);

        if !status.is_success() {
            let headers = resp.headers().clone();
            let body = resp.text().await.unwrap_or_default();
            return Err(parse_error(operation, status, &headers, &body));
        }

        Ok(resp)
    }

    // -- Azure File REST API operations ---------------------------------------

    /// Create File: allocate the file and set its content headers.
    async fn azure_create_file(
        &self,
        path: &str,
        size: usize,
        options: &CreateFileOptions,
    ) -> Result<(), RemoteError> {
        let mut req = AzureRequest::new("create_file", Method::PUT, path)
            .header("x-ms-type", "file")
            .header("x-ms-content-length", size.to_string());

        let content_headers = [
            ("x-ms-cache-control", &options.cache_control),
            ("x-ms-content-type", &options.content_type),
            ("x-ms-content-language", &options.content_language),
            ("x-ms-content-encoding", &options.content_encoding),
        ];
        for (name, value) in content_headers {
            if let Some(value) = value {
                req = req.header(name, value.clone());
            }
        }
        for (key, value) in &options.metadata {
            req = req.header(&format!("{}{}", META_HEADER_PREFIX, key), value.clone());
        }

        self.send(req).await?;
        Ok(())
    }

    /// Put Range: write `data` at `offset`.
    async fn azure_put_range(&self, path: &str, offset: usize, data: Bytes) -> Result<(), RemoteError> {
        let end = offset + data.len() - 1;
        let req = AzureRequest::new("put_range", Method::PUT, path)
            .query("comp", "range")
            .header("x-ms-write", "update")
            .header("x-ms-range", format!("bytes={}-{}", offset, end))
            .body(data);

        self.send(req).await?;
        Ok(())
    }

    /// One page of List Directories and Files.
    async fn azure_list_page(
        &self,
        path: &str,
        marker: Option<&str>,
    ) -> Result<(ListResult, Option<String>), RemoteError> {
        let mut req = AzureRequest::new("list_directories_and_files", Method::GET, path)
            .query("comp", "list")
            .query("restype", "directory");
        if let Some(marker) = marker {
            req = req.query("marker", marker);
        }

        let resp = self.send(req).await?;
        let body = resp.text().await.map_err(|source| RemoteError::Transport {
            operation: "list_directories_and_files",
            source,
        })?;

        Ok(parse_list_result(&body))
    }
}

/// Append the SAS token to a copy source URL so the service can read it.
fn append_sas(url: String, auth: &AzureAuth) -> String {
    match auth {
        AzureAuth::SasToken { token } => {
            if url.contains('?') {
                format!("{}&{}", url, token)
            } else {
                format!("{}?{}", url, token)
            }
        }
        AzureAuth::SharedKey { .. } => url,
    }
}

// -- Response parsing ---------------------------------------------------------

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn parse_last_modified(operation: &'static str, headers: &HeaderMap) -> Result<DateTime<Utc>, RemoteError> {
    let raw = header_str(headers, "last-modified")
        .ok_or_else(|| RemoteError::invalid(operation, "response missing Last-Modified"))?;
    let parsed = httpdate::parse_http_date(&raw)
        .map_err(|e| RemoteError::invalid(operation, format!("bad Last-Modified {:?}: {}", raw, e)))?;
    Ok(DateTime::<Utc>::from(parsed))
}

fn parse_metadata(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(META_HEADER_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Map Get File Properties response headers onto [`FileProperties`].
fn parse_file_properties(headers: &HeaderMap) -> Result<FileProperties, RemoteError> {
    const OP: &str = "get_file_properties";
    let content_length = header_str(headers, "content-length")
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| RemoteError::invalid(OP, "response missing Content-Length"))?;

    Ok(FileProperties {
        content_length,
        last_modified: parse_last_modified(OP, headers)?,
        etag: header_str(headers, "etag").unwrap_or_default(),
        content_type: header_str(headers, "content-type"),
        content_md5: header_str(headers, "content-md5"),
        content_encoding: header_str(headers, "content-encoding"),
        content_language: header_str(headers, "content-language"),
        cache_control: header_str(headers, "cache-control"),
        content_disposition: header_str(headers, "content-disposition"),
        content_range: header_str(headers, "content-range"),
        copy_id: header_str(headers, "x-ms-copy-id"),
        copy_progress: header_str(headers, "x-ms-copy-progress"),
        copy_source: header_str(headers, "x-ms-copy-source"),
        copy_status: header_str(headers, "x-ms-copy-status"),
        copy_completion_time: header_str(headers, "x-ms-copy-completion-time"),
        copy_status_description: header_str(headers, "x-ms-copy-status-description"),
        metadata: parse_metadata(headers),
    })
}

/// Map Get Directory Properties response headers onto [`DirectoryProperties`].
fn parse_directory_properties(headers: &HeaderMap) -> Result<DirectoryProperties, RemoteError> {
    Ok(DirectoryProperties {
        last_modified: parse_last_modified("get_directory_properties", headers)?,
        etag: header_str(headers, "etag").unwrap_or_default(),
        metadata: parse_metadata(headers),
    })
}

/// Parse a List Directories and Files document into child names and the
/// continuation marker.
fn parse_list_result(body: &str) -> (ListResult, Option<String>) {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut result = ListResult::default();
    let mut next_marker = None;
    let mut stack: Vec<Vec<u8>> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(e.name().as_ref().to_vec()),
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(t)) => {
                let text = match t.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => continue,
                };
                let depth = stack.len();
                let current = stack.last().map(Vec::as_slice);
                let parent = depth
                    .checked_sub(2)
                    .and_then(|i| stack.get(i))
                    .map(Vec::as_slice);
                match (parent, current) {
                    (Some(b"File"), Some(b"Name")) => result.files.push(text),
                    (Some(b"Directory"), Some(b"Name")) => result.directories.push(text),
                    (_, Some(b"NextMarker")) if !text.is_empty() => next_marker = Some(text),
                    _ => {}
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    (result, next_marker)
}

impl FileShareClient for AzureFileClient {
    fn primary_uri(&self) -> String {
        format!("{}/", self.endpoint)
    }

    fn get_file_properties(&self, path: &str) -> ClientFuture<'_, FileProperties> {
        let path = path.to_string();
        Box::pin(async move {
            let req = AzureRequest::new("get_file_properties", Method::HEAD, &path);
            let resp = self.send(req).await?;
            parse_file_properties(resp.headers())
        })
    }

    fn get_directory_properties(&self, path: &str) -> ClientFuture<'_, DirectoryProperties> {
        let path = path.to_string();
        Box::pin(async move {
            let req = AzureRequest::new("get_directory_properties", Method::HEAD, &path)
                .query("restype", "directory");
            let resp = self.send(req).await?;
            parse_directory_properties(resp.headers())
        })
    }

    fn get_file(&self, path: &str) -> ClientFuture<'_, Bytes> {
        let path = path.to_string();
        Box::pin(async move {
            let req = AzureRequest::new("get_file", Method::GET, &path);
            let resp = self.send(req).await?;
            let data = resp.bytes().await.map_err(|source| RemoteError::Transport {
                operation: "get_file",
                source,
            })?;
            metrics::record_bytes_read(data.len());
            Ok(data)
        })
    }

    fn create_file_from_content(
        &self,
        path: &str,
        content: Bytes,
        options: &CreateFileOptions,
    ) -> ClientFuture<'_, ()> {
        let path = path.to_string();
        let options = options.clone();
        Box::pin(async move {
            self.azure_create_file(&path, content.len(), &options).await?;

            let mut offset = 0;
            while offset < content.len() {
                let end = (offset + MAX_RANGE_BYTES).min(content.len());
                self.azure_put_range(&path, offset, content.slice(offset..end))
                    .await?;
                offset = end;
            }

            metrics::record_bytes_written(content.len());
            Ok(())
        })
    }

    fn copy_file(&self, path: &str, source_url: &str) -> ClientFuture<'_, ()> {
        let path = path.to_string();
        let source_url = append_sas(source_url.to_string(), &self.auth);
        Box::pin(async move {
            let req = AzureRequest::new("copy_file", Method::PUT, &path)
                .header("x-ms-copy-source", source_url);
            self.send(req).await?;
            Ok(())
        })
    }

    fn delete_file(&self, path: &str) -> ClientFuture<'_, ()> {
        let path = path.to_string();
        Box::pin(async move {
            let req = AzureRequest::new("delete_file", Method::DELETE, &path);
            self.send(req).await?;
            Ok(())
        })
    }

    fn create_directory(&self, path: &str) -> ClientFuture<'_, ()> {
        let path = path.to_string();
        Box::pin(async move {
            let req = AzureRequest::new("create_directory", Method::PUT, &path)
                .query("restype", "directory");
            self.send(req).await?;
            Ok(())
        })
    }

    fn delete_directory(&self, path: &str) -> ClientFuture<'_, ()> {
        let path = path.to_string();
        Box::pin(async move {
            let req = AzureRequest::new("delete_directory", Method::DELETE, &path)
                .query("restype", "directory");
            self.send(req).await?;
            Ok(())
        })
    }

    fn list_directories_and_files(&self, path: &str) -> ClientFuture<'_, ListResult> {
        let path = path.to_string();
        Box::pin(async move {
            let mut all = ListResult::default();
            let mut marker: Option<String> = None;

            loop {
                let (page, next_marker) = self.azure_list_page(&path, marker.as_deref()).await?;
                all.directories.extend(page.directories);
                all.files.extend(page.files);

                match next_marker {
                    Some(m) => marker = Some(m),
                    None => break,
                }
            }

            Ok(all)
        })
    }
}

// -- Tests -------------------------------------------------------------------
