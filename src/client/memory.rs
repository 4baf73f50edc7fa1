//! In-memory file share.
//!
//! Holds directories and files in a `tokio::sync::RwLock<BTreeMap<...>>`
//! keyed by share-relative path, and enforces the same rules as an Azure
//! File share:
//!
//!   - creating a file or directory under a missing parent is a 404
//!     (`ParentNotFound`);
//!   - creating an existing directory is a 409 (`ResourceAlreadyExists`);
//!   - deleting a non-empty directory is a 409 (`DirectoryNotEmpty`);
//!   - copying into a missing directory is a 404.
//!
//! Every remote call is appended to a call log, failures can be injected
//! per operation and path, and copies can be made to report `pending` for
//! a number of property fetches, so adapter behaviour can be asserted
//! without a live account.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::StatusCode;
use md5::{Digest, Md5};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::error::{RemoteError, RESOURCE_ALREADY_EXISTS};
use super::{
    ClientFuture, CreateFileOptions, DirectoryProperties, FileProperties, FileShareClient,
    ListResult,
};
use crate::path::{decode_path_segments, parent_directory};

/// Base URI reported by the in-memory share.
const MEMORY_PRIMARY_URI: &str = "memory://azurefs.local/";

/// A stored node.
#[derive(Debug, Clone)]
enum Node {
    Directory {
        last_modified: DateTime<Utc>,
        etag: String,
    },
    File {
        data: Bytes,
        properties: FileProperties,
    },
}

/// In-memory share implementing [`FileShareClient`].
pub struct MemoryShareClient {
    share: String,
    /// path -> node.  The root directory is the empty path.
    nodes: RwLock<BTreeMap<String, Node>>,
    /// `operation:path` for every call, in call order.
    calls: Mutex<Vec<String>>,
    /// (operation, path) -> (status to fail with, fail only once).
    failures: Mutex<HashMap<(String, String), (StatusCode, bool)>>,
    /// Property fetches a new copy stays `pending` for.
    copy_pending_polls: AtomicUsize,
    /// Copy destination -> property fetches left until it completes.
    pending_copies: Mutex<HashMap<String, usize>>,
    /// Monotonic counter used to mint ETags.
    generation: AtomicU64,
}

impl MemoryShareClient {
    /// Create an empty share containing only its root directory.
    pub fn new(share: &str) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            String::new(),
            Node::Directory {
                last_modified: Utc::now(),
                etag: "\"0x0\"".to_string(),
            },
        );
        Self {
            share: share.to_string(),
            nodes: RwLock::new(nodes),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            copy_pending_polls: AtomicUsize::new(0),
            pending_copies: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(1),
        }
    }

    /// Make every future `operation` call on `path` fail with `status`.
    pub async fn fail_on(&self, operation: &str, path: &str, status: StatusCode) {
        self.failures
            .lock()
            .await
            .insert((operation.to_string(), path.to_string()), (status, false));
    }

    /// Make only the next `operation` call on `path` fail with `status`.
    pub async fn fail_once_on(&self, operation: &str, path: &str, status: StatusCode) {
        self.failures
            .lock()
            .await
            .insert((operation.to_string(), path.to_string()), (status, true));
    }

    /// Report later copies as `pending` for `polls` property fetches of
    /// the destination before they complete.
    pub fn set_copy_pending_polls(&self, polls: usize) {
        self.copy_pending_polls.store(polls, Ordering::SeqCst);
    }

    /// Remove all injected failures.
    pub async fn clear_failures(&self) {
        self.failures.lock().await.clear();
    }

    /// The call log, as `operation:path` entries.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    /// Clear the call log.
    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    /// Share-relative paths of every stored node except the root.
    pub async fn paths(&self) -> Vec<String> {
        self.nodes
            .read()
            .await
            .keys()
            .filter(|k| !k.is_empty())
            .cloned()
            .collect()
    }

    fn next_etag(&self) -> String {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        format!("\"0x{:X}\"", generation)
    }

    /// Log the call, then apply any injected failure.
    async fn enter(&self, operation: &'static str, path: &str) -> Result<(), RemoteError> {
        debug!("Memory {}: share={} path={}", operation, self.share, path);
        self.calls.lock().await.push(format!("{}:{}", operation, path));

        let mut failures = self.failures.lock().await;
        let key = (operation.to_string(), path.to_string());
        match failures.get(&key).copied() {
            Some((status, once)) => {
                if once {
                    failures.remove(&key);
                }
                Err(RemoteError::service(
                    operation,
                    status,
                    "InjectedFailure",
                    "injected failure",
                ))
            }
            None => Ok(()),
        }
    }

    fn not_found(operation: &'static str, code: &str) -> RemoteError {
        RemoteError::service(
            operation,
            StatusCode::NOT_FOUND,
            code,
            "The specified resource does not exist.",
        )
    }

    fn conflict(operation: &'static str, code: &str) -> RemoteError {
        RemoteError::service(operation, StatusCode::CONFLICT, code, code)
    }

    /// Parent must exist and be a directory.
    fn check_parent(
        nodes: &BTreeMap<String, Node>,
        operation: &'static str,
        path: &str,
    ) -> Result<(), RemoteError> {
        match nodes.get(parent_directory(path)) {
            Some(Node::Directory { .. }) => Ok(()),
            _ => Err(Self::not_found(operation, "ParentNotFound")),
        }
    }

    /// Map an absolute copy source URL back to a share-relative path.
    fn path_from_url(&self, url: &str) -> Option<String> {
        let share_root = format!("{}{}/", MEMORY_PRIMARY_URI, self.share);
        let encoded = url.strip_prefix(&share_root)?;
        decode_path_segments(encoded)
    }

    /// Count one property fetch against a pending copy to `path`, marking
    /// the copy successful once its fetches are used up.
    async fn advance_copy(&self, path: &str) {
        {
            let mut pending = self.pending_copies.lock().await;
            let Some(left) = pending.get_mut(path) else {
                return;
            };
            *left = left.saturating_sub(1);
            if *left > 0 {
                return;
            }
            pending.remove(path);
        }
        if let Some(Node::File { data, properties }) = self.nodes.write().await.get_mut(path) {
            properties.copy_status = Some("success".to_string());
            properties.copy_progress = Some(format!("{}/{}", data.len(), data.len()));
            properties.copy_completion_time = Some(httpdate::fmt_http_date(Utc::now().into()));
        }
    }

    fn compute_md5(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        BASE64_STANDARD.encode(hasher.finalize())
    }

    fn has_children(nodes: &BTreeMap<String, Node>, path: &str) -> bool {
        let child_prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        nodes
            .keys()
            .any(|k| !k.is_empty() && k != path && k.starts_with(&child_prefix))
    }
}

impl FileShareClient for MemoryShareClient {
    fn primary_uri(&self) -> String {
        MEMORY_PRIMARY_URI.to_string()
    }

    fn get_file_properties(&self, path: &str) -> ClientFuture<'_, FileProperties> {
        let path = path.to_string();
        Box::pin(async move {
            self.enter("get_file_properties", &path).await?;
            self.advance_copy(&path).await;
            match self.nodes.read().await.get(&path) {
                Some(Node::File { properties, .. }) => Ok(properties.clone()),
                _ => Err(Self::not_found("get_file_properties", "ResourceNotFound")),
            }
        })
    }

    fn get_directory_properties(&self, path: &str) -> ClientFuture<'_, DirectoryProperties> {
        let path = path.to_string();
        Box::pin(async move {
            self.enter("get_directory_properties", &path).await?;
            match self.nodes.read().await.get(&path) {
                Some(Node::Directory {
                    last_modified,
                    etag,
                }) => Ok(DirectoryProperties {
                    last_modified: *last_modified,
                    etag: etag.clone(),
                    metadata: BTreeMap::new(),
                }),
                _ => Err(Self::not_found("get_directory_properties", "ResourceNotFound")),
            }
        })
    }

    fn get_file(&self, path: &str) -> ClientFuture<'_, Bytes> {
        let path = path.to_string();
        Box::pin(async move {
            self.enter("get_file", &path).await?;
            match self.nodes.read().await.get(&path) {
                Some(Node::File { data, .. }) => Ok(data.clone()),
                _ => Err(Self::not_found("get_file", "ResourceNotFound")),
            }
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
            const OP: &str = "create_file";
            self.enter(OP, &path).await?;

            let mut nodes = self.nodes.write().await;
            Self::check_parent(&nodes, OP, &path)?;
            if let Some(Node::Directory { .. }) = nodes.get(&path) {
                return Err(Self::conflict(OP, RESOURCE_ALREADY_EXISTS));
            }

            let properties = FileProperties {
                content_length: content.len() as u64,
                last_modified: Utc::now(),
                etag: self.next_etag(),
                content_type: Some(
                    options
                        .content_type
                        .clone()
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                ),
                content_md5: Some(Self::compute_md5(&content)),
                content_encoding: options.content_encoding.clone(),
                content_language: options.content_language.clone(),
                cache_control: options.cache_control.clone(),
                content_disposition: None,
                content_range: None,
                copy_id: None,
                copy_progress: None,
                copy_source: None,
                copy_status: None,
                copy_completion_time: None,
                copy_status_description: None,
                metadata: options.metadata.clone(),
            };
            nodes.insert(
                path,
                Node::File {
                    data: content,
                    properties,
                },
            );
            Ok(())
        })
    }

    fn copy_file(&self, path: &str, source_url: &str) -> ClientFuture<'_, ()> {
        let path = path.to_string();
        let source_url = source_url.to_string();
        Box::pin(async move {
            const OP: &str = "copy_file";
            self.enter(OP, &path).await?;

            let source = self
                .path_from_url(&source_url)
                .ok_or_else(|| RemoteError::invalid(OP, format!("foreign copy source {}", source_url)))?;

            let mut nodes = self.nodes.write().await;
            let (data, mut properties) = match nodes.get(&source) {
                Some(Node::File { data, properties }) => (data.clone(), properties.clone()),
                _ => return Err(Self::not_found(OP, "CannotVerifyCopySource")),
            };
            Self::check_parent(&nodes, OP, &path)?;
            if let Some(Node::Directory { .. }) = nodes.get(&path) {
                return Err(Self::conflict(OP, RESOURCE_ALREADY_EXISTS));
            }

            let now = Utc::now();
            properties.last_modified = now;
            properties.etag = self.next_etag();
            properties.copy_id = Some(uuid::Uuid::new_v4().to_string());
            properties.copy_source = Some(source_url);
            let pending_polls = self.copy_pending_polls.load(Ordering::SeqCst);
            if pending_polls > 0 {
                properties.copy_status = Some("pending".to_string());
                properties.copy_progress = Some(format!("0/{}", data.len()));
                properties.copy_completion_time = None;
                self.pending_copies
                    .lock()
                    .await
                    .insert(path.clone(), pending_polls);
            } else {
                properties.copy_status = Some("success".to_string());
                properties.copy_progress = Some(format!("{}/{}", data.len(), data.len()));
                properties.copy_completion_time = Some(httpdate::fmt_http_date(now.into()));
            }
            nodes.insert(path, Node::File { data, properties });
            Ok(())
        })
    }

    fn delete_file(&self, path: &str) -> ClientFuture<'_, ()> {
        let path = path.to_string();
        Box::pin(async move {
            self.enter("delete_file", &path).await?;
            let mut nodes = self.nodes.write().await;
            match nodes.get(&path) {
                Some(Node::File { .. }) => {
                    nodes.remove(&path);
                    Ok(())
                }
                _ => Err(Self::not_found("delete_file", "ResourceNotFound")),
            }
        })
    }

    fn create_directory(&self, path: &str) -> ClientFuture<'_, ()> {
        let path = path.to_string();
        Box::pin(async move {
            const OP: &str = "create_directory";
            self.enter(OP, &path).await?;
            let mut nodes = self.nodes.write().await;
            if nodes.contains_key(&path) {
                return Err(Self::conflict(OP, RESOURCE_ALREADY_EXISTS));
            }
            Self::check_parent(&nodes, OP, &path)?;
            let etag = self.next_etag();
            nodes.insert(
                path,
                Node::Directory {
                    last_modified: Utc::now(),
                    etag,
                },
            );
            Ok(())
        })
    }

    fn delete_directory(&self, path: &str) -> ClientFuture<'_, ()> {
        let path = path.to_string();
        Box::pin(async move {
            const OP: &str = "delete_directory";
            self.enter(OP, &path).await?;
            let mut nodes = self.nodes.write().await;
            if path.is_empty() {
                return Err(RemoteError::service(
                    OP,
                    StatusCode::BAD_REQUEST,
                    "InvalidUri",
                    "The share root cannot be deleted.",
                ));
            }
            match nodes.get(&path) {
                Some(Node::Directory { .. }) => {}
                _ => return Err(Self::not_found(OP, "ResourceNotFound")),
            }
            if Self::has_children(&nodes, &path) {
                return Err(Self::conflict(OP, "DirectoryNotEmpty"));
            }
            nodes.remove(&path);
            Ok(())
        })
    }

    fn list_directories_and_files(&self, path: &str) -> ClientFuture<'_, ListResult> {
        let path = path.to_string();
        Box::pin(async move {
            self.enter("list_directories_and_files", &path).await?;
            let nodes = self.nodes.read().await;
            match nodes.get(&path) {
                Some(Node::Directory { .. }) => {}
                _ => return Err(Self::not_found("list_directories_and_files", "ResourceNotFound")),
            }

            let mut result = ListResult::default();
            for (key, node) in nodes.iter() {
                if key.is_empty() || key == &path || parent_directory(key) != path {
                    continue;
                }
                let name = match key.rsplit_once('/') {
                    Some((_, name)) => name.to_string(),
                    None => key.clone(),
                };
                match node {
                    Node::Directory { .. } => result.directories.push(name),
                    Node::File { .. } => result.files.push(name),
                }
            }
            Ok(result)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share() -> MemoryShareClient {
        MemoryShareClient::new("test-share")
    }

    #[tokio::test]
    async fn test_root_directory_exists() {
        let client = share();
        assert!(client.get_directory_properties("").await.is_ok());
        assert!(client.paths().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_file_requires_parent() {
        let client = share();
        let err = client
            .create_file_from_content("missing/f.txt", Bytes::from("x"), &CreateFileOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.code(), Some("ParentNotFound"));
    }

    #[tokio::test]
    async fn test_create_and_read_file() {
        let client = share();
        client
            .create_file_from_content("f.txt", Bytes::from("content"), &CreateFileOptions::default())
            .await
            .unwrap();

        let props = client.get_file_properties("f.txt").await.unwrap();
        assert_eq!(props.content_length, 7);
        assert_eq!(props.content_type.as_deref(), Some("application/octet-stream"));
        assert_eq!(props.content_md5.as_deref(), Some("mgNkuembtIDdJeHwKEyFVQ=="));
        assert_eq!(client.get_file("f.txt").await.unwrap(), Bytes::from("content"));
    }

    #[tokio::test]
    async fn test_file_is_not_a_directory() {
        let client = share();
        client
            .create_file_from_content("f.txt", Bytes::from("x"), &CreateFileOptions::default())
            .await
            .unwrap();
        assert!(client.get_directory_properties("f.txt").await.unwrap_err().is_not_found());
        client.create_directory("d").await.unwrap();
        assert!(client.get_file_properties("d").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_create_existing_directory_conflicts() {
        let client = share();
        client.create_directory("d").await.unwrap();
        let err = client.create_directory("d").await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_delete_non_empty_directory_conflicts() {
        let client = share();
        client.create_directory("d").await.unwrap();
        client
            .create_file_from_content("d/f", Bytes::from("x"), &CreateFileOptions::default())
            .await
            .unwrap();
        let err = client.delete_directory("d").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::CONFLICT));
        assert_eq!(err.code(), Some("DirectoryNotEmpty"));

        client.delete_file("d/f").await.unwrap();
        client.delete_directory("d").await.unwrap();
        assert!(client.paths().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_immediate_children_only() {
        let client = share();
        client.create_directory("a").await.unwrap();
        client.create_directory("a/b").await.unwrap();
        client.create_directory("ab").await.unwrap();
        let opts = CreateFileOptions::default();
        client.create_file_from_content("a/f1", Bytes::new(), &opts).await.unwrap();
        client.create_file_from_content("a/b/f2", Bytes::new(), &opts).await.unwrap();

        let root = client.list_directories_and_files("").await.unwrap();
        assert_eq!(root.directories, vec!["a", "ab"]);
        assert!(root.files.is_empty());

        let a = client.list_directories_and_files("a").await.unwrap();
        assert_eq!(a.directories, vec!["b"]);
        assert_eq!(a.files, vec!["f1"]);

        assert!(client
            .list_directories_and_files("nope")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_copy_by_url() {
        let client = share();
        client.create_directory("dir one").await.unwrap();
        client
            .create_file_from_content("dir one/a b.txt", Bytes::from("hi"), &CreateFileOptions::default())
            .await
            .unwrap();

        let url = "memory://azurefs.local/test-share/dir%20one/a%20b.txt";
        client.copy_file("copy.txt", url).await.unwrap();
        assert_eq!(client.get_file("copy.txt").await.unwrap(), Bytes::from("hi"));
        let props = client.get_file_properties("copy.txt").await.unwrap();
        assert_eq!(props.copy_status.as_deref(), Some("success"));

        let err = client.copy_file("missing/copy.txt", url).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_failure_and_call_log() {
        let client = share();
        client
            .fail_on("get_file", "f.txt", StatusCode::INTERNAL_SERVER_ERROR)
            .await;
        let err = client.get_file("f.txt").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(client.calls().await, vec!["get_file:f.txt"]);

        client.clear_failures().await;
        client.clear_calls().await;
        assert!(client.get_file("f.txt").await.unwrap_err().is_not_found());
        assert_eq!(client.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_once_clears_itself() {
        let client = share();
        client
            .fail_once_on("get_directory_properties", "", StatusCode::NOT_FOUND)
            .await;
        assert!(client.get_directory_properties("").await.unwrap_err().is_not_found());
        assert!(client.get_directory_properties("").await.is_ok());
    }

    #[tokio::test]
    async fn test_pending_copy_completes_after_polls() {
        let client = share();
        client
            .create_file_from_content("a.txt", Bytes::from("abc"), &CreateFileOptions::default())
            .await
            .unwrap();
        client.set_copy_pending_polls(2);
        client
            .copy_file("b.txt", "memory://azurefs.local/test-share/a.txt")
            .await
            .unwrap();

        let first = client.get_file_properties("b.txt").await.unwrap();
        assert_eq!(first.copy_status.as_deref(), Some("pending"));
        let second = client.get_file_properties("b.txt").await.unwrap();
        assert_eq!(second.copy_status.as_deref(), Some("success"));
        assert_eq!(second.copy_progress.as_deref(), Some("3/3"));
    }

    #[tokio::test]
    async fn test_etags_are_unique() {
        let client = share();
        client.create_directory("a").await.unwrap();
        client.create_directory("b").await.unwrap();
        let a = client.get_directory_properties("a").await.unwrap();
        let b = client.get_directory_properties("b").await.unwrap();
        assert_ne!(a.etag, b.etag);
    }
}
