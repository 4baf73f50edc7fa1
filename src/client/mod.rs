//! Remote file share clients.
//!
//! The [`FileShareClient`] trait is the capability set the adapter
//! consumes.  Paths passed to a client are share-relative and already
//! carry the adapter's prefix.  Implementations include the Azure File
//! REST client and an in-memory share.

pub mod azure;
pub mod error;
pub mod memory;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

pub use error::RemoteError;

/// Boxed future returned by every client call.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Properties of a single file, as returned by Get File Properties.
#[derive(Debug, Clone, PartialEq)]
pub struct FileProperties {
    pub content_length: u64,
    pub last_modified: DateTime<Utc>,
    /// Raw ETag, surrounding quotes included.
    pub etag: String,
    pub content_type: Option<String>,
    /// Base64 encoded MD5 of the content.
    pub content_md5: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_range: Option<String>,
    pub copy_id: Option<String>,
    pub copy_progress: Option<String>,
    pub copy_source: Option<String>,
    pub copy_status: Option<String>,
    pub copy_completion_time: Option<String>,
    pub copy_status_description: Option<String>,
    /// User metadata (`x-ms-meta-*`), keys without the header prefix.
    pub metadata: BTreeMap<String, String>,
}

/// Properties of a directory, as returned by Get Directory Properties.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryProperties {
    pub last_modified: DateTime<Utc>,
    pub etag: String,
    pub metadata: BTreeMap<String, String>,
}

/// Immediate children of a directory.  Names only; no path context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListResult {
    pub directories: Vec<String>,
    pub files: Vec<String>,
}

/// Content headers and metadata applied when a file is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateFileOptions {
    pub cache_control: Option<String>,
    pub content_type: Option<String>,
    pub content_language: Option<String>,
    pub content_encoding: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Async remote file share contract.
pub trait FileShareClient: Send + Sync + 'static {
    /// Base URI of the service, ending in `/`.  Copy sources are addressed
    /// as `{primary_uri}{share}/{encoded path}`.
    fn primary_uri(&self) -> String;

    /// Fetch the properties of the file at `path`.
    fn get_file_properties(&self, path: &str) -> ClientFuture<'_, FileProperties>;

    /// Fetch the properties of the directory at `path` (`""` is the share root).
    fn get_directory_properties(&self, path: &str) -> ClientFuture<'_, DirectoryProperties>;

    /// Download the full content of the file at `path`.
    fn get_file(&self, path: &str) -> ClientFuture<'_, Bytes>;

    /// Create (or replace) the file at `path` with `content`.  The parent
    /// directory must already exist.
    fn create_file_from_content(
        &self,
        path: &str,
        content: Bytes,
        options: &CreateFileOptions,
    ) -> ClientFuture<'_, ()>;

    /// Server-side copy of the file at the absolute URL `source_url` to `path`.
    fn copy_file(&self, path: &str, source_url: &str) -> ClientFuture<'_, ()>;

    /// Delete the file at `path`.
    fn delete_file(&self, path: &str) -> ClientFuture<'_, ()>;

    /// Create a single directory.  The parent must already exist.
    fn create_directory(&self, path: &str) -> ClientFuture<'_, ()>;

    /// Delete a single empty directory.
    fn delete_directory(&self, path: &str) -> ClientFuture<'_, ()>;

    /// List the immediate sub-directories and files of `path`.
    fn list_directories_and_files(&self, path: &str) -> ClientFuture<'_, ListResult>;
}
