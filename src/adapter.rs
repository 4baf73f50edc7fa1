//! The filesystem adapter.
//!
//! [`AzureFileAdapter`] exposes the generic filesystem operations (write,
//! read, delete, copy, metadata, directories) on top of any
//! [`FileShareClient`].  Every public operation normalizes its paths,
//! applies the configured prefix once on the way to the client, and maps
//! remote failures onto [`FsError`].  Directory emulation lives in
//! `directory.rs`.

use bytes::Bytes;
use std::future::Future;
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info};

use crate::attributes::{
    normalize_directory_properties, normalize_file_properties, DirectoryAttributes,
    FileAttributes, StorageAttributes, Visibility,
};
use crate::client::azure::AzureFileClient;
use crate::client::{FileShareClient, RemoteError};
use crate::config::ShareConfig;
use crate::errors::FsError;
use crate::metrics;
use crate::options::{options_from_config, WriteConfig};
use crate::path::{encode_path_segments, normalize_path, parent_directory, PathPrefixer};

/// Delay between copy status checks while a move waits for its copy.
const COPY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Status checks before a move gives up on a pending copy.
const COPY_POLL_LIMIT: usize = 150;

/// Filesystem adapter for one Azure File share.
pub struct AzureFileAdapter {
    pub(crate) client: Arc<dyn FileShareClient>,
    share: String,
    pub(crate) prefixer: PathPrefixer,
    pub(crate) disable_recursive_delete: bool,
}

/// Run one adapter operation, counting its outcome.
pub(crate) async fn instrumented<T, F>(operation: &'static str, fut: F) -> Result<T, FsError>
where
    F: Future<Output = Result<T, FsError>>,
{
    let result = fut.await;
    metrics::record_operation(operation, &result);
    if let Err(e) = &result {
        debug!("{} failed: {}", operation, e);
    }
    result
}

impl AzureFileAdapter {
    /// Create an adapter over `client`, scoped under `prefix`.
    pub fn new(client: Arc<dyn FileShareClient>, share: &str, prefix: &str) -> Self {
        let prefixer = PathPrefixer::new(prefix);
        info!(
            "Azure file adapter initialized: share={} prefix={:?}",
            share,
            prefixer.prefix()
        );
        Self {
            client,
            share: share.to_string(),
            prefixer,
            disable_recursive_delete: false,
        }
    }

    /// Only delete directories that are already empty.
    pub fn with_recursive_delete_disabled(mut self, disabled: bool) -> Self {
        self.disable_recursive_delete = disabled;
        self
    }

    /// Build an adapter talking to Azure from configuration.
    pub fn from_config(config: &ShareConfig) -> anyhow::Result<Self> {
        let client = AzureFileClient::new(
            config.resolve_account()?,
            config.share_name.clone(),
            config.resolve_endpoint()?,
            config.resolve_auth()?,
            config.timeout(),
        )?;
        Ok(Self::new(Arc::new(client), &config.share_name, &config.prefix)
            .with_recursive_delete_disabled(config.disable_recursive_delete))
    }

    pub fn share(&self) -> &str {
        &self.share
    }

    pub fn prefix(&self) -> &str {
        self.prefixer.prefix()
    }

    // -- Writing -------------------------------------------------------------

    /// Write `contents` to `path`, replacing any existing file, and return
    /// the attributes the service reports afterwards.
    pub async fn write(
        &self,
        path: &str,
        contents: impl Into<Bytes>,
        config: &WriteConfig,
    ) -> Result<FileAttributes, FsError> {
        let contents = contents.into();
        instrumented("write", async {
            let path = normalize_path(path)?;
            self.upload(&path, contents, config).await
        })
        .await
    }

    /// Drain `reader` and write it to `path`.
    pub async fn write_stream<R>(
        &self,
        path: &str,
        mut reader: R,
        config: &WriteConfig,
    ) -> Result<FileAttributes, FsError>
    where
        R: AsyncRead + Unpin + Send,
    {
        instrumented("write_stream", async {
            let path = normalize_path(path)?;
            let mut buf = Vec::new();
            reader
                .read_to_end(&mut buf)
                .await
                .map_err(|e| FsError::UnableToWriteFile {
                    location: path.clone(),
                    reason: format!("Failed to read source stream: {}", e),
                    cause: None,
                })?;
            self.upload(&path, Bytes::from(buf), config).await
        })
        .await
    }

    async fn upload(
        &self,
        path: &str,
        contents: Bytes,
        config: &WriteConfig,
    ) -> Result<FileAttributes, FsError> {
        self.ensure_directory(parent_directory(path))
            .await
            .map_err(|e| match e {
                FsError::UnableToCreateDirectory { location, cause } => FsError::UnableToWriteFile {
                    location: path.to_string(),
                    reason: format!("Unable to create parent directory {}", location),
                    cause: Some(cause),
                },
                other => other,
            })?;

        let options = options_from_config(config);
        let remote = self.prefixer.prefix_path(path);
        debug!("Uploading {} ({} bytes)", remote, contents.len());
        self.client
            .create_file_from_content(&remote, contents, &options)
            .await
            .map_err(|e| FsError::write(path, e))?;

        self.file_metadata(path).await
    }

    // -- Reading -------------------------------------------------------------

    /// Read the full content of `path`.
    pub async fn read(&self, path: &str) -> Result<Bytes, FsError> {
        instrumented("read", async {
            let path = normalize_path(path)?;
            self.download(&path).await
        })
        .await
    }

    /// Read `path` into an anonymous temporary file and return it rewound.
    pub async fn read_stream(&self, path: &str) -> Result<tokio::fs::File, FsError> {
        instrumented("read_stream", async {
            let path = normalize_path(path)?;
            let content = self.download(&path).await?;

            let spool_error = |e: std::io::Error| FsError::UnableToReadFile {
                location: path.clone(),
                reason: format!("Failed to spool content: {}", e),
                cause: None,
            };
            let spool = tempfile::tempfile().map_err(spool_error)?;
            let mut file = tokio::fs::File::from_std(spool);
            file.write_all(&content).await.map_err(spool_error)?;
            file.flush().await.map_err(spool_error)?;
            file.seek(SeekFrom::Start(0)).await.map_err(spool_error)?;
            Ok(file)
        })
        .await
    }

    async fn download(&self, path: &str) -> Result<Bytes, FsError> {
        self.client
            .get_file(&self.prefixer.prefix_path(path))
            .await
            .map_err(|e| FsError::read(path, e))
    }

    // -- Existence and metadata ----------------------------------------------

    pub async fn file_exists(&self, path: &str) -> Result<bool, FsError> {
        instrumented("file_exists", async {
            let path = normalize_path(path)?;
            match self.file_metadata(&path).await {
                Ok(_) => Ok(true),
                Err(FsError::FileDoesNotExist { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await
    }

    pub async fn directory_exists(&self, path: &str) -> Result<bool, FsError> {
        instrumented("directory_exists", async {
            let path = normalize_path(path)?;
            match self.directory_metadata(&path).await {
                Ok(_) => Ok(true),
                Err(FsError::DirectoryDoesNotExist { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Whether `path` is a file or a directory.
    pub async fn has(&self, path: &str) -> Result<bool, FsError> {
        if self.file_exists(path).await? {
            return Ok(true);
        }
        self.directory_exists(path).await
    }

    pub async fn last_modified(&self, path: &str) -> Result<FileAttributes, FsError> {
        self.file_attributes("last_modified", path).await
    }

    pub async fn mime_type(&self, path: &str) -> Result<FileAttributes, FsError> {
        self.file_attributes("mime_type", path).await
    }

    pub async fn file_size(&self, path: &str) -> Result<FileAttributes, FsError> {
        self.file_attributes("file_size", path).await
    }

    /// Always reports [`Visibility::Private`].
    pub async fn visibility(&self, path: &str) -> Result<FileAttributes, FsError> {
        self.file_attributes("visibility", path).await
    }

    /// Accepted and ignored: shares have no per-file visibility.
    pub async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<(), FsError> {
        let path = normalize_path(path)?;
        debug!(
            "Ignoring set_visibility({}) on {}: not supported",
            visibility.as_str(),
            path
        );
        Ok(())
    }

    /// File attributes, falling back to directory attributes when there
    /// is no file at `path`.
    pub async fn metadata(&self, path: &str) -> Result<StorageAttributes, FsError> {
        instrumented("metadata", async {
            let path = normalize_path(path)?;
            match self.file_metadata(&path).await {
                Ok(attrs) => Ok(attrs.into()),
                Err(FsError::FileDoesNotExist { .. }) => {
                    Ok(self.directory_metadata(&path).await?.into())
                }
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn file_attributes(
        &self,
        operation: &'static str,
        path: &str,
    ) -> Result<FileAttributes, FsError> {
        instrumented(operation, async {
            let path = normalize_path(path)?;
            self.file_metadata(&path).await
        })
        .await
    }

    /// `path` is normalized and unprefixed.
    pub(crate) async fn file_metadata(&self, path: &str) -> Result<FileAttributes, FsError> {
        let props = self
            .client
            .get_file_properties(&self.prefixer.prefix_path(path))
            .await
            .map_err(|e| FsError::file_metadata(path, e))?;
        Ok(normalize_file_properties(path, props))
    }

    /// `path` is normalized and unprefixed.
    pub(crate) async fn directory_metadata(
        &self,
        path: &str,
    ) -> Result<DirectoryAttributes, FsError> {
        let props = self
            .client
            .get_directory_properties(&self.prefixer.prefix_directory_path(path))
            .await
            .map_err(|e| FsError::directory_metadata(path, e))?;
        Ok(normalize_directory_properties(path, props))
    }

    // -- Copy, move, delete --------------------------------------------------

    /// Server-side copy.  The destination directory must exist.
    pub async fn copy(&self, source: &str, destination: &str) -> Result<(), FsError> {
        instrumented("copy", async {
            let source = normalize_path(source)?;
            let destination = normalize_path(destination)?;
            self.copy_normalized(&source, &destination).await
        })
        .await
    }

    async fn copy_normalized(&self, source: &str, destination: &str) -> Result<(), FsError> {
        let source_url = self.url_for(source);
        debug!("Copying {} to {}", source_url, destination);
        self.client
            .copy_file(&self.prefixer.prefix_path(destination), &source_url)
            .await
            .map_err(|cause| FsError::UnableToCopyFile {
                from: source.to_string(),
                to: destination.to_string(),
                cause,
            })
    }

    /// Wait until the service reports the copy into `destination` as
    /// finished.  A copy answered as `pending` keeps reading the source, so
    /// the source must stay until then.
    async fn wait_for_copy(&self, source: &str, destination: &str) -> Result<(), FsError> {
        let remote = self.prefixer.prefix_path(destination);
        let failed = |cause| FsError::UnableToCopyFile {
            from: source.to_string(),
            to: destination.to_string(),
            cause,
        };

        for _ in 0..COPY_POLL_LIMIT {
            let props = self
                .client
                .get_file_properties(&remote)
                .await
                .map_err(failed)?;
            match props.copy_status.as_deref() {
                None | Some("success") => return Ok(()),
                Some("pending") => {
                    debug!("Copy into {} still pending", remote);
                    tokio::time::sleep(COPY_POLL_INTERVAL).await;
                }
                Some(status) => {
                    return Err(failed(RemoteError::invalid(
                        "copy_file",
                        format!(
                            "copy ended with status {}: {}",
                            status,
                            props.copy_status_description.unwrap_or_default()
                        ),
                    )));
                }
            }
        }
        Err(failed(RemoteError::invalid(
            "copy_file",
            "copy still pending after polling limit",
        )))
    }

    /// Copy, wait for the copy to finish, then delete the source.  The
    /// source is left alone if the copy fails or never completes.
    pub async fn move_file(&self, source: &str, destination: &str) -> Result<(), FsError> {
        instrumented("move", async {
            let source = normalize_path(source)?;
            let destination = normalize_path(destination)?;
            self.copy_normalized(&source, &destination).await?;
            self.wait_for_copy(&source, &destination).await?;
            self.delete_file_at(&source).await
        })
        .await
    }

    /// Delete a file.  Deleting a missing file succeeds.
    pub async fn delete(&self, path: &str) -> Result<(), FsError> {
        instrumented("delete", async {
            let path = normalize_path(path)?;
            self.delete_file_at(&path).await
        })
        .await
    }

    /// `path` is normalized and unprefixed.
    pub(crate) async fn delete_file_at(&self, path: &str) -> Result<(), FsError> {
        match self.client.delete_file(&self.prefixer.prefix_path(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("Delete of missing file {} treated as success", path);
                Ok(())
            }
            Err(cause) => Err(FsError::UnableToDeleteFile {
                location: path.to_string(),
                cause,
            }),
        }
    }

    // -- URLs ----------------------------------------------------------------

    /// Absolute URL of `path`: `{primary uri}{share}/{encoded segments}`.
    pub fn get_url(&self, path: &str) -> Result<String, FsError> {
        let path = normalize_path(path)?;
        Ok(self.url_for(&path))
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}{}/{}",
            self.client.primary_uri(),
            self.share,
            encode_path_segments(&self.prefixer.prefix_path(path))
        )
    }
}
