//! Directory emulation on top of single-level remote calls.
//!
//! The remote store only creates, lists and deletes one directory at a
//! time.  This module builds recursive creation (including the prefix's own
//! chain), root-first recursive listing and depth-first recursive deletion
//! on top of those calls.

use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

use crate::adapter::{instrumented, AzureFileAdapter};
use crate::attributes::{normalize_directory_properties, normalize_file_properties, StorageAttributes};
use crate::errors::FsError;
use crate::path::{cumulative_segments, join_path, normalize_path};

type ContentsFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<StorageAttributes>, FsError>> + Send + 'a>>;

type EntriesFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Entry>, FsError>> + Send + 'a>>;

/// A descendant found by the delete walk.  Unprefixed path.
enum Entry {
    File(String),
    Directory(String),
}

impl AzureFileAdapter {
    /// Create `path` and any missing ancestors.  Creating an existing
    /// directory succeeds.
    pub async fn create_directory(&self, path: &str) -> Result<(), FsError> {
        instrumented("create_directory", async {
            let path = normalize_path(path)?;
            self.ensure_directory(&path).await
        })
        .await
    }

    /// `path` is normalized and unprefixed.
    pub(crate) async fn ensure_directory(&self, path: &str) -> Result<(), FsError> {
        // The prefix chain is addressed without going through the prefixer.
        if self.prefixer.is_scoped()
            && !self
                .remote_directory_exists(self.prefixer.prefix(), "")
                .await?
        {
            for segment in cumulative_segments(self.prefixer.prefix()) {
                self.create_remote_directory(&segment, &segment).await?;
            }
        }

        for segment in cumulative_segments(path) {
            let remote = self.prefixer.prefix_directory_path(&segment);
            self.create_remote_directory(&remote, &segment).await?;
        }
        Ok(())
    }

    async fn remote_directory_exists(&self, remote: &str, location: &str) -> Result<bool, FsError> {
        match self.client.get_directory_properties(remote).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(cause) => Err(FsError::UnableToCreateDirectory {
                location: location.to_string(),
                cause,
            }),
        }
    }

    /// Create one remote directory unless it is already there.
    async fn create_remote_directory(&self, remote: &str, location: &str) -> Result<(), FsError> {
        if self.remote_directory_exists(remote, location).await? {
            return Ok(());
        }

        debug!("Creating directory {}", remote);
        match self.client.create_directory(remote).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_exists() => {
                // A file holding the name also answers ResourceAlreadyExists.
                if self.remote_directory_exists(remote, location).await? {
                    debug!("Directory {} already exists", remote);
                    Ok(())
                } else {
                    Err(FsError::UnableToCreateDirectory {
                        location: location.to_string(),
                        cause: e,
                    })
                }
            }
            Err(cause) => Err(FsError::UnableToCreateDirectory {
                location: location.to_string(),
                cause,
            }),
        }
    }

    /// List the entries under `path`, directories before files at each
    /// level, each directory followed by its own entries when `recursive`.
    /// A missing directory lists as empty.
    pub async fn list_contents(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<StorageAttributes>, FsError> {
        instrumented("list_contents", async {
            let path = normalize_path(path)?;
            match self.get_contents(&path, recursive).await {
                Err(FsError::DirectoryDoesNotExist { ref location, .. }) if *location == path => {
                    Ok(Vec::new())
                }
                other => other,
            }
        })
        .await
    }

    /// Root-first listing; reverse it for a depth-first order.
    fn get_contents<'a>(&'a self, path: &'a str, recursive: bool) -> ContentsFuture<'a> {
        Box::pin(async move {
            let remote = self.prefixer.prefix_directory_path(path);
            let listing = self
                .client
                .list_directories_and_files(&remote)
                .await
                .map_err(|e| FsError::listing(path, e))?;

            let mut contents = Vec::with_capacity(listing.directories.len() + listing.files.len());

            for name in &listing.directories {
                let child_remote = join_path(&remote, name);
                let child = self.prefixer.strip_prefix(&child_remote);
                let props = self
                    .client
                    .get_directory_properties(&child_remote)
                    .await
                    .map_err(|e| FsError::directory_metadata(&child, e))?;
                contents.push(normalize_directory_properties(&child, props).into());

                if recursive {
                    contents.extend(self.get_contents(&child, true).await?);
                }
            }

            for name in &listing.files {
                let child_remote = join_path(&remote, name);
                let child = self.prefixer.strip_prefix(&child_remote);
                let props = self
                    .client
                    .get_file_properties(&child_remote)
                    .await
                    .map_err(|e| FsError::file_metadata(&child, e))?;
                contents.push(normalize_file_properties(&child, props).into());
            }

            Ok(contents)
        })
    }

    /// Delete `path` and, unless recursive delete is disabled, everything
    /// below it.  Deleting a missing directory succeeds.  On an unscoped
    /// adapter, deleting the root empties the share.
    pub async fn delete_directory(&self, path: &str) -> Result<(), FsError> {
        instrumented("delete_directory", async {
            let path = normalize_path(path)?;

            if !self.disable_recursive_delete {
                let entries = match self.descendants(&path).await {
                    Ok(entries) => entries,
                    Err(e) if e.is_not_found() => {
                        debug!("Directory {} already gone", path);
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                };

                for entry in entries.iter().rev() {
                    match entry {
                        Entry::File(file) => self.delete_file_at(file).await?,
                        Entry::Directory(dir) => {
                            self.delete_empty_directory(dir).await?;
                        }
                    }
                }
            }

            if path.is_empty() && !self.prefixer.is_scoped() {
                return Ok(());
            }
            self.delete_empty_directory(&path).await?;
            Ok(())
        })
        .await
    }

    /// Every descendant of `path`, root-first, from listings alone.  A
    /// sub-directory that disappears while walking is skipped.
    fn descendants<'a>(&'a self, path: &'a str) -> EntriesFuture<'a> {
        Box::pin(async move {
            let remote = self.prefixer.prefix_directory_path(path);
            let listing = self
                .client
                .list_directories_and_files(&remote)
                .await
                .map_err(|e| FsError::listing(path, e))?;

            let mut entries = Vec::with_capacity(listing.directories.len() + listing.files.len());
            for name in &listing.directories {
                let child = self.prefixer.strip_prefix(&join_path(&remote, name));
                match self.descendants(&child).await {
                    Ok(below) => {
                        entries.push(Entry::Directory(child));
                        entries.extend(below);
                    }
                    Err(e) if e.is_not_found() => {
                        debug!("Directory {} vanished during delete", child);
                    }
                    Err(e) => return Err(e),
                }
            }
            for name in &listing.files {
                entries.push(Entry::File(self.prefixer.strip_prefix(&join_path(&remote, name))));
            }
            Ok(entries)
        })
    }

    /// Delete one directory.  `Ok(false)` if it was not there.
    async fn delete_empty_directory(&self, path: &str) -> Result<bool, FsError> {
        let remote = self.prefixer.prefix_directory_path(path);
        match self.client.delete_directory(&remote).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => {
                warn!("Directory {} vanished before it could be deleted", path);
                Ok(false)
            }
            Err(cause) => Err(FsError::UnableToDeleteDirectory {
                location: path.to_string(),
                cause,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::adapter::tests::adapter;
    use crate::client::FileShareClient;
    use crate::errors::FsError;
    use crate::options::WriteConfig;
    use http::StatusCode;

    async fn deletes(client: &crate::client::memory::MemoryShareClient) -> Vec<String> {
        client
            .calls()
            .await
            .into_iter()
            .filter(|c| c.starts_with("delete_"))
            .collect()
    }

    #[tokio::test]
    async fn test_create_directory_nested() {
        let (client, fs) = adapter("");
        fs.create_directory("a/b/c").await.unwrap();
        assert_eq!(client.paths().await, vec!["a", "a/b", "a/b/c"]);
    }

    #[tokio::test]
    async fn test_create_directory_is_idempotent() {
        let (client, fs) = adapter("");
        fs.create_directory("a/b").await.unwrap();
        fs.create_directory("a/b").await.unwrap();
        fs.create_directory("a").await.unwrap();
        assert_eq!(client.paths().await, vec!["a", "a/b"]);
    }

    #[tokio::test]
    async fn test_create_directory_tolerates_race() {
        let (client, fs) = adapter("");
        client.create_directory("a").await.unwrap();
        client
            .fail_once_on("get_directory_properties", "a", StatusCode::NOT_FOUND)
            .await;
        fs.create_directory("a").await.unwrap();
        assert!(fs.directory_exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_directory_over_file_fails() {
        let (_, fs) = adapter("");
        fs.write("a", "x", &WriteConfig::new()).await.unwrap();

        let err = fs.create_directory("a").await.unwrap_err();
        assert!(matches!(err, FsError::UnableToCreateDirectory { .. }));
        assert_eq!(err.location(), "a");
        assert!(!fs.directory_exists("a").await.unwrap());

        let err = fs.write("a/b.txt", "y", &WriteConfig::new()).await.unwrap_err();
        assert!(matches!(err, FsError::UnableToWriteFile { .. }));
    }

    #[tokio::test]
    async fn test_create_root_with_prefix() {
        let (client, fs) = adapter("/x/y/");
        fs.create_directory("").await.unwrap();
        fs.create_directory(".").await.unwrap();
        assert_eq!(client.paths().await, vec!["x", "x/y"]);
    }

    #[tokio::test]
    async fn test_create_directory_failure() {
        let (client, fs) = adapter("");
        client
            .fail_on("create_directory", "a", StatusCode::FORBIDDEN)
            .await;
        let err = fs.create_directory("a/b").await.unwrap_err();
        assert!(matches!(err, FsError::UnableToCreateDirectory { .. }));
        assert_eq!(err.location(), "a");
    }

    #[tokio::test]
    async fn test_list_contents_root_first() {
        let (_, fs) = adapter("");
        let config = WriteConfig::new();
        fs.write("a/b/file1", "1", &config).await.unwrap();
        fs.write("a/file2", "2", &config).await.unwrap();
        fs.write("top.txt", "t", &config).await.unwrap();

        let flat: Vec<_> = fs.list_contents("", false).await.unwrap();
        let paths: Vec<_> = flat.iter().map(|e| e.path().to_string()).collect();
        assert_eq!(paths, vec!["a", "top.txt"]);

        let deep = fs.list_contents("", true).await.unwrap();
        let paths: Vec<_> = deep.iter().map(|e| e.path().to_string()).collect();
        assert_eq!(paths, vec!["a", "a/b", "a/b/file1", "a/file2", "top.txt"]);
        assert!(deep[0].is_dir());
        assert!(deep[2].is_file());
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_empty() {
        let (_, fs) = adapter("");
        assert!(fs.list_contents("nope", true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_failure_propagates() {
        let (client, fs) = adapter("");
        client
            .fail_on("list_directories_and_files", "", StatusCode::INTERNAL_SERVER_ERROR)
            .await;
        let err = fs.list_contents("", false).await.unwrap_err();
        assert!(matches!(err, FsError::UnableToListContents { .. }));
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_prefix() {
        let (client, fs) = adapter("p1/p2");
        let config = WriteConfig::new();
        fs.write("file.txt", "x", &config).await.unwrap();
        fs.write("sub/inner.txt", "y", &config).await.unwrap();
        client.create_directory("outside").await.unwrap();

        let paths: Vec<_> = fs
            .list_contents("", true)
            .await
            .unwrap()
            .iter()
            .map(|e| e.path().to_string())
            .collect();
        assert_eq!(paths, vec!["sub", "sub/inner.txt", "file.txt"]);
    }

    #[tokio::test]
    async fn test_delete_directory_depth_first() {
        let (client, fs) = adapter("");
        let config = WriteConfig::new();
        fs.write("a/b/file1", "1", &config).await.unwrap();
        fs.write("a/file2", "2", &config).await.unwrap();
        client.clear_calls().await;

        fs.delete_directory("a").await.unwrap();
        assert_eq!(
            deletes(&client).await,
            vec![
                "delete_file:a/file2",
                "delete_file:a/b/file1",
                "delete_directory:a/b",
                "delete_directory:a",
            ]
        );
        assert!(client.paths().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_directory_succeeds() {
        let (_, fs) = adapter("");
        fs.delete_directory("nope").await.unwrap();
        fs.delete_directory("nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_root_without_prefix_keeps_share() {
        let (client, fs) = adapter("");
        fs.write("a/f", "x", &WriteConfig::new()).await.unwrap();
        fs.write("g", "y", &WriteConfig::new()).await.unwrap();
        fs.delete_directory("").await.unwrap();
        assert!(client.paths().await.is_empty());
        assert!(fs.directory_exists("").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_root_with_prefix_removes_prefix_dir() {
        let (client, fs) = adapter("p1/p2");
        fs.write("f", "x", &WriteConfig::new()).await.unwrap();
        fs.delete_directory("").await.unwrap();
        assert_eq!(client.paths().await, vec!["p1"]);
    }

    #[tokio::test]
    async fn test_delete_directory_does_not_fetch_properties() {
        let (client, fs) = adapter("");
        let config = WriteConfig::new();
        fs.write("a/f1", "1", &config).await.unwrap();
        fs.write("a/f2", "2", &config).await.unwrap();
        client
            .fail_on("get_file_properties", "a/f1", StatusCode::NOT_FOUND)
            .await;

        fs.delete_directory("a").await.unwrap();
        assert!(client.paths().await.is_empty());
    }

    #[tokio::test]
    async fn test_recursive_delete_disabled() {
        let (client, fs) = adapter("");
        let fs = fs.with_recursive_delete_disabled(true);
        fs.write("a/f", "x", &WriteConfig::new()).await.unwrap();

        let err = fs.delete_directory("a").await.unwrap_err();
        assert!(matches!(err, FsError::UnableToDeleteDirectory { .. }));
        assert!(fs.file_exists("a/f").await.unwrap());

        fs.delete("a/f").await.unwrap();
        fs.delete_directory("a").await.unwrap();
        assert!(client.paths().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_directory_failure_aborts() {
        let (client, fs) = adapter("");
        let config = WriteConfig::new();
        fs.write("a/b/file1", "1", &config).await.unwrap();
        fs.write("a/file2", "2", &config).await.unwrap();
        client
            .fail_on("delete_file", "a/b/file1", StatusCode::INTERNAL_SERVER_ERROR)
            .await;

        let err = fs.delete_directory("a").await.unwrap_err();
        assert!(matches!(err, FsError::UnableToDeleteFile { .. }));
        assert_eq!(err.location(), "a/b/file1");
        assert!(fs.directory_exists("a/b").await.unwrap());
        assert!(!fs.file_exists("a/file2").await.unwrap());
    }
}
