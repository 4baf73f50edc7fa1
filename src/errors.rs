//! Filesystem adapter error types.
//!
//! Every variant mirrors a failure kind of the abstract filesystem
//! contract and carries the caller-facing (unprefixed) location.  Remote
//! failures are kept as the `#[source]` so callers can inspect the HTTP
//! status without matching on messages.

use thiserror::Error;

use crate::client::RemoteError;

/// The operation a [`FsError`] was raised by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Write,
    Read,
    Delete,
    DeleteDirectory,
    CreateDirectory,
    Copy,
    Move,
    FileExists,
    DirectoryExists,
    RetrieveMetadata,
    NormalizePath,
}

impl Operation {
    /// Stable lowercase name, used for logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Write => "write",
            Operation::Read => "read",
            Operation::Delete => "delete",
            Operation::DeleteDirectory => "delete_directory",
            Operation::CreateDirectory => "create_directory",
            Operation::Copy => "copy",
            Operation::Move => "move",
            Operation::FileExists => "file_exists",
            Operation::DirectoryExists => "directory_exists",
            Operation::RetrieveMetadata => "retrieve_metadata",
            Operation::NormalizePath => "normalize_path",
        }
    }
}

/// Adapter level failures.
#[derive(Debug, Error)]
pub enum FsError {
    /// The file is absent (remote 404 on a file properties fetch).
    #[error("File does not exist at location: {location}.")]
    FileDoesNotExist {
        location: String,
        #[source]
        cause: Option<RemoteError>,
    },

    /// The directory is absent (remote 404 on a directory fetch or listing).
    #[error("Directory does not exist at location: {location}.")]
    DirectoryDoesNotExist {
        location: String,
        #[source]
        cause: Option<RemoteError>,
    },

    #[error("Unable to read file from location: {location}. {reason}")]
    UnableToReadFile {
        location: String,
        reason: String,
        #[source]
        cause: Option<RemoteError>,
    },

    #[error("Unable to write file at location: {location}. {reason}")]
    UnableToWriteFile {
        location: String,
        reason: String,
        #[source]
        cause: Option<RemoteError>,
    },

    #[error("Unable to copy file from {from} to {to}")]
    UnableToCopyFile {
        from: String,
        to: String,
        #[source]
        cause: RemoteError,
    },

    #[error("Unable to delete file located at: {location}")]
    UnableToDeleteFile {
        location: String,
        #[source]
        cause: RemoteError,
    },

    #[error("Unable to delete directory located at: {location}")]
    UnableToDeleteDirectory {
        location: String,
        #[source]
        cause: RemoteError,
    },

    #[error("Unable to create a directory at {location}")]
    UnableToCreateDirectory {
        location: String,
        #[source]
        cause: RemoteError,
    },

    #[error("Unable to check existence for file: {location}")]
    UnableToCheckFileExistence {
        location: String,
        #[source]
        cause: RemoteError,
    },

    #[error("Unable to check existence for directory: {location}")]
    UnableToCheckDirectoryExistence {
        location: String,
        #[source]
        cause: RemoteError,
    },

    #[error("Unable to list contents of directory: {location}")]
    UnableToListContents {
        location: String,
        #[source]
        cause: RemoteError,
    },

    #[error("Path traversal detected: {path}")]
    PathTraversalDetected { path: String },

    #[error("Corrupted path detected: {path}")]
    CorruptedPathDetected { path: String },
}

impl FsError {
    /// The operation that failed.
    pub fn operation(&self) -> Operation {
        match self {
            FsError::FileDoesNotExist { .. } => Operation::FileExists,
            FsError::DirectoryDoesNotExist { .. } => Operation::DirectoryExists,
            FsError::UnableToReadFile { .. } => Operation::Read,
            FsError::UnableToWriteFile { .. } => Operation::Write,
            FsError::UnableToCopyFile { .. } => Operation::Copy,
            FsError::UnableToDeleteFile { .. } => Operation::Delete,
            FsError::UnableToDeleteDirectory { .. } => Operation::DeleteDirectory,
            FsError::UnableToCreateDirectory { .. } => Operation::CreateDirectory,
            FsError::UnableToCheckFileExistence { .. } => Operation::FileExists,
            FsError::UnableToCheckDirectoryExistence { .. } => Operation::DirectoryExists,
            FsError::UnableToListContents { .. } => Operation::RetrieveMetadata,
            FsError::PathTraversalDetected { .. } | FsError::CorruptedPathDetected { .. } => {
                Operation::NormalizePath
            }
        }
    }

    /// The caller-facing path the error refers to.  For copies this is the
    /// source path.
    pub fn location(&self) -> &str {
        match self {
            FsError::FileDoesNotExist { location, .. }
            | FsError::DirectoryDoesNotExist { location, .. }
            | FsError::UnableToReadFile { location, .. }
            | FsError::UnableToWriteFile { location, .. }
            | FsError::UnableToDeleteFile { location, .. }
            | FsError::UnableToDeleteDirectory { location, .. }
            | FsError::UnableToCreateDirectory { location, .. }
            | FsError::UnableToCheckFileExistence { location, .. }
            | FsError::UnableToCheckDirectoryExistence { location, .. }
            | FsError::UnableToListContents { location, .. } => location,
            FsError::UnableToCopyFile { from, .. } => from,
            FsError::PathTraversalDetected { path } | FsError::CorruptedPathDetected { path } => {
                path
            }
        }
    }

    /// The remote failure behind this error, if there is one.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            FsError::FileDoesNotExist { cause, .. }
            | FsError::DirectoryDoesNotExist { cause, .. }
            | FsError::UnableToReadFile { cause, .. }
            | FsError::UnableToWriteFile { cause, .. } => cause.as_ref(),
            FsError::UnableToCopyFile { cause, .. }
            | FsError::UnableToDeleteFile { cause, .. }
            | FsError::UnableToDeleteDirectory { cause, .. }
            | FsError::UnableToCreateDirectory { cause, .. }
            | FsError::UnableToCheckFileExistence { cause, .. }
            | FsError::UnableToCheckDirectoryExistence { cause, .. }
            | FsError::UnableToListContents { cause, .. } => Some(cause),
            FsError::PathTraversalDetected { .. } | FsError::CorruptedPathDetected { .. } => None,
        }
    }

    /// Whether this error means "the thing is not there".
    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::FileDoesNotExist { .. } | FsError::DirectoryDoesNotExist { .. } => true,
            other => other.remote().is_some_and(RemoteError::is_not_found),
        }
    }

    // -- Mapping from remote failures ---------------------------------------

    /// A file properties fetch failed.
    pub(crate) fn file_metadata(location: &str, err: RemoteError) -> Self {
        if err.is_not_found() {
            FsError::FileDoesNotExist {
                location: location.to_string(),
                cause: Some(err),
            }
        } else {
            FsError::UnableToCheckFileExistence {
                location: location.to_string(),
                cause: err,
            }
        }
    }

    /// A directory properties fetch failed.
    pub(crate) fn directory_metadata(location: &str, err: RemoteError) -> Self {
        if err.is_not_found() {
            FsError::DirectoryDoesNotExist {
                location: location.to_string(),
                cause: Some(err),
            }
        } else {
            FsError::UnableToCheckDirectoryExistence {
                location: location.to_string(),
                cause: err,
            }
        }
    }

    /// A directory listing failed.
    pub(crate) fn listing(location: &str, err: RemoteError) -> Self {
        if err.is_not_found() {
            FsError::DirectoryDoesNotExist {
                location: location.to_string(),
                cause: Some(err),
            }
        } else {
            FsError::UnableToListContents {
                location: location.to_string(),
                cause: err,
            }
        }
    }

    /// A content download failed.
    pub(crate) fn read(location: &str, err: RemoteError) -> Self {
        let reason = if err.is_not_found() {
            "File not found".to_string()
        } else {
            err.to_string()
        };
        FsError::UnableToReadFile {
            location: location.to_string(),
            reason,
            cause: Some(err),
        }
    }

    /// A content upload failed.
    pub(crate) fn write(location: &str, err: RemoteError) -> Self {
        FsError::UnableToWriteFile {
            location: location.to_string(),
            reason: err.to_string(),
            cause: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn not_found() -> RemoteError {
        RemoteError::service("get_file_properties", StatusCode::NOT_FOUND, "ResourceNotFound", "")
    }

    fn forbidden() -> RemoteError {
        RemoteError::service(
            "get_file_properties",
            StatusCode::FORBIDDEN,
            "AuthenticationFailed",
            "Server failed to authenticate the request.",
        )
    }

    #[test]
    fn test_file_metadata_404_is_does_not_exist() {
        let err = FsError::file_metadata("a.txt", not_found());
        assert!(matches!(err, FsError::FileDoesNotExist { .. }));
        assert!(err.is_not_found());
        assert_eq!(err.location(), "a.txt");
        assert_eq!(err.to_string(), "File does not exist at location: a.txt.");
    }

    #[test]
    fn test_file_metadata_other_is_fatal() {
        let err = FsError::file_metadata("a.txt", forbidden());
        assert!(matches!(err, FsError::UnableToCheckFileExistence { .. }));
        assert!(!err.is_not_found());
        assert_eq!(err.operation(), Operation::FileExists);
    }

    #[test]
    fn test_directory_metadata_mapping() {
        assert!(matches!(
            FsError::directory_metadata("d", not_found()),
            FsError::DirectoryDoesNotExist { .. }
        ));
        assert!(matches!(
            FsError::directory_metadata("d", forbidden()),
            FsError::UnableToCheckDirectoryExistence { .. }
        ));
    }

    #[test]
    fn test_read_not_found_keeps_status() {
        let err = FsError::read("missing.txt", not_found());
        assert!(matches!(err, FsError::UnableToReadFile { ref reason, .. } if reason == "File not found"));
        assert!(err.is_not_found());
        assert_eq!(err.operation(), Operation::Read);
    }

    #[test]
    fn test_copy_error_exposes_source() {
        let err = FsError::UnableToCopyFile {
            from: "a.txt".to_string(),
            to: "missing/b.txt".to_string(),
            cause: not_found(),
        };
        assert_eq!(err.location(), "a.txt");
        assert_eq!(err.operation(), Operation::Copy);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::DeleteDirectory.as_str(), "delete_directory");
        assert_eq!(Operation::Move.as_str(), "move");
    }
}
