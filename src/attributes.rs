//! Generic storage attribute records.
//!
//! Remote property records are converted into [`FileAttributes`] and
//! [`DirectoryAttributes`] here.  Records are built fresh from a remote
//! fetch on every call and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::client::{DirectoryProperties, FileProperties};

/// Visibility of a stored item.  Azure File shares have no per-item ACL,
/// so everything reports as private.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(format!("unknown visibility: {}", other)),
        }
    }
}

/// Azure specific extras attached to a file record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileExtraMetadata {
    /// ETag without surrounding quotes.
    pub e_tag: String,
    #[serde(rename = "contentMD5")]
    pub content_md5: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    #[serde(rename = "copyID")]
    pub copy_id: Option<String>,
    pub copy_progress: Option<String>,
    pub copy_source: Option<String>,
    pub copy_status: Option<String>,
    pub copy_completion_time: Option<String>,
    pub copy_status_description: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_range: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Attributes of a file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttributes {
    /// Prefix-relative path.
    pub path: String,
    pub file_size: u64,
    pub visibility: Visibility,
    /// Unix seconds.
    pub last_modified: i64,
    pub mime_type: Option<String>,
    pub extra_metadata: FileExtraMetadata,
}

/// Azure specific extras attached to a directory record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryExtraMetadata {
    pub last_modified: DateTime<Utc>,
    pub e_tag: String,
}

/// Attributes of a directory.  Directories have no size.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryAttributes {
    /// Prefix-relative path.
    pub path: String,
    pub visibility: Visibility,
    /// Unix seconds.
    pub last_modified: i64,
    pub extra_metadata: DirectoryExtraMetadata,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum StorageAttributes {
    #[serde(rename = "file")]
    File(FileAttributes),
    #[serde(rename = "dir")]
    Directory(DirectoryAttributes),
}

impl StorageAttributes {
    pub fn path(&self) -> &str {
        match self {
            StorageAttributes::File(f) => &f.path,
            StorageAttributes::Directory(d) => &d.path,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, StorageAttributes::File(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, StorageAttributes::Directory(_))
    }

    pub fn last_modified(&self) -> i64 {
        match self {
            StorageAttributes::File(f) => f.last_modified,
            StorageAttributes::Directory(d) => d.last_modified,
        }
    }
}

impl From<FileAttributes> for StorageAttributes {
    fn from(attrs: FileAttributes) -> Self {
        StorageAttributes::File(attrs)
    }
}

impl From<DirectoryAttributes> for StorageAttributes {
    fn from(attrs: DirectoryAttributes) -> Self {
        StorageAttributes::Directory(attrs)
    }
}

fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// Build a file record.  `path` must already be prefix-relative.
pub fn normalize_file_properties(path: &str, props: FileProperties) -> FileAttributes {
    FileAttributes {
        path: path.to_string(),
        file_size: props.content_length,
        visibility: Visibility::Private,
        last_modified: props.last_modified.timestamp(),
        mime_type: props.content_type,
        extra_metadata: FileExtraMetadata {
            e_tag: trim_etag(&props.etag),
            content_md5: props.content_md5,
            last_modified: props.last_modified,
            content_encoding: props.content_encoding,
            content_language: props.content_language,
            copy_id: props.copy_id,
            copy_progress: props.copy_progress,
            copy_source: props.copy_source,
            copy_status: props.copy_status,
            copy_completion_time: props.copy_completion_time,
            copy_status_description: props.copy_status_description,
            cache_control: props.cache_control,
            content_disposition: props.content_disposition,
            content_range: props.content_range,
            metadata: props.metadata,
        },
    }
}

/// Build a directory record.  `path` must already be prefix-relative.
pub fn normalize_directory_properties(path: &str, props: DirectoryProperties) -> DirectoryAttributes {
    DirectoryAttributes {
        path: path.to_string(),
        visibility: Visibility::Private,
        last_modified: props.last_modified.timestamp(),
        extra_metadata: DirectoryExtraMetadata {
            last_modified: props.last_modified,
            e_tag: trim_etag(&props.etag),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn file_props() -> FileProperties {
        FileProperties {
            content_length: 7,
            last_modified: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            etag: "\"0x8DC39A1\"".to_string(),
            content_type: Some("text/plain".to_string()),
            content_md5: Some("mgNkuembtIDdJeHwKEyFVQ==".to_string()),
            content_encoding: None,
            content_language: Some("en".to_string()),
            cache_control: Some("no-cache".to_string()),
            content_disposition: None,
            content_range: None,
            copy_id: None,
            copy_progress: None,
            copy_source: None,
            copy_status: None,
            copy_completion_time: None,
            copy_status_description: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_normalize_file_properties() {
        let attrs = normalize_file_properties("dir/a.txt", file_props());
        assert_eq!(attrs.path, "dir/a.txt");
        assert_eq!(attrs.file_size, 7);
        assert_eq!(attrs.visibility, Visibility::Private);
        assert_eq!(attrs.last_modified, 1_709_294_400);
        assert_eq!(attrs.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(attrs.extra_metadata.e_tag, "0x8DC39A1");
        assert_eq!(attrs.extra_metadata.cache_control.as_deref(), Some("no-cache"));
    }

    #[test]
    fn test_normalize_directory_properties() {
        let props = DirectoryProperties {
            last_modified: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            etag: "\"0x1\"".to_string(),
            metadata: BTreeMap::new(),
        };
        let attrs = normalize_directory_properties("dir", props);
        assert_eq!(attrs.path, "dir");
        assert_eq!(attrs.last_modified, 1_709_294_400);
        assert_eq!(attrs.extra_metadata.e_tag, "0x1");
    }

    #[test]
    fn test_storage_attributes_serialize_with_type_tag() {
        let entry: StorageAttributes = normalize_file_properties("a.txt", file_props()).into();
        assert!(entry.is_file());
        assert_eq!(entry.path(), "a.txt");

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["fileSize"], 7);
        assert_eq!(json["visibility"], "private");
        assert_eq!(json["extraMetadata"]["eTag"], "0x8DC39A1");
        assert_eq!(json["extraMetadata"]["contentMD5"], "mgNkuembtIDdJeHwKEyFVQ==");
    }

    #[test]
    fn test_visibility_from_str() {
        assert_eq!("public".parse::<Visibility>().unwrap(), Visibility::Public);
        assert_eq!(Visibility::default().as_str(), "private");
        assert!("world".parse::<Visibility>().is_err());
    }
}
