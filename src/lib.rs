//! azurefs: a filesystem adapter for Azure File Storage shares.
//!
//! [`AzureFileAdapter`] maps generic filesystem operations (write, read,
//! delete, list, copy/move, metadata, directories) onto the Azure File
//! REST API.  It emulates recursive directory semantics on top of the
//! single-level remote calls and can scope itself under a path prefix.
//! The remote side is the [`client::FileShareClient`] trait, with an Azure
//! REST implementation and an in-memory share.

pub mod adapter;
pub mod attributes;
pub mod client;
pub mod config;
mod directory;
pub mod errors;
pub mod metrics;
pub mod options;
pub mod path;

pub use adapter::AzureFileAdapter;
pub use attributes::{DirectoryAttributes, FileAttributes, StorageAttributes, Visibility};
pub use client::azure::{AzureAuth, AzureFileClient};
pub use client::memory::MemoryShareClient;
pub use client::{FileShareClient, RemoteError};
pub use errors::{FsError, Operation};
pub use options::WriteConfig;
