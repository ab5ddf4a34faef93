//! Records returned by the platform describe and listing endpoints.
//!
//! All timestamps are integer milliseconds since the Unix epoch, matching
//! the wire format of the platform API and the manifest file format.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How much the caller is allowed to do inside a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessLevel {
    /// Viewing only; every mutating filesystem operation fails EPERM.
    ReadOnly,
    /// Files may be created, written, renamed, and removed.
    ReadWrite,
}

impl AccessLevel {
    pub fn can_write(&self) -> bool {
        matches!(self, AccessLevel::ReadWrite)
    }
}

/// Lifecycle state of a data object on the platform.
///
/// An uploaded file stays `open` until the platform finishes ingesting it;
/// only `closed` objects are immutable and fully available for download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectState {
    Open,
    Closing,
    Closed,
}

/// Result of describing a single project or container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDescribe {
    pub id: String,
    pub name: String,
    /// Creation time, ms since epoch.
    pub ctime: i64,
    /// Modification time, ms since epoch.
    pub mtime: i64,
    pub access_level: AccessLevel,
}

/// Result of describing a single data object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDescribe {
    pub name: String,
    pub size: u64,
    pub ctime: i64,
    pub mtime: i64,
    pub state: ObjectState,
}

/// One data object in a folder listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderObject {
    pub id: String,
    #[serde(flatten)]
    pub describe: ObjectDescribe,
}

/// Immediate contents of a project folder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderListing {
    /// Full paths of immediate subfolders, e.g. `/data/raw`.
    pub subfolders: Vec<String>,
    pub files: Vec<FolderObject>,
}

/// A short-lived URL for downloading file ranges.
///
/// The platform may expire the URL at any time; holders must be prepared
/// to re-request one when a ranged GET starts failing with a 4xx.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadUrl {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}
