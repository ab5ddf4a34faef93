//! The platform operations the rest of the system depends on.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::error::ClientError;
use crate::types::{DownloadUrl, FolderListing, ObjectDescribe, ProjectDescribe};

/// Typed wrappers over the platform endpoints.
///
/// Implementations own all HTTP-level retry and backoff; callers see
/// either success or a terminal error. The trait is object-safe so the
/// prefetch engine and the metadata store can be tested against a mock.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Describe a project or container.
    async fn describe_project(&self, project_id: &str) -> Result<ProjectDescribe, ClientError>;

    /// Describe a batch of data objects in one round trip.
    ///
    /// Partial misses are tolerated: objects the platform does not know
    /// are simply absent from the returned map.
    async fn describe_objects(
        &self,
        object_ids: &[String],
    ) -> Result<HashMap<String, ObjectDescribe>, ClientError>;

    /// List the immediate subfolders and files of a project folder.
    async fn list_folder(
        &self,
        project_id: &str,
        folder: &str,
    ) -> Result<FolderListing, ClientError>;

    /// Obtain a short-lived download URL for a file.
    async fn get_download_url(
        &self,
        file_id: &str,
        project_id: &str,
    ) -> Result<DownloadUrl, ClientError>;

    /// Ranged GET against a previously obtained download URL.
    ///
    /// Returns exactly `len` bytes unless the range extends past the end
    /// of the object. Expired URLs surface as a 4xx `ClientError::Http`.
    async fn fetch_url_range(
        &self,
        url: &DownloadUrl,
        start: u64,
        len: u64,
    ) -> Result<Vec<u8>, ClientError>;

    /// Upload a local file into a project folder.
    ///
    /// Returns the new file id once the platform has accepted the bytes.
    /// The object stays in the `open` state until the platform finishes
    /// closing it on its own schedule.
    async fn upload_file(
        &self,
        local_path: &Path,
        project_id: &str,
        remote_folder: &str,
        name: &str,
    ) -> Result<String, ClientError>;
}
