//! Error types for mount setup.

use thiserror::Error;

use skymount_client::ClientError;
use skymount_common::FsError;
use skymount_model::ManifestError;

/// Errors that can occur while building or mounting the filesystem.
/// All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum MountError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("metadata setup failed: {0}")]
    Metadata(#[from] FsError),

    #[error("platform access failed: {0}")]
    Client(#[from] ClientError),

    /// The filesystem must be constructed inside a tokio runtime.
    #[error("no async runtime: {0}")]
    NoRuntime(String),

    #[error("mount failed: {0}")]
    Fuse(#[from] std::io::Error),
}
