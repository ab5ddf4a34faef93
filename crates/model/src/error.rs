//! Error types for manifest loading.

use thiserror::Error;

/// Errors raised while parsing, validating, or expanding a manifest.
/// All of them are fatal at mount setup.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// An id or path in the input failed validation.
    #[error("invalid manifest: {0}")]
    Invalid(String),

    /// The same mount path appears in two directory entries.
    #[error("directory {0} is mounted twice")]
    DuplicateMount(String),

    /// A mount path is an ancestor of another mount, so it cannot be a
    /// leaf of the directory scaffolding.
    #[error("{0} is not a leaf of the directory scaffolding")]
    MountNotLeaf(String),

    /// A mount path that can never be attached, such as `/`.
    #[error("{0} is not a usable mount path")]
    InvalidMountPath(String),

    #[error("manifest I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A describe call made while filling missing fields failed.
    #[error(transparent)]
    Client(#[from] skymount_client::ClientError),
}
