//! The filesystem error taxonomy surfaced to the FUSE layer.

use thiserror::Error;

/// Errors produced by the metadata store, the prefetch engine, and the
/// dispatcher itself. Every variant has a fixed errno so kernel callers
/// observe POSIX semantics.
#[derive(Debug, Error, Clone)]
pub enum FsError {
    /// Lookup, unlink, or rmdir of an absent entry.
    #[error("not found: {0}")]
    NotFound(String),

    /// Create or mkdir of a present entry.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Mutating operation against a read-only project, or opening a
    /// non-file data object for I/O.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// rmdir of a directory that still has children.
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// Creating a child would push the directory past `MAX_DIR_SIZE`.
    #[error("directory too large: {0}")]
    DirectoryTooLarge(String),

    /// Unrecoverable remote failure, upload failure, exhausted retries.
    #[error("I/O error: {0}")]
    Io(String),

    /// Non-POSIX name, unsupported write offset, malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl FsError {
    /// The errno reported to the kernel for this error.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::PermissionDenied(_) => libc::EPERM,
            FsError::NotEmpty(_) => libc::ENOTEMPTY,
            FsError::DirectoryTooLarge(_) => libc::EFBIG,
            FsError::Io(_) => libc::EIO,
            FsError::InvalidArgument(_) => libc::EINVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(FsError::NotFound("x".into()).errno(), libc::ENOENT);
        assert_eq!(FsError::AlreadyExists("x".into()).errno(), libc::EEXIST);
        assert_eq!(FsError::PermissionDenied("x".into()).errno(), libc::EPERM);
        assert_eq!(FsError::NotEmpty("x".into()).errno(), libc::ENOTEMPTY);
        assert_eq!(FsError::DirectoryTooLarge("x".into()).errno(), libc::EFBIG);
        assert_eq!(FsError::Io("x".into()).errno(), libc::EIO);
        assert_eq!(FsError::InvalidArgument("x".into()).errno(), libc::EINVAL);
    }
}
