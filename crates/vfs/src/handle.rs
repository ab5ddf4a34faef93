//! Open file handles.
//!
//! Reads go through the prefetch engine. A file opened for write is
//! staged to a local temp file bound to its handle; the staged bytes are
//! uploaded when the last close releases the handle.

use std::os::unix::fs::FileExt;
use std::path::Path;

use tempfile::NamedTempFile;

use skymount_common::FsError;

/// State attached to one kernel file handle.
pub enum OpenHandle {
    /// Read-only handle served by the prefetch engine.
    Read { inode: u64 },
    /// Write handle staging into a local temp file.
    Write(Box<WriteHandle>),
}

/// A staged write in progress.
///
/// The staging file is a named temp file that disappears when the
/// handle is dropped, whether or not the upload happened.
pub struct WriteHandle {
    pub inode: u64,
    pub proj_id: String,
    /// Project folder the upload lands in.
    pub remote_folder: String,
    pub name: String,
    staging: NamedTempFile,
    size: u64,
}

impl WriteHandle {
    /// Create an empty staging file for a new or truncated file.
    pub fn create(
        inode: u64,
        proj_id: String,
        remote_folder: String,
        name: String,
        staging_dir: &Path,
    ) -> Result<Self, FsError> {
        let staging: NamedTempFile = tempfile::Builder::new()
            .prefix("stage-")
            .tempfile_in(staging_dir)
            .map_err(|e| FsError::Io(format!("staging file: {}", e)))?;
        Ok(Self {
            inode,
            proj_id,
            remote_folder,
            name,
            staging,
            size: 0,
        })
    }

    /// Create a staging file pre-filled with the file's current content,
    /// for a write-open without truncation.
    pub fn with_contents(
        inode: u64,
        proj_id: String,
        remote_folder: String,
        name: String,
        staging_dir: &Path,
        contents: &[u8],
    ) -> Result<Self, FsError> {
        let mut handle: WriteHandle =
            Self::create(inode, proj_id, remote_folder, name, staging_dir)?;
        handle.write_at(0, contents)?;
        Ok(handle)
    }

    /// Write at an offset within the staged bytes.
    ///
    /// Appends and overwrites are fine; writes that would leave a hole
    /// past the current end are not supported.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<u32, FsError> {
        if offset > self.size {
            return Err(FsError::InvalidArgument(format!(
                "write at {} beyond staged size {}",
                offset, self.size
            )));
        }
        self.staging
            .as_file()
            .write_all_at(data, offset)
            .map_err(|e| FsError::Io(format!("staging write: {}", e)))?;
        self.size = self.size.max(offset + data.len() as u64);
        Ok(data.len() as u32)
    }

    /// Read back staged bytes; short at EOF, empty past it.
    pub fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, FsError> {
        if offset >= self.size {
            return Ok(Vec::new());
        }
        let len: usize = len.min(self.size - offset) as usize;
        let mut buf: Vec<u8> = vec![0; len];
        self.staging
            .as_file()
            .read_exact_at(&mut buf, offset)
            .map_err(|e| FsError::Io(format!("staging read: {}", e)))?;
        Ok(buf)
    }

    pub fn truncate(&mut self, new_size: u64) -> Result<(), FsError> {
        self.staging
            .as_file()
            .set_len(new_size)
            .map_err(|e| FsError::Io(format!("staging truncate: {}", e)))?;
        self.size = new_size;
        Ok(())
    }

    pub fn sync(&self) -> Result<(), FsError> {
        self.staging
            .as_file()
            .sync_all()
            .map_err(|e| FsError::Io(format!("staging sync: {}", e)))
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        self.staging.path()
    }
}
