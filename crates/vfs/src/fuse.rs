//! The FUSE operation dispatcher.
//!
//! Maps kernel callbacks onto the metadata store, the prefetch engine,
//! and the platform client. The filesystem owns all mount-wide state
//! (store, engine, client, open handles); handlers reach everything
//! through `self`, never through globals.
//!
//! The `fuser` callbacks are synchronous; async work is bridged with the
//! runtime handle captured at construction. The inner `*_op` methods are
//! the real implementation and are callable without a kernel mount,
//! which is how the integration tests drive them.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use skymount_client::{AccessLevel, DownloadUrl, PlatformClient};
use skymount_common::{FsError, INODE_ROOT};
use skymount_metadb::{ensure_populated, DirRow, FileRow, MetadataStore, Node, NodeKind};

use crate::error::MountError;
use crate::handle::{OpenHandle, WriteHandle};
use crate::options::MountOptions;
use crate::prefetch::PrefetchEngine;

/// The mounted filesystem.
pub struct SkyFilesystem {
    store: Arc<MetadataStore>,
    engine: Arc<PrefetchEngine>,
    client: Arc<dyn PlatformClient>,
    options: MountOptions,
    runtime: Handle,
    /// Open kernel handles by fh.
    handles: Mutex<HashMap<u64, OpenHandle>>,
    next_fh: AtomicU64,
    /// Inodes whose staged upload failed; reads return EIO until unmount.
    poisoned: Mutex<HashSet<u64>>,
    /// Staged writes live here; removed wholesale on clean unmount.
    staging: tempfile::TempDir,
}

impl SkyFilesystem {
    /// Build the filesystem. Must run inside a tokio runtime so the
    /// FUSE callbacks can bridge into it.
    pub fn new(
        store: Arc<MetadataStore>,
        engine: Arc<PrefetchEngine>,
        client: Arc<dyn PlatformClient>,
        options: MountOptions,
    ) -> Result<Self, MountError> {
        let runtime: Handle =
            Handle::try_current().map_err(|e| MountError::NoRuntime(e.to_string()))?;

        let staging_parent: PathBuf = options
            .staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let staging: tempfile::TempDir = tempfile::Builder::new()
            .prefix("skymount-staging-")
            .tempdir_in(staging_parent)
            .map_err(|e| MountError::Metadata(FsError::Io(e.to_string())))?;

        Ok(Self {
            store,
            engine,
            client,
            options,
            runtime,
            handles: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
            poisoned: Mutex::new(HashSet::new()),
            staging,
        })
    }

    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    pub fn engine(&self) -> &Arc<PrefetchEngine> {
        &self.engine
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.options.attr_ttl_secs)
    }

    async fn populate(&self, inode: u64) -> Result<(), FsError> {
        ensure_populated(&self.store, self.client.as_ref(), inode).await
    }

    /// Whether mutations are allowed for a project, considering both the
    /// mount-wide read-only flag and the recorded access level.
    fn check_write_allowed(&self, proj_id: &str) -> Result<(), FsError> {
        if self.options.read_only {
            return Err(FsError::PermissionDenied("read-only mount".to_string()));
        }
        match self.store.project_access(proj_id)? {
            Some(level) if level.can_write() => Ok(()),
            _ => Err(FsError::PermissionDenied(format!(
                "project {} is read-only",
                proj_id
            ))),
        }
    }

    fn project_writable(&self, proj_id: Option<&str>) -> bool {
        if self.options.read_only {
            return false;
        }
        match proj_id {
            Some(p) => matches!(
                self.store.project_access(p),
                Ok(Some(AccessLevel::ReadWrite))
            ),
            None => false,
        }
    }

    /// Size override for a file currently staged for write.
    fn staged_size(&self, inode: u64) -> Option<u64> {
        let handles = self.handles.lock().unwrap();
        handles.values().find_map(|h| match h {
            OpenHandle::Write(w) if w.inode == inode => Some(w.size()),
            _ => None,
        })
    }

    fn node_attr(&self, node: &Node) -> FileAttr {
        match node {
            Node::Dir(d) => {
                let perm: u16 = if self.project_writable(d.proj_id.as_deref()) {
                    0o755
                } else {
                    0o555
                };
                self.make_attr(d.inode, 0, d.ctime, d.mtime, FileType::Directory, perm, 2)
            }
            Node::File(f) => {
                let perm: u16 = if self.project_writable(Some(&f.proj_id)) {
                    0o644
                } else {
                    0o444
                };
                let size: u64 = self.staged_size(f.inode).unwrap_or(f.size);
                self.make_attr(
                    f.inode,
                    size,
                    f.ctime,
                    f.mtime,
                    FileType::RegularFile,
                    perm,
                    f.nlink,
                )
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn make_attr(
        &self,
        ino: u64,
        size: u64,
        ctime_ms: i64,
        mtime_ms: i64,
        kind: FileType,
        perm: u16,
        nlink: u32,
    ) -> FileAttr {
        let ctime: SystemTime = millis_to_system_time(ctime_ms);
        let mtime: SystemTime = millis_to_system_time(mtime_ms);
        FileAttr {
            ino,
            size,
            blocks: (size + 511) / 512,
            atime: mtime,
            mtime,
            ctime,
            crtime: ctime,
            kind,
            perm,
            nlink,
            uid: self.options.uid,
            gid: self.options.gid,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }

    fn alloc_fh(&self, handle: OpenHandle) -> u64 {
        let fh: u64 = self.next_fh.fetch_add(1, Ordering::SeqCst);
        self.handles.lock().unwrap().insert(fh, handle);
        fh
    }

    // ------------------------------------------------------------------
    // The operations behind the FUSE callbacks.
    // ------------------------------------------------------------------

    pub async fn lookup_op(&self, parent: u64, name: &str) -> Result<FileAttr, FsError> {
        self.populate(parent).await?;
        let node: Node = self.store.lookup(parent, name)?;
        Ok(self.node_attr(&node))
    }

    pub async fn getattr_op(&self, ino: u64) -> Result<FileAttr, FsError> {
        let node: Node = self.store.get_node(ino)?;
        Ok(self.node_attr(&node))
    }

    /// Directory listing including the `.` and `..` entries.
    pub async fn readdir_op(&self, ino: u64) -> Result<Vec<(u64, FileType, String)>, FsError> {
        self.populate(ino).await?;
        let dir: DirRow = self.store.get_dir(ino)?;
        let parent_inode: u64 = if dir.inode == INODE_ROOT {
            INODE_ROOT
        } else {
            self.store.get_dir_by_path(&dir.parent)?.inode
        };

        let mut entries: Vec<(u64, FileType, String)> = vec![
            (dir.inode, FileType::Directory, ".".to_string()),
            (parent_inode, FileType::Directory, "..".to_string()),
        ];
        for entry in self.store.readdir(ino)? {
            let kind: FileType = match entry.kind {
                NodeKind::Directory => FileType::Directory,
                NodeKind::File => FileType::RegularFile,
            };
            entries.push((entry.inode, kind, entry.name));
        }
        Ok(entries)
    }

    pub async fn open_op(&self, ino: u64, flags: i32) -> Result<u64, FsError> {
        if self.poisoned.lock().unwrap().contains(&ino) {
            return Err(FsError::Io(format!("inode {} failed to upload", ino)));
        }
        let file: FileRow = match self.store.get_node(ino)? {
            Node::File(f) => f,
            Node::Dir(d) => {
                return Err(FsError::InvalidArgument(format!(
                    "{} is a directory",
                    d.full_path
                )))
            }
        };

        let accmode: i32 = flags & libc::O_ACCMODE;
        if accmode == libc::O_RDONLY {
            // Only real files can be read; workflows, applets, and other
            // data objects appear in listings but refuse I/O.
            if !file.object_id.starts_with("file-") {
                return Err(FsError::PermissionDenied(format!(
                    "{} is not a file object",
                    file.full_path()
                )));
            }
            self.engine.open(&file);
            return Ok(self.alloc_fh(OpenHandle::Read { inode: ino }));
        }

        // Write (or read-write) open: stage locally.
        self.check_write_allowed(&file.proj_id)?;
        let parent: DirRow = self.store.get_dir_by_path(&file.parent)?;
        let remote_folder: String = parent.proj_folder.clone().ok_or_else(|| {
            FsError::PermissionDenied(format!("{} is not backed by a project", parent.full_path))
        })?;

        let truncate: bool = flags & libc::O_TRUNC != 0;
        let handle: WriteHandle = if file.object_id.is_empty() || truncate {
            WriteHandle::create(
                ino,
                file.proj_id.clone(),
                remote_folder,
                file.name.clone(),
                self.staging.path(),
            )?
        } else if file.object_id.starts_with("file-") {
            // Updating an existing remote file in place: start from its
            // current content.
            let contents: Vec<u8> = self.download_all(&file).await?;
            WriteHandle::with_contents(
                ino,
                file.proj_id.clone(),
                remote_folder,
                file.name.clone(),
                self.staging.path(),
                &contents,
            )?
        } else {
            return Err(FsError::PermissionDenied(format!(
                "{} is not a file object",
                file.full_path()
            )));
        };

        if truncate {
            self.store.set_file_size(ino, 0)?;
        }
        Ok(self.alloc_fh(OpenHandle::Write(Box::new(handle))))
    }

    /// Fetch a file's entire content, outside the prefetch engine.
    async fn download_all(&self, file: &FileRow) -> Result<Vec<u8>, FsError> {
        if file.size == 0 {
            return Ok(Vec::new());
        }
        let url: DownloadUrl = self
            .client
            .get_download_url(&file.object_id, &file.proj_id)
            .await
            .map_err(|e| e.into_fs_error())?;
        self.client
            .fetch_url_range(&url, 0, file.size)
            .await
            .map_err(|e| e.into_fs_error())
    }

    pub async fn read_op(
        &self,
        ino: u64,
        fh: u64,
        offset: u64,
        size: u32,
    ) -> Result<Vec<u8>, FsError> {
        if self.poisoned.lock().unwrap().contains(&ino) {
            return Err(FsError::Io(format!("inode {} failed to upload", ino)));
        }

        let staged: Option<Vec<u8>> = {
            let handles = self.handles.lock().unwrap();
            match handles.get(&fh) {
                Some(OpenHandle::Write(w)) => Some(w.read_at(offset, size as u64)?),
                Some(OpenHandle::Read { .. }) => None,
                None => {
                    return Err(FsError::Io(format!("unknown file handle {}", fh)));
                }
            }
        };
        match staged {
            Some(data) => Ok(data),
            None => self.engine.read(ino, offset, size as u64).await,
        }
    }

    pub async fn write_op(&self, ino: u64, fh: u64, offset: u64, data: &[u8]) -> Result<u32, FsError> {
        let (written, new_size): (u32, u64) = {
            let mut handles = self.handles.lock().unwrap();
            match handles.get_mut(&fh) {
                Some(OpenHandle::Write(w)) => {
                    let written: u32 = w.write_at(offset, data)?;
                    (written, w.size())
                }
                Some(OpenHandle::Read { .. }) => {
                    return Err(FsError::PermissionDenied(
                        "handle is open read-only".to_string(),
                    ));
                }
                None => return Err(FsError::Io(format!("unknown file handle {}", fh))),
            }
        };
        // Keep getattr honest while the write is in flight.
        self.store.set_file_size(ino, new_size)?;
        Ok(written)
    }

    pub async fn create_op(&self, parent: u64, name: &str) -> Result<(FileAttr, u64), FsError> {
        self.populate(parent).await?;
        let dir: DirRow = self.store.get_dir(parent)?;
        let proj_id: String = dir.proj_id.clone().ok_or_else(|| {
            FsError::PermissionDenied(format!("{} is not backed by a project", dir.full_path))
        })?;
        self.check_write_allowed(&proj_id)?;
        let remote_folder: String = dir.proj_folder.clone().ok_or_else(|| {
            FsError::PermissionDenied(format!("{} is not backed by a project", dir.full_path))
        })?;

        let stub: FileRow = self.store.create_file(parent, name)?;
        let handle: WriteHandle = WriteHandle::create(
            stub.inode,
            proj_id,
            remote_folder,
            name.to_string(),
            self.staging.path(),
        )?;
        let fh: u64 = self.alloc_fh(OpenHandle::Write(Box::new(handle)));
        debug!(parent, name, inode = stub.inode, "created file stub");
        Ok((self.node_attr(&Node::File(stub)), fh))
    }

    pub async fn mkdir_op(&self, parent: u64, name: &str) -> Result<FileAttr, FsError> {
        self.populate(parent).await?;
        let dir: DirRow = self.store.get_dir(parent)?;
        let proj_id: String = dir.proj_id.clone().ok_or_else(|| {
            FsError::PermissionDenied(format!("{} is not backed by a project", dir.full_path))
        })?;
        self.check_write_allowed(&proj_id)?;

        let created: DirRow = self.store.mkdir(parent, name)?;
        Ok(self.node_attr(&Node::Dir(created)))
    }

    pub async fn unlink_op(&self, parent: u64, name: &str) -> Result<(), FsError> {
        self.populate(parent).await?;
        match self.store.lookup(parent, name)? {
            Node::File(f) => self.check_write_allowed(&f.proj_id)?,
            Node::Dir(d) => {
                return Err(FsError::PermissionDenied(format!(
                    "{} is a directory",
                    d.full_path
                )))
            }
        }
        let removed: FileRow = self.store.unlink(parent, name)?;
        self.poisoned.lock().unwrap().remove(&removed.inode);
        Ok(())
    }

    pub async fn rmdir_op(&self, parent: u64, name: &str) -> Result<(), FsError> {
        self.populate(parent).await?;
        let target: Node = self.store.lookup(parent, name)?;
        if let Node::Dir(d) = &target {
            let proj: String = d.proj_id.clone().ok_or_else(|| {
                FsError::PermissionDenied(format!("{} cannot be removed", d.full_path))
            })?;
            self.check_write_allowed(&proj)?;
            // Emptiness is judged against the remote folder, so the
            // directory must be materialized first.
            self.populate(d.inode).await?;
        }
        self.store.rmdir(parent, name)
    }

    pub async fn rename_op(
        &self,
        parent: u64,
        name: &str,
        new_parent: u64,
        new_name: &str,
    ) -> Result<(), FsError> {
        self.populate(parent).await?;
        self.populate(new_parent).await?;
        match self.store.lookup(parent, name)? {
            Node::File(f) => self.check_write_allowed(&f.proj_id)?,
            Node::Dir(d) => {
                let proj: String = d.proj_id.clone().ok_or_else(|| {
                    FsError::PermissionDenied(format!("{} cannot be moved", d.full_path))
                })?;
                self.check_write_allowed(&proj)?;
            }
        }
        self.store.rename(parent, name, new_parent, new_name)
    }

    pub async fn setattr_op(&self, ino: u64, size: Option<u64>) -> Result<FileAttr, FsError> {
        if let Some(new_size) = size {
            let file: FileRow = match self.store.get_node(ino)? {
                Node::File(f) => f,
                Node::Dir(d) => {
                    return Err(FsError::InvalidArgument(format!(
                        "{} is a directory",
                        d.full_path
                    )))
                }
            };
            self.check_write_allowed(&file.proj_id)?;

            let truncated: bool = {
                let mut handles = self.handles.lock().unwrap();
                let staged = handles.values_mut().find_map(|h| match h {
                    OpenHandle::Write(w) if w.inode == ino => Some(w),
                    _ => None,
                });
                match staged {
                    Some(w) => {
                        w.truncate(new_size)?;
                        true
                    }
                    None => false,
                }
            };
            if !truncated && !file.object_id.is_empty() {
                // Truncating remote content requires an open write handle
                // to stage it through.
                return Err(FsError::PermissionDenied(format!(
                    "{} is not open for write",
                    file.full_path()
                )));
            }
            self.store.set_file_size(ino, new_size)?;
        }
        self.getattr_op(ino).await
    }

    pub async fn release_op(&self, ino: u64, fh: u64) -> Result<(), FsError> {
        let handle: Option<OpenHandle> = self.handles.lock().unwrap().remove(&fh);
        match handle {
            Some(OpenHandle::Read { inode }) => {
                self.engine.close(inode);
                Ok(())
            }
            Some(OpenHandle::Write(w)) => self.finish_upload(ino, *w).await,
            None => Ok(()),
        }
    }

    /// Upload the staged bytes and bind the resulting object id.
    ///
    /// On failure the inode is poisoned: reads return EIO until unmount.
    async fn finish_upload(&self, ino: u64, handle: WriteHandle) -> Result<(), FsError> {
        handle.sync()?;
        let size: u64 = handle.size();
        info!(
            inode = ino,
            name = %handle.name,
            bytes = size,
            "uploading staged file"
        );
        let uploaded = self
            .client
            .upload_file(
                handle.path(),
                &handle.proj_id,
                &handle.remote_folder,
                &handle.name,
            )
            .await;
        match uploaded {
            Ok(file_id) => {
                self.store.finalize_upload(ino, &file_id, size)?;
                // Closure to the platform's "closed" state is async on
                // its side; the bytes are already accepted.
                debug!(inode = ino, file_id = %file_id, "upload accepted");
                Ok(())
            }
            Err(e) => {
                error!(inode = ino, error = %e, "upload failed; poisoning inode");
                self.poisoned.lock().unwrap().insert(ino);
                Err(e.into_fs_error())
            }
        }
    }

    pub async fn fsync_op(&self, fh: u64) -> Result<(), FsError> {
        let handles = self.handles.lock().unwrap();
        match handles.get(&fh) {
            Some(OpenHandle::Write(w)) => w.sync(),
            _ => Ok(()),
        }
    }
}

fn millis_to_system_time(ms: i64) -> SystemTime {
    if ms <= 0 {
        UNIX_EPOCH
    } else {
        UNIX_EPOCH + Duration::from_millis(ms as u64)
    }
}

fn name_str(name: &OsStr) -> Result<&str, FsError> {
    name.to_str()
        .ok_or_else(|| FsError::InvalidArgument("non-UTF8 name".to_string()))
}

impl Filesystem for SkyFilesystem {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name: &str = match name_str(name) {
            Ok(n) => n,
            Err(_) => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let rt: Handle = self.runtime.clone();
        match rt.block_on(self.lookup_op(parent, name)) {
            Ok(attr) => reply.entry(&self.ttl(), &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        let rt: Handle = self.runtime.clone();
        match rt.block_on(self.getattr_op(ino)) {
            Ok(attr) => reply.attr(&self.ttl(), &attr),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let rt: Handle = self.runtime.clone();
        match rt.block_on(self.setattr_op(ino, size)) {
            Ok(attr) => reply.attr(&self.ttl(), &attr),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let rt: Handle = self.runtime.clone();
        let entries: Vec<(u64, FileType, String)> = match rt.block_on(self.readdir_op(ino)) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };
        for (i, (ino, kind, name)) in entries.iter().enumerate().skip(offset as usize) {
            if reply.add(*ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let rt: Handle = self.runtime.clone();
        match rt.block_on(self.open_op(ino, flags)) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let rt: Handle = self.runtime.clone();
        match rt.block_on(self.read_op(ino, fh, offset as u64, size)) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyWrite,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let rt: Handle = self.runtime.clone();
        match rt.block_on(self.write_op(ino, fh, offset as u64, data)) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let name: &str = match name_str(name) {
            Ok(n) => n,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };
        let rt: Handle = self.runtime.clone();
        match rt.block_on(self.create_op(parent, name)) {
            Ok((attr, fh)) => reply.created(&self.ttl(), &attr, 0, fh, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let name: &str = match name_str(name) {
            Ok(n) => n,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };
        let rt: Handle = self.runtime.clone();
        match rt.block_on(self.mkdir_op(parent, name)) {
            Ok(attr) => reply.entry(&self.ttl(), &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name: &str = match name_str(name) {
            Ok(n) => n,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };
        let rt: Handle = self.runtime.clone();
        match rt.block_on(self.unlink_op(parent, name)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name: &str = match name_str(name) {
            Ok(n) => n,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };
        let rt: Handle = self.runtime.clone();
        match rt.block_on(self.rmdir_op(parent, name)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (name, newname) = match (name_str(name), name_str(newname)) {
            (Ok(a), Ok(b)) => (a, b),
            _ => {
                reply.error(libc::EINVAL);
                return;
            }
        };
        let rt: Handle = self.runtime.clone();
        match rt.block_on(self.rename_op(parent, name, newparent, newname)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn flush(&mut self, _req: &Request, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request, _ino: u64, fh: u64, _datasync: bool, reply: ReplyEmpty) {
        let rt: Handle = self.runtime.clone();
        match rt.block_on(self.fsync_op(fh)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let rt: Handle = self.runtime.clone();
        match rt.block_on(self.release_op(ino, fh)) {
            Ok(()) => reply.ok(),
            Err(e) => {
                // The kernel mostly ignores release errors; the log and
                // the poisoned inode carry the real signal.
                warn!(ino, error = %e, "release failed");
                reply.error(e.errno());
            }
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        // The namespace is remote; report a roomy synthetic filesystem.
        reply.statfs(0, 0, 0, 0, 0, 512, 255, 0);
    }

    fn destroy(&mut self) {
        let open: usize = self.handles.lock().unwrap().len();
        if open > 0 {
            warn!(open, "unmounting with open handles; staged writes are dropped");
        }
        info!("filesystem unmounted");
    }
}
