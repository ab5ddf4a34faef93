//! The metadata store: one row per visible directory and file.

use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::warn;

use skymount_client::{AccessLevel, FolderListing, ProjectDescribe};
use skymount_common::{basename, join_path, parent_of, FsError, MAX_DIR_SIZE};
use skymount_model::Manifest;

/// What kind of node a directory entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
}

/// A directory row.
///
/// Skeleton intermediates carry no project binding; mounts and lazily
/// discovered subfolders are bound to `(proj_id, proj_folder)`.
#[derive(Debug, Clone)]
pub struct DirRow {
    pub inode: u64,
    pub parent: String,
    pub name: String,
    /// Normalized absolute path; the primary key of the namespace.
    pub full_path: String,
    pub proj_id: Option<String>,
    pub proj_folder: Option<String>,
    pub ctime: i64,
    pub mtime: i64,
    pub populated: bool,
}

/// A file row. The object id may be any data-object class; only
/// `file-` objects can be opened for I/O.
#[derive(Debug, Clone)]
pub struct FileRow {
    pub inode: u64,
    pub parent: String,
    pub name: String,
    /// Empty string for a locally created stub not yet uploaded.
    pub object_id: String,
    pub proj_id: String,
    pub size: u64,
    pub ctime: i64,
    pub mtime: i64,
    pub nlink: u32,
}

impl FileRow {
    pub fn full_path(&self) -> String {
        join_path(&self.parent, &self.name)
    }
}

/// Either kind of node, as returned by lookup and getattr.
#[derive(Debug, Clone)]
pub enum Node {
    Dir(DirRow),
    File(FileRow),
}

impl Node {
    pub fn inode(&self) -> u64 {
        match self {
            Node::Dir(d) => d.inode,
            Node::File(f) => f.inode,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Dir(_) => NodeKind::Directory,
            Node::File(_) => NodeKind::File,
        }
    }
}

/// One entry in a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub inode: u64,
    pub kind: NodeKind,
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn db_err(e: rusqlite::Error) -> FsError {
    FsError::Io(e.to_string())
}

fn access_to_text(level: AccessLevel) -> &'static str {
    match level {
        AccessLevel::ReadOnly => "ro",
        AccessLevel::ReadWrite => "rw",
    }
}

fn access_from_text(text: &str) -> AccessLevel {
    match text {
        "rw" => AccessLevel::ReadWrite,
        _ => AccessLevel::ReadOnly,
    }
}

/// Persistent mirror of the mounted namespace.
pub struct MetadataStore {
    /// Database handle; the embedded engine does not support concurrent
    /// writers, so every operation serializes on this mutex.
    conn: Mutex<Connection>,
}

impl MetadataStore {
    /// Open (or create) the store at the given database path.
    pub fn open(db_path: &Path) -> Result<Self, FsError> {
        let conn: Connection = crate::schema::open_database(db_path, now_millis())?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Materialize a loaded manifest: the skeleton intermediates, the
    /// mounts, and the files. Rows already present (from an earlier
    /// mount of the same targets) keep their inode numbers.
    pub fn init_from_manifest(
        &self,
        manifest: &Manifest,
        skeleton: &[String],
    ) -> Result<(), FsError> {
        let now: i64 = now_millis();
        let mut conn = self.conn.lock().unwrap();
        let tx: Transaction = conn.transaction().map_err(db_err)?;

        for path in skeleton {
            insert_dir_if_absent(&tx, path, None, None, now, now, true)?;
        }

        for d in &manifest.directories {
            insert_dir_if_absent(
                &tx,
                &d.dirname,
                Some(&d.proj_id),
                Some(&d.folder),
                d.ctime.unwrap_or(now),
                d.mtime.unwrap_or(now),
                false,
            )?;
        }

        for f in &manifest.files {
            let name: &str = f.fname.as_deref().ok_or_else(|| {
                FsError::InvalidArgument(format!("file {} was never described", f.file_id))
            })?;
            insert_file_if_absent(
                &tx,
                &f.parent,
                name,
                &f.file_id,
                &f.proj_id,
                f.size.unwrap_or(0),
                f.ctime.unwrap_or(now),
                f.mtime.unwrap_or(now),
            )?;
        }

        tx.commit().map_err(db_err)
    }

    /// Record a project's describe result for permission enforcement.
    pub fn record_project(&self, desc: &ProjectDescribe) -> Result<(), FsError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO projects (proj_id, name, ctime, mtime, access_level)
             VALUES (?, ?, ?, ?, ?)",
            params![
                desc.id,
                desc.name,
                desc.ctime,
                desc.mtime,
                access_to_text(desc.access_level)
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// The access level recorded for a project at mount time.
    pub fn project_access(&self, proj_id: &str) -> Result<Option<AccessLevel>, FsError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT access_level FROM projects WHERE proj_id = ?",
            [proj_id],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(db_err)
        .map(|text| text.map(|t| access_from_text(&t)))
    }

    /// Find a child of a directory by name.
    pub fn lookup(&self, parent_inode: u64, name: &str) -> Result<Node, FsError> {
        let conn = self.conn.lock().unwrap();
        let parent: DirRow = dir_by_inode(&conn, parent_inode)?;
        node_by_parent_name(&conn, &parent.full_path, name)
    }

    /// Fetch a node by inode.
    pub fn get_node(&self, inode: u64) -> Result<Node, FsError> {
        let conn = self.conn.lock().unwrap();
        node_by_inode(&conn, inode)
    }

    /// Fetch a directory by inode; a file inode is an invalid argument.
    pub fn get_dir(&self, inode: u64) -> Result<DirRow, FsError> {
        let conn = self.conn.lock().unwrap();
        dir_by_inode(&conn, inode)
    }

    /// Fetch a directory by its normalized absolute path.
    pub fn get_dir_by_path(&self, full_path: &str) -> Result<DirRow, FsError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM directories WHERE full_path = ?", DIR_COLS),
            [full_path],
            dir_from_row,
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| FsError::NotFound(full_path.to_string()))
    }

    /// List a directory's children.
    ///
    /// The listing is truncated at `MAX_DIR_SIZE` entries; anything past
    /// the limit is dropped with a warning rather than failing the call.
    pub fn readdir(&self, inode: u64) -> Result<Vec<DirEntry>, FsError> {
        let conn = self.conn.lock().unwrap();
        let dir: DirRow = dir_by_inode(&conn, inode)?;

        let mut entries: Vec<DirEntry> = Vec::new();

        let mut stmt = conn
            .prepare("SELECT name, inode FROM directories WHERE parent = ? ORDER BY name")
            .map_err(db_err)?;
        let dirs = stmt
            .query_map([&dir.full_path], |row| {
                Ok(DirEntry {
                    name: row.get(0)?,
                    inode: row.get::<_, i64>(1)? as u64,
                    kind: NodeKind::Directory,
                })
            })
            .map_err(db_err)?;
        for entry in dirs {
            entries.push(entry.map_err(db_err)?);
        }

        let mut stmt = conn
            .prepare("SELECT name, inode FROM files WHERE parent = ? ORDER BY name")
            .map_err(db_err)?;
        let files = stmt
            .query_map([&dir.full_path], |row| {
                Ok(DirEntry {
                    name: row.get(0)?,
                    inode: row.get::<_, i64>(1)? as u64,
                    kind: NodeKind::File,
                })
            })
            .map_err(db_err)?;
        for entry in files {
            entries.push(entry.map_err(db_err)?);
        }

        if entries.len() > MAX_DIR_SIZE {
            warn!(
                path = %dir.full_path,
                children = entries.len(),
                limit = MAX_DIR_SIZE,
                "directory too large; listing truncated"
            );
            entries.truncate(MAX_DIR_SIZE);
        }
        Ok(entries)
    }

    /// Create a stub file row with an empty object id.
    ///
    /// The stub becomes a real remote object when the staged upload
    /// completes and [`MetadataStore::finalize_upload`] runs.
    pub fn create_file(&self, parent_inode: u64, name: &str) -> Result<FileRow, FsError> {
        let now: i64 = now_millis();
        let mut conn = self.conn.lock().unwrap();
        let tx: Transaction = conn.transaction().map_err(db_err)?;

        let parent: DirRow = dir_by_inode(&tx, parent_inode)?;
        let proj_id: String = parent.proj_id.clone().ok_or_else(|| {
            FsError::PermissionDenied(format!("{} is not backed by a project", parent.full_path))
        })?;
        check_new_child(&tx, &parent, name)?;

        let inode: u64 = next_inode(&tx)?;
        tx.execute(
            "INSERT INTO files (inode, parent, name, object_id, proj_id, size, ctime, mtime, nlink)
             VALUES (?, ?, ?, '', ?, 0, ?, ?, 1)",
            params![inode as i64, parent.full_path, name, proj_id, now, now],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        Ok(FileRow {
            inode,
            parent: parent.full_path,
            name: name.to_string(),
            object_id: String::new(),
            proj_id,
            size: 0,
            ctime: now,
            mtime: now,
            nlink: 1,
        })
    }

    /// Create a directory under a project-backed parent.
    pub fn mkdir(&self, parent_inode: u64, name: &str) -> Result<DirRow, FsError> {
        let now: i64 = now_millis();
        let mut conn = self.conn.lock().unwrap();
        let tx: Transaction = conn.transaction().map_err(db_err)?;

        let parent: DirRow = dir_by_inode(&tx, parent_inode)?;
        let (proj_id, parent_folder) = match (&parent.proj_id, &parent.proj_folder) {
            (Some(p), Some(f)) => (p.clone(), f.clone()),
            _ => {
                return Err(FsError::PermissionDenied(format!(
                    "{} is not backed by a project",
                    parent.full_path
                )))
            }
        };
        check_new_child(&tx, &parent, name)?;

        let inode: u64 = next_inode(&tx)?;
        let full_path: String = join_path(&parent.full_path, name);
        let proj_folder: String = join_path(&parent_folder, name);
        tx.execute(
            "INSERT INTO directories
                 (inode, parent, name, full_path, proj_id, proj_folder, ctime, mtime, populated)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)",
            params![
                inode as i64,
                parent.full_path,
                name,
                full_path,
                proj_id,
                proj_folder,
                now,
                now
            ],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        Ok(DirRow {
            inode,
            parent: parent.full_path,
            name: name.to_string(),
            full_path,
            proj_id: Some(proj_id),
            proj_folder: Some(proj_folder),
            ctime: now,
            mtime: now,
            populated: true,
        })
    }

    /// Remove a file row. Returns the removed row so callers can drop
    /// any cached state keyed by its inode.
    pub fn unlink(&self, parent_inode: u64, name: &str) -> Result<FileRow, FsError> {
        let conn = self.conn.lock().unwrap();
        let parent: DirRow = dir_by_inode(&conn, parent_inode)?;
        match node_by_parent_name(&conn, &parent.full_path, name)? {
            Node::Dir(d) => Err(FsError::PermissionDenied(format!(
                "{} is a directory",
                d.full_path
            ))),
            Node::File(f) => {
                conn.execute(
                    "DELETE FROM files WHERE inode = ?",
                    [f.inode as i64],
                )
                .map_err(db_err)?;
                Ok(f)
            }
        }
    }

    /// Remove an empty directory.
    pub fn rmdir(&self, parent_inode: u64, name: &str) -> Result<(), FsError> {
        let conn = self.conn.lock().unwrap();
        let parent: DirRow = dir_by_inode(&conn, parent_inode)?;
        let dir: DirRow = match node_by_parent_name(&conn, &parent.full_path, name)? {
            Node::Dir(d) => d,
            Node::File(f) => {
                return Err(FsError::InvalidArgument(format!(
                    "{} is not a directory",
                    f.full_path()
                )))
            }
        };
        if children_count(&conn, &dir.full_path)? > 0 {
            return Err(FsError::NotEmpty(dir.full_path));
        }
        conn.execute("DELETE FROM directories WHERE inode = ?", [dir.inode as i64])
            .map_err(db_err)?;
        Ok(())
    }

    /// Move a node between directories of the same project.
    ///
    /// An existing file at the destination is replaced; an existing
    /// directory is not.
    pub fn rename(
        &self,
        old_parent_inode: u64,
        old_name: &str,
        new_parent_inode: u64,
        new_name: &str,
    ) -> Result<(), FsError> {
        let now: i64 = now_millis();
        let mut conn = self.conn.lock().unwrap();
        let tx: Transaction = conn.transaction().map_err(db_err)?;

        let old_parent: DirRow = dir_by_inode(&tx, old_parent_inode)?;
        let new_parent: DirRow = dir_by_inode(&tx, new_parent_inode)?;
        let source: Node = node_by_parent_name(&tx, &old_parent.full_path, old_name)?;

        // Renames never cross a project boundary.
        let source_proj: String = match &source {
            Node::File(f) => f.proj_id.clone(),
            Node::Dir(d) => d.proj_id.clone().ok_or_else(|| {
                FsError::PermissionDenied(format!("{} cannot be moved", d.full_path))
            })?,
        };
        match &new_parent.proj_id {
            Some(p) if *p == source_proj => {}
            _ => {
                return Err(FsError::PermissionDenied(format!(
                    "rename across projects: {} -> {}",
                    old_parent.full_path, new_parent.full_path
                )))
            }
        }

        match node_by_parent_name(&tx, &new_parent.full_path, new_name) {
            Ok(Node::Dir(d)) => return Err(FsError::AlreadyExists(d.full_path)),
            Ok(Node::File(existing)) => {
                if matches!(&source, Node::Dir(_)) {
                    return Err(FsError::AlreadyExists(existing.full_path()));
                }
                tx.execute("DELETE FROM files WHERE inode = ?", [existing.inode as i64])
                    .map_err(db_err)?;
            }
            Err(FsError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        match source {
            Node::File(f) => {
                tx.execute(
                    "UPDATE files SET parent = ?, name = ?, mtime = ? WHERE inode = ?",
                    params![new_parent.full_path, new_name, now, f.inode as i64],
                )
                .map_err(db_err)?;
            }
            Node::Dir(d) => {
                let old_path: String = d.full_path.clone();
                let new_path: String = join_path(&new_parent.full_path, new_name);
                tx.execute(
                    "UPDATE directories
                         SET parent = ?, name = ?, full_path = ?, mtime = ?
                         WHERE inode = ?",
                    params![new_parent.full_path, new_name, new_path, now, d.inode as i64],
                )
                .map_err(db_err)?;

                // Rewrite the embedded paths of everything underneath.
                // Prefix matching uses substr, not LIKE, so `_` and `%`
                // in names cannot over-match siblings.
                let strip_from: i64 = old_path.len() as i64 + 1;
                let old_slash: String = format!("{}/", old_path);
                let old_slash_len: i64 = old_slash.len() as i64;
                tx.execute(
                    "UPDATE directories
                         SET full_path = ? || substr(full_path, ?),
                             parent = ? || substr(parent, ?)
                         WHERE substr(full_path, 1, ?) = ?",
                    params![new_path, strip_from, new_path, strip_from, old_slash_len, old_slash],
                )
                .map_err(db_err)?;
                tx.execute(
                    "UPDATE files SET parent = ? || substr(parent, ?)
                         WHERE parent = ? OR substr(parent, 1, ?) = ?",
                    params![new_path, strip_from, old_path, old_slash_len, old_slash],
                )
                .map_err(db_err)?;
            }
        }

        tx.commit().map_err(db_err)
    }

    /// Update a file's size (and mtime) after a local truncate or write.
    pub fn set_file_size(&self, inode: u64, size: u64) -> Result<(), FsError> {
        let conn = self.conn.lock().unwrap();
        let changed: usize = conn
            .execute(
                "UPDATE files SET size = ?, mtime = ? WHERE inode = ?",
                params![size as i64, now_millis(), inode as i64],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(FsError::NotFound(format!("inode {}", inode)));
        }
        Ok(())
    }

    /// Bind a freshly uploaded object id to a stub row.
    pub fn finalize_upload(&self, inode: u64, object_id: &str, size: u64) -> Result<(), FsError> {
        let conn = self.conn.lock().unwrap();
        let changed: usize = conn
            .execute(
                "UPDATE files SET object_id = ?, size = ?, mtime = ? WHERE inode = ?",
                params![object_id, size as i64, now_millis(), inode as i64],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(FsError::NotFound(format!("inode {}", inode)));
        }
        Ok(())
    }

    /// Mark a directory as populated without inserting children.
    pub fn mark_populated(&self, inode: u64) -> Result<(), FsError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE directories SET populated = 1 WHERE inode = ?",
            [inode as i64],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Insert the immediate children of a mount-backed directory from a
    /// folder listing, then flip its populated flag, all in one
    /// transaction. Children already present keep their inodes.
    pub fn insert_folder_children(
        &self,
        dir: &DirRow,
        listing: &FolderListing,
    ) -> Result<(), FsError> {
        let proj_id: String = match (&dir.proj_id, &dir.proj_folder) {
            (Some(p), Some(_)) => p.clone(),
            _ => {
                return Err(FsError::InvalidArgument(format!(
                    "{} is not backed by a project folder",
                    dir.full_path
                )))
            }
        };

        let mut conn = self.conn.lock().unwrap();
        let tx: Transaction = conn.transaction().map_err(db_err)?;

        let mut inserted: usize = children_count(&tx, &dir.full_path)?;
        let mut truncated: bool = false;

        for subfolder in &listing.subfolders {
            if inserted >= MAX_DIR_SIZE {
                truncated = true;
                break;
            }
            let name: String = basename(subfolder);
            if insert_dir_if_absent(
                &tx,
                &join_path(&dir.full_path, &name),
                Some(&proj_id),
                Some(subfolder),
                dir.ctime,
                dir.mtime,
                false,
            )? {
                inserted += 1;
            }
        }

        for obj in &listing.files {
            if inserted >= MAX_DIR_SIZE {
                truncated = true;
                break;
            }
            if insert_file_if_absent(
                &tx,
                &dir.full_path,
                &obj.describe.name,
                &obj.id,
                &proj_id,
                obj.describe.size,
                obj.describe.ctime,
                obj.describe.mtime,
            )? {
                inserted += 1;
            }
        }

        if truncated {
            warn!(
                path = %dir.full_path,
                limit = MAX_DIR_SIZE,
                "directory too large; remote listing truncated"
            );
        }

        tx.execute(
            "UPDATE directories SET populated = 1 WHERE inode = ?",
            [dir.inode as i64],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)
    }
}

/// Bump the persistent inode counter and return the new value.
/// Runs inside the caller's transaction, under the metadata mutex.
fn next_inode(tx: &Transaction) -> Result<u64, FsError> {
    tx.execute("UPDATE counters SET value = value + 1 WHERE name = 'inode'", [])
        .map_err(db_err)?;
    let value: i64 = tx
        .query_row("SELECT value FROM counters WHERE name = 'inode'", [], |row| {
            row.get(0)
        })
        .map_err(db_err)?;
    Ok(value as u64)
}

fn dir_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DirRow> {
    Ok(DirRow {
        inode: row.get::<_, i64>(0)? as u64,
        parent: row.get(1)?,
        name: row.get(2)?,
        full_path: row.get(3)?,
        proj_id: row.get(4)?,
        proj_folder: row.get(5)?,
        ctime: row.get(6)?,
        mtime: row.get(7)?,
        populated: row.get::<_, i64>(8)? != 0,
    })
}

fn file_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRow> {
    Ok(FileRow {
        inode: row.get::<_, i64>(0)? as u64,
        parent: row.get(1)?,
        name: row.get(2)?,
        object_id: row.get(3)?,
        proj_id: row.get(4)?,
        size: row.get::<_, i64>(5)? as u64,
        ctime: row.get(6)?,
        mtime: row.get(7)?,
        nlink: row.get::<_, i64>(8)? as u32,
    })
}

const DIR_COLS: &str =
    "inode, parent, name, full_path, proj_id, proj_folder, ctime, mtime, populated";
const FILE_COLS: &str = "inode, parent, name, object_id, proj_id, size, ctime, mtime, nlink";

fn dir_by_inode(conn: &Connection, inode: u64) -> Result<DirRow, FsError> {
    conn.query_row(
        &format!("SELECT {} FROM directories WHERE inode = ?", DIR_COLS),
        [inode as i64],
        dir_from_row,
    )
    .optional()
    .map_err(db_err)?
    .ok_or_else(|| FsError::NotFound(format!("directory inode {}", inode)))
}

fn node_by_inode(conn: &Connection, inode: u64) -> Result<Node, FsError> {
    if let Some(dir) = conn
        .query_row(
            &format!("SELECT {} FROM directories WHERE inode = ?", DIR_COLS),
            [inode as i64],
            dir_from_row,
        )
        .optional()
        .map_err(db_err)?
    {
        return Ok(Node::Dir(dir));
    }
    conn.query_row(
        &format!("SELECT {} FROM files WHERE inode = ?", FILE_COLS),
        [inode as i64],
        file_from_row,
    )
    .optional()
    .map_err(db_err)?
    .map(Node::File)
    .ok_or_else(|| FsError::NotFound(format!("inode {}", inode)))
}

fn node_by_parent_name(conn: &Connection, parent: &str, name: &str) -> Result<Node, FsError> {
    if let Some(dir) = conn
        .query_row(
            &format!(
                "SELECT {} FROM directories WHERE parent = ? AND name = ?",
                DIR_COLS
            ),
            params![parent, name],
            dir_from_row,
        )
        .optional()
        .map_err(db_err)?
    {
        return Ok(Node::Dir(dir));
    }
    conn.query_row(
        &format!("SELECT {} FROM files WHERE parent = ? AND name = ?", FILE_COLS),
        params![parent, name],
        file_from_row,
    )
    .optional()
    .map_err(db_err)?
    .map(Node::File)
    .ok_or_else(|| FsError::NotFound(join_path(parent, name)))
}

fn children_count(conn: &Connection, full_path: &str) -> Result<usize, FsError> {
    let dirs: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM directories WHERE parent = ?",
            [full_path],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    let files: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM files WHERE parent = ?",
            [full_path],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    Ok((dirs + files) as usize)
}

/// Preconditions for adding a child under `parent` with `name`.
fn check_new_child(conn: &Connection, parent: &DirRow, name: &str) -> Result<(), FsError> {
    if !skymount_common::is_posix_filename(name) {
        return Err(FsError::InvalidArgument(format!("bad name: {}", name)));
    }
    match node_by_parent_name(conn, &parent.full_path, name) {
        Ok(_) => {
            return Err(FsError::AlreadyExists(join_path(&parent.full_path, name)));
        }
        Err(FsError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }
    if children_count(conn, &parent.full_path)? >= MAX_DIR_SIZE {
        return Err(FsError::DirectoryTooLarge(parent.full_path.clone()));
    }
    Ok(())
}

/// Insert a directory row if no row claims that path yet.
/// Returns whether a row was inserted.
fn insert_dir_if_absent(
    tx: &Transaction,
    full_path: &str,
    proj_id: Option<&str>,
    proj_folder: Option<&str>,
    ctime: i64,
    mtime: i64,
    populated: bool,
) -> Result<bool, FsError> {
    let exists: Option<i64> = tx
        .query_row(
            "SELECT inode FROM directories WHERE full_path = ?",
            [full_path],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    if exists.is_some() {
        return Ok(false);
    }
    let inode: u64 = next_inode(tx)?;
    tx.execute(
        "INSERT INTO directories
             (inode, parent, name, full_path, proj_id, proj_folder, ctime, mtime, populated)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            inode as i64,
            parent_of(full_path),
            basename(full_path),
            full_path,
            proj_id,
            proj_folder,
            ctime,
            mtime,
            populated as i64
        ],
    )
    .map_err(db_err)?;
    Ok(true)
}

/// Insert a file row if the (parent, name) slot is free.
/// Returns whether a row was inserted.
#[allow(clippy::too_many_arguments)]
fn insert_file_if_absent(
    tx: &Transaction,
    parent: &str,
    name: &str,
    object_id: &str,
    proj_id: &str,
    size: u64,
    ctime: i64,
    mtime: i64,
) -> Result<bool, FsError> {
    let exists: Option<i64> = tx
        .query_row(
            "SELECT inode FROM files WHERE parent = ? AND name = ?",
            params![parent, name],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    if exists.is_some() {
        return Ok(false);
    }
    let inode: u64 = next_inode(tx)?;
    tx.execute(
        "INSERT INTO files (inode, parent, name, object_id, proj_id, size, ctime, mtime, nlink)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)",
        params![
            inode as i64,
            parent,
            name,
            object_id,
            proj_id,
            size as i64,
            ctime,
            mtime
        ],
    )
    .map_err(db_err)?;
    Ok(true)
}
