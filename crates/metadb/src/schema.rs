//! Database schema and connection setup.

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use skymount_common::{FsError, INODE_ROOT};

/// Schema version; bump when the table layout changes incompatibly.
pub const SCHEMA_VERSION: u32 = 1;

const CREATE_SQL: &str = "
CREATE TABLE IF NOT EXISTS counters (
    name  TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS directories (
    inode       INTEGER NOT NULL UNIQUE,
    parent      TEXT NOT NULL,
    name        TEXT NOT NULL,
    full_path   TEXT NOT NULL PRIMARY KEY,
    proj_id     TEXT,
    proj_folder TEXT,
    ctime       INTEGER NOT NULL,
    mtime       INTEGER NOT NULL,
    populated   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_directories_parent ON directories(parent);

CREATE TABLE IF NOT EXISTS files (
    inode     INTEGER NOT NULL UNIQUE,
    parent    TEXT NOT NULL,
    name      TEXT NOT NULL,
    object_id TEXT NOT NULL,
    proj_id   TEXT NOT NULL,
    size      INTEGER NOT NULL,
    ctime     INTEGER NOT NULL,
    mtime     INTEGER NOT NULL,
    nlink     INTEGER NOT NULL,
    PRIMARY KEY (parent, name)
);

CREATE TABLE IF NOT EXISTS projects (
    proj_id      TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    ctime        INTEGER NOT NULL,
    mtime        INTEGER NOT NULL,
    access_level TEXT NOT NULL
);
";

/// Open (or create) the metadata database and make sure the schema,
/// the inode counter, and the root directory row exist.
///
/// The file is preserved across mounts; inodes assigned in an earlier
/// session keep their numbers.
pub fn open_database(db_path: &Path, now_millis: i64) -> Result<Connection, FsError> {
    let conn: Connection =
        Connection::open(db_path).map_err(|e| FsError::Io(e.to_string()))?;

    // WAL keeps readers cheap; the busy timeout covers the short window
    // where another process still holds the file.
    conn.execute_batch("PRAGMA journal_mode=WAL;")
        .map_err(|e| FsError::Io(e.to_string()))?;
    conn.busy_timeout(Duration::from_secs(5))
        .map_err(|e| FsError::Io(e.to_string()))?;

    conn.execute_batch(CREATE_SQL)
        .map_err(|e| FsError::Io(e.to_string()))?;

    // The counter starts at the root inode; the first allocation is 2.
    conn.execute(
        "INSERT OR IGNORE INTO counters (name, value) VALUES ('inode', ?)",
        [INODE_ROOT as i64],
    )
    .map_err(|e| FsError::Io(e.to_string()))?;

    conn.execute(
        "INSERT OR IGNORE INTO directories
             (inode, parent, name, full_path, proj_id, proj_folder, ctime, mtime, populated)
         VALUES (?, '', '', '/', NULL, NULL, ?, ?, 1)",
        rusqlite::params![INODE_ROOT as i64, now_millis, now_millis],
    )
    .map_err(|e| FsError::Io(e.to_string()))?;

    Ok(conn)
}
