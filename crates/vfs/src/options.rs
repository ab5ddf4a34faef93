//! Mount configuration.

use std::path::PathBuf;

use skymount_common::{
    DEFAULT_CACHE_BUDGET, DEFAULT_CHUNK_SIZE, PREFETCH_WINDOW_MAX, PREFETCH_WINDOW_START,
    STREAMING_THRESHOLD,
};

/// Default location of the metadata database.
pub const DEFAULT_DB_PATH: &str = "/var/skymount/metadata.db";

/// Options controlling a mount's identity, permissions, and tuning.
///
/// ```ignore
/// let options = MountOptions::default()
///     .with_owner(1000, 1000)
///     .with_read_only(true);
/// ```
#[derive(Debug, Clone)]
pub struct MountOptions {
    /// Owner reported for every node.
    pub uid: u32,
    pub gid: u32,
    /// Refuse every mutating operation regardless of project access.
    pub read_only: bool,
    /// Ask the FUSE library to log protocol traffic.
    pub debug_fuse: bool,
    /// How long the kernel may cache attributes and entries.
    pub attr_ttl_secs: u64,
    /// Location of the metadata database file.
    pub db_path: PathBuf,
    /// Where staged writes live; the system temp dir when unset.
    pub staging_dir: Option<PathBuf>,
    /// Filesystem name shown in mount tables.
    pub fsname: String,
    /// Prefetch tuning.
    pub prefetch: PrefetchTuning,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            read_only: false,
            debug_fuse: false,
            attr_ttl_secs: 1,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            staging_dir: None,
            fsname: "skymount".to_string(),
            prefetch: PrefetchTuning::default(),
        }
    }
}

impl MountOptions {
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_db_path(mut self, db_path: PathBuf) -> Self {
        self.db_path = db_path;
        self
    }

    pub fn with_staging_dir(mut self, staging_dir: PathBuf) -> Self {
        self.staging_dir = Some(staging_dir);
        self
    }

    pub fn with_prefetch(mut self, prefetch: PrefetchTuning) -> Self {
        self.prefetch = prefetch;
        self
    }
}

/// Knobs for the prefetch engine.
#[derive(Debug, Clone)]
pub struct PrefetchTuning {
    /// Unit of fetch, cache, and eviction.
    pub chunk_size: u64,
    /// Total bytes of cached chunks across all open files.
    pub cache_budget: u64,
    /// Sequential reads required before speculation starts.
    pub streaming_threshold: u32,
    /// Initial speculative window, in chunks.
    pub window_start: u64,
    /// Window cap, in chunks.
    pub window_max: u64,
}

impl Default for PrefetchTuning {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            cache_budget: DEFAULT_CACHE_BUDGET,
            streaming_threshold: STREAMING_THRESHOLD,
            window_start: PREFETCH_WINDOW_START,
            window_max: PREFETCH_WINDOW_MAX,
        }
    }
}
