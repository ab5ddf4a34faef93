//! Shared constants used across skymount crates.

/// One kibibyte.
pub const KIB: u64 = 1024;
/// One mebibyte.
pub const MIB: u64 = 1024 * KIB;
/// One gibibyte.
pub const GIB: u64 = 1024 * MIB;

/// Unit of prefetch and cache (16MB).
/// A read is decomposed into the chunks it overlaps; chunks are fetched,
/// cached, and evicted as a whole.
pub const DEFAULT_CHUNK_SIZE: u64 = 16 * MIB;

/// Total byte budget for cached chunks across all open files (256MB).
pub const DEFAULT_CACHE_BUDGET: u64 = 256 * MIB;

/// Number of outbound HTTP requests that may be in flight at once,
/// shared by prefetch, lazy population, and uploads.
pub const HTTP_CLIENT_POOL_SIZE: usize = 4;

/// Maximum number of children a single directory may hold.
pub const MAX_DIR_SIZE: usize = 10_000;

/// Consecutive sequential reads before an open file is considered streaming.
pub const STREAMING_THRESHOLD: u32 = 2;

/// Speculative window starts at this many chunks ahead of the last read.
pub const PREFETCH_WINDOW_START: u64 = 2;
/// The window doubles on streaming hits up to this cap.
pub const PREFETCH_WINDOW_MAX: u64 = 16;

/// Inode number 0 is never assigned.
pub const INODE_INVALID: u64 = 0;
/// The root directory of the mount.
pub const INODE_ROOT: u64 = 1;
