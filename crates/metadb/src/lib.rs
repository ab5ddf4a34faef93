//! SQLite-backed metadata mirror of the mounted namespace.
//!
//! The store owns inode allocation (a serialized counter in its own
//! table, never the engine's autoincrement) and holds one row per
//! directory and file visible in the mount. All access goes through a
//! single process-wide mutex around the database handle; FUSE operations
//! are short and metadata is small, so contention is acceptable.
//!
//! Directories are populated lazily: a row is inserted `populated =
//! false` for every mount, and the first readdir or lookup against it
//! lists the backing project folder and materializes the children.

pub mod populate;
pub mod schema;
pub mod store;

pub use populate::ensure_populated;
pub use store::{DirEntry, DirRow, FileRow, MetadataStore, Node, NodeKind};
