//! Manifest handling for skymount.
//!
//! A manifest describes the namespace to be mounted: files attached at
//! absolute paths, and project folders mounted as directories. Loading a
//! manifest validates ids and paths, normalizes every path, fills in
//! fields the user omitted by describing the platform, and derives the
//! intermediate directory skeleton the metadata store must create before
//! the mounts can be attached as leaves.

pub mod error;
pub mod manifest;
pub mod skeleton;

pub use error::ManifestError;
pub use manifest::{Manifest, ManifestDir, ManifestFile};
