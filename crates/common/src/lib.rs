//! Shared types and utilities for skymount.
//!
//! This crate provides common functionality used across all skymount crates:
//! - Path normalization for the POSIX-style mount namespace
//! - The filesystem error taxonomy and its errno mapping
//! - Shared constants (chunk sizes, inode numbers, limits)

pub mod constants;
pub mod error;
pub mod path_utils;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::FsError;
pub use path_utils::{
    ancestors, basename, clean_abs_path, is_posix_filename, join_path, parent_of,
};
