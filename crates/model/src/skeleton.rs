//! Directory skeleton derivation.
//!
//! The skeleton is the ordered set of intermediate directories that must
//! exist locally so every mount can be attached as a leaf. For mounts
//! `["/A/B/C", "/D", "/D/E"]` the skeleton is `["/A", "/A/B", "/D"]`:
//! parents precede children, and the root is implicit.

use std::collections::BTreeSet;

use skymount_common::{ancestors, clean_abs_path, parent_of};

use crate::error::ManifestError;
use crate::manifest::Manifest;

impl Manifest {
    /// Derive the intermediate directories needed to attach every file
    /// parent and every mount, ordered so parents precede children.
    ///
    /// Fails when a mount path is used twice, equals `/`, or would sit in
    /// the middle of the scaffolding instead of at a leaf.
    pub fn dir_skeleton(&self) -> Result<Vec<String>, ManifestError> {
        let mut tree: BTreeSet<String> = BTreeSet::new();

        // Record every ancestor of every file's parent directory.
        for file in &self.files {
            for p in ancestors(&file.parent) {
                tree.insert(p);
            }
        }

        // Record the ancestors of each mount's parent, and reject
        // mount paths that are reused or unusable.
        let mut all_mounts: BTreeSet<String> = BTreeSet::new();
        for d in &self.directories {
            let dirname: String = clean_abs_path(&d.dirname);
            if dirname == "/" {
                return Err(ManifestError::InvalidMountPath(d.dirname.clone()));
            }
            for p in ancestors(&parent_of(&dirname)) {
                tree.insert(p);
            }
            if !all_mounts.insert(dirname.clone()) {
                return Err(ManifestError::DuplicateMount(dirname));
            }
        }

        // A mount must be a leaf: it may not appear among the
        // intermediate directories required by anything else.
        for d in &self.directories {
            let dirname: String = clean_abs_path(&d.dirname);
            if tree.contains(&dirname) {
                return Err(ManifestError::MountNotLeaf(dirname));
            }
        }

        // Parents must be created before their children; sorting by the
        // number of separators gives that order. The root already exists.
        let mut elems: Vec<String> = tree.into_iter().filter(|p| p != "/").collect();
        elems.sort_by_key(|p: &String| p.matches('/').count());
        Ok(elems)
    }
}
