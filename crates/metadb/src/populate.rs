//! Lazy directory population.
//!
//! Mount-backed directories are inserted `populated = false`; the first
//! lookup or readdir against one lists the backing project folder and
//! materializes the immediate children. Two racing callers may both
//! list the folder; inserts are conditional on the path slot being
//! free, so the outcome is the same either way.

use tracing::debug;

use skymount_client::{FolderListing, PlatformClient};
use skymount_common::FsError;

use crate::store::{DirRow, MetadataStore, Node};

/// Make sure a directory's children are present in the store.
///
/// A no-op for files, for already populated directories, and for
/// skeleton intermediates (whose children come from the manifest).
/// The folder listing happens outside the metadata lock.
pub async fn ensure_populated(
    store: &MetadataStore,
    client: &dyn PlatformClient,
    inode: u64,
) -> Result<(), FsError> {
    let dir: DirRow = match store.get_node(inode)? {
        Node::Dir(d) => d,
        Node::File(_) => return Ok(()),
    };
    if dir.populated {
        return Ok(());
    }

    let (proj_id, folder) = match (&dir.proj_id, &dir.proj_folder) {
        (Some(p), Some(f)) => (p.clone(), f.clone()),
        // Not project-backed; there is nothing to list.
        _ => {
            store.mark_populated(dir.inode)?;
            return Ok(());
        }
    };

    debug!(path = %dir.full_path, proj_id, folder, "populating directory");
    let listing: FolderListing = client
        .list_folder(&proj_id, &folder)
        .await
        .map_err(|e| e.into_fs_error())?;
    store.insert_folder_children(&dir, &listing)
}
