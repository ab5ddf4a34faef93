//! FUSE frontend for skymount.
//!
//! Projects a remote object-store namespace as a local filesystem. Files
//! appear local; reads are served from a chunk cache fed by a prefetch
//! engine, writes are staged to local disk and uploaded on close.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: FUSE callbacks (fuser::Filesystem impl in fuse.rs)
//! Layer 2: dispatcher operations (lookup/read/create/... on SkyFilesystem)
//! Layer 1: primitives (MetadataStore, PrefetchEngine, PlatformClient)
//! ```
//!
//! Everything mount-wide is owned by [`SkyFilesystem`]; there are no
//! process-wide singletons.

pub mod error;
pub mod fuse;
pub mod handle;
pub mod options;
pub mod prefetch;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use skymount_client::PlatformClient;
use skymount_metadb::MetadataStore;
use skymount_model::Manifest;

pub use error::MountError;
pub use fuse::SkyFilesystem;
pub use options::{MountOptions, PrefetchTuning};
pub use prefetch::{CacheStats, PrefetchEngine};

/// Build the filesystem from a loaded manifest.
///
/// Derives the directory skeleton, opens the metadata database,
/// materializes the namespace, and records each project's access level
/// for permission enforcement. Must run inside a tokio runtime.
pub async fn prepare(
    manifest: &Manifest,
    client: Arc<dyn PlatformClient>,
    options: MountOptions,
) -> Result<SkyFilesystem, MountError> {
    let skeleton: Vec<String> = manifest.dir_skeleton()?;

    if let Some(parent) = options.db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| MountError::Metadata(skymount_common::FsError::Io(e.to_string())))?;
    }
    let store: Arc<MetadataStore> = Arc::new(MetadataStore::open(&options.db_path)?);
    store.init_from_manifest(manifest, &skeleton)?;

    let mut project_ids: BTreeSet<String> = BTreeSet::new();
    for f in &manifest.files {
        project_ids.insert(f.proj_id.clone());
    }
    for d in &manifest.directories {
        project_ids.insert(d.proj_id.clone());
    }
    for proj_id in project_ids {
        let desc = client.describe_project(&proj_id).await?;
        store.record_project(&desc)?;
    }

    let engine: Arc<PrefetchEngine> = Arc::new(PrefetchEngine::new(
        client.clone(),
        options.prefetch.clone(),
    ));
    info!(
        mounts = manifest.directories.len(),
        files = manifest.files.len(),
        db = %options.db_path.display(),
        "filesystem prepared"
    );
    SkyFilesystem::new(store, engine, client, options)
}

fn fuse_options(options: &MountOptions) -> Vec<fuser::MountOption> {
    let mut opts: Vec<fuser::MountOption> = vec![
        fuser::MountOption::FSName(options.fsname.clone()),
        fuser::MountOption::AutoUnmount,
        fuser::MountOption::NoExec,
    ];
    if options.read_only {
        opts.push(fuser::MountOption::RO);
    }
    if options.debug_fuse {
        opts.push(fuser::MountOption::CUSTOM("debug".to_string()));
    }
    opts
}

/// Mount and serve until unmounted.
///
/// Blocks the calling thread with the FUSE event loop, so call it from a
/// plain thread (e.g. `spawn_blocking`), never from inside the runtime.
pub fn mount(fs: SkyFilesystem, mountpoint: &Path) -> Result<(), MountError> {
    let opts: Vec<fuser::MountOption> = fuse_options(fs.options());
    fuser::mount2(fs, mountpoint, &opts).map_err(MountError::Fuse)
}

/// Mount in the background; unmounts when the session handle drops.
pub fn spawn_mount(
    fs: SkyFilesystem,
    mountpoint: &Path,
) -> Result<fuser::BackgroundSession, MountError> {
    let opts: Vec<fuser::MountOption> = fuse_options(fs.options());
    fuser::spawn_mount2(fs, mountpoint, &opts).map_err(MountError::Fuse)
}
