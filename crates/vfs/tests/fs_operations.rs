//! End-to-end dispatcher tests against a mock platform.
//!
//! These drive the same operations the FUSE callbacks do, without a
//! kernel mount: manifest -> metadata store -> lookup/readdir/open/
//! read/write/release, including lazy population, permission
//! enforcement, and the staged-write upload path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use fuser::FileType;

use skymount_client::{
    AccessLevel, ClientError, DownloadUrl, FolderListing, FolderObject, ObjectDescribe,
    ObjectState, PlatformClient, ProjectDescribe,
};
use skymount_common::{FsError, INODE_ROOT};
use skymount_model::{Manifest, ManifestDir, ManifestFile};
use skymount_vfs::{prepare, MountOptions, PrefetchTuning, SkyFilesystem};

const CHUNK: u64 = 1024;

struct MockPlatform {
    projects: HashMap<String, ProjectDescribe>,
    listings: HashMap<(String, String), FolderListing>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
    uploads: Mutex<Vec<(String, String, String, Vec<u8>)>>,
    fail_uploads: AtomicBool,
    upload_seq: AtomicU32,
}

fn pattern(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_add(seed)).collect()
}

fn describe(name: &str, size: u64) -> ObjectDescribe {
    ObjectDescribe {
        name: name.to_string(),
        size,
        ctime: 1_600_000_000_000,
        mtime: 1_600_000_000_500,
        state: ObjectState::Closed,
    }
}

impl MockPlatform {
    fn new() -> Self {
        let mut projects: HashMap<String, ProjectDescribe> = HashMap::new();
        projects.insert(
            "project-1".into(),
            ProjectDescribe {
                id: "project-1".into(),
                name: "Alpha".into(),
                ctime: 1,
                mtime: 2,
                access_level: AccessLevel::ReadWrite,
            },
        );
        projects.insert(
            "project-2".into(),
            ProjectDescribe {
                id: "project-2".into(),
                name: "Beta".into(),
                ctime: 3,
                mtime: 4,
                access_level: AccessLevel::ReadOnly,
            },
        );

        let mut listings: HashMap<(String, String), FolderListing> = HashMap::new();
        listings.insert(
            ("project-1".into(), "/".into()),
            FolderListing {
                subfolders: vec!["/raw".into()],
                files: vec![
                    FolderObject {
                        id: "file-genome".into(),
                        describe: describe("genome.dat", 8 * CHUNK),
                    },
                    FolderObject {
                        id: "workflow-pipe".into(),
                        describe: describe("pipeline", 0),
                    },
                ],
            },
        );
        listings.insert(
            ("project-1".into(), "/raw".into()),
            FolderListing {
                subfolders: vec![],
                files: vec![FolderObject {
                    id: "file-raw".into(),
                    describe: describe("raw.bin", CHUNK),
                }],
            },
        );
        listings.insert(
            ("project-2".into(), "/".into()),
            FolderListing {
                subfolders: vec![],
                files: vec![FolderObject {
                    id: "file-locked".into(),
                    describe: describe("locked.txt", 100),
                }],
            },
        );

        let mut contents: HashMap<String, Vec<u8>> = HashMap::new();
        contents.insert("file-genome".into(), pattern(3, (8 * CHUNK) as usize));
        contents.insert("file-raw".into(), pattern(5, CHUNK as usize));
        contents.insert("file-locked".into(), pattern(7, 100));
        contents.insert("file-readme".into(), pattern(11, (2 * CHUNK) as usize));

        Self {
            projects,
            listings,
            contents: Mutex::new(contents),
            uploads: Mutex::new(Vec::new()),
            fail_uploads: AtomicBool::new(false),
            upload_seq: AtomicU32::new(0),
        }
    }
}

#[async_trait::async_trait]
impl PlatformClient for MockPlatform {
    async fn describe_project(&self, project_id: &str) -> Result<ProjectDescribe, ClientError> {
        self.projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound {
                id: project_id.to_string(),
            })
    }

    async fn describe_objects(
        &self,
        object_ids: &[String],
    ) -> Result<HashMap<String, ObjectDescribe>, ClientError> {
        let contents = self.contents.lock().unwrap();
        Ok(object_ids
            .iter()
            .filter_map(|id| {
                contents
                    .get(id)
                    .map(|data| (id.clone(), describe(id, data.len() as u64)))
            })
            .collect())
    }

    async fn list_folder(
        &self,
        project_id: &str,
        folder: &str,
    ) -> Result<FolderListing, ClientError> {
        Ok(self
            .listings
            .get(&(project_id.to_string(), folder.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_download_url(
        &self,
        file_id: &str,
        _project_id: &str,
    ) -> Result<DownloadUrl, ClientError> {
        Ok(DownloadUrl {
            url: format!("mock://{}", file_id),
            headers: HashMap::new(),
        })
    }

    async fn fetch_url_range(
        &self,
        url: &DownloadUrl,
        start: u64,
        len: u64,
    ) -> Result<Vec<u8>, ClientError> {
        let file_id: &str = url.url.trim_start_matches("mock://");
        let contents = self.contents.lock().unwrap();
        let data: &Vec<u8> = contents.get(file_id).ok_or_else(|| ClientError::NotFound {
            id: file_id.to_string(),
        })?;
        let start: usize = start as usize;
        let end: usize = (start + len as usize).min(data.len());
        Ok(data.get(start..end).unwrap_or(&[]).to_vec())
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        project_id: &str,
        remote_folder: &str,
        name: &str,
    ) -> Result<String, ClientError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(ClientError::Network {
                message: "upload refused".into(),
                retryable: false,
            });
        }
        let data: Vec<u8> = std::fs::read(local_path).map_err(|e| ClientError::Io {
            path: local_path.display().to_string(),
            message: e.to_string(),
        })?;
        let n: u32 = self.upload_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let file_id: String = format!("file-up{}", n);
        self.contents
            .lock()
            .unwrap()
            .insert(file_id.clone(), data.clone());
        self.uploads.lock().unwrap().push((
            project_id.to_string(),
            remote_folder.to_string(),
            name.to_string(),
            data,
        ));
        Ok(file_id)
    }
}

fn manifest() -> Manifest {
    Manifest {
        files: vec![ManifestFile {
            proj_id: "project-1".into(),
            file_id: "file-readme".into(),
            parent: "/docs".into(),
            fname: Some("readme.txt".into()),
            size: Some(2 * CHUNK),
            ctime: Some(10),
            mtime: Some(20),
        }],
        directories: vec![
            ManifestDir {
                proj_id: "project-1".into(),
                folder: "/".into(),
                dirname: "/Alpha".into(),
                ctime: Some(1),
                mtime: Some(2),
            },
            ManifestDir {
                proj_id: "project-2".into(),
                folder: "/".into(),
                dirname: "/Beta".into(),
                ctime: Some(3),
                mtime: Some(4),
            },
        ],
    }
}

async fn mount_fixture() -> (SkyFilesystem, Arc<MockPlatform>, tempfile::TempDir) {
    let tmp: tempfile::TempDir = tempfile::TempDir::new().unwrap();
    let client: Arc<MockPlatform> = Arc::new(MockPlatform::new());
    let options: MountOptions = MountOptions::default()
        .with_db_path(tmp.path().join("metadata.db"))
        .with_staging_dir(tmp.path().to_path_buf())
        .with_prefetch(PrefetchTuning {
            chunk_size: CHUNK,
            cache_budget: 64 * CHUNK,
            streaming_threshold: 2,
            window_start: 2,
            window_max: 16,
        });
    let fs: SkyFilesystem = prepare(&manifest(), client.clone(), options).await.unwrap();
    (fs, client, tmp)
}

async fn inode_of(fs: &SkyFilesystem, parent: u64, name: &str) -> u64 {
    fs.lookup_op(parent, name).await.unwrap().ino
}

#[tokio::test]
async fn test_root_shows_mounts_and_skeleton() {
    let (fs, _client, _tmp) = mount_fixture().await;
    let entries: Vec<(u64, FileType, String)> = fs.readdir_op(INODE_ROOT).await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.2.as_str()).collect();
    assert_eq!(names, vec![".", "..", "Alpha", "Beta", "docs"]);
}

#[tokio::test]
async fn test_lazy_population_on_readdir() {
    let (fs, _client, _tmp) = mount_fixture().await;
    let alpha: u64 = fs.lookup_op(INODE_ROOT, "Alpha").await.unwrap().ino;

    let entries: Vec<(u64, FileType, String)> = fs.readdir_op(alpha).await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.2.as_str()).collect();
    assert_eq!(names, vec![".", "..", "raw", "genome.dat", "pipeline"]);

    // One level only; the subfolder populates on its own first access.
    let raw: u64 = fs.lookup_op(alpha, "raw").await.unwrap().ino;
    let raw_entries: Vec<(u64, FileType, String)> = fs.readdir_op(raw).await.unwrap();
    assert!(raw_entries.iter().any(|e| e.2 == "raw.bin"));
}

#[tokio::test]
async fn test_getattr_reflects_describe_and_access() {
    let (fs, _client, _tmp) = mount_fixture().await;
    let alpha: u64 = fs.lookup_op(INODE_ROOT, "Alpha").await.unwrap().ino;
    let genome = fs.lookup_op(alpha, "genome.dat").await.unwrap();
    assert_eq!(genome.size, 8 * CHUNK);
    assert_eq!(genome.perm, 0o644);

    let beta: u64 = fs.lookup_op(INODE_ROOT, "Beta").await.unwrap().ino;
    let locked = fs.lookup_op(beta, "locked.txt").await.unwrap();
    assert_eq!(locked.perm, 0o444);
}

#[tokio::test]
async fn test_read_through_engine_matches_origin() {
    let (fs, _client, _tmp) = mount_fixture().await;
    let alpha: u64 = fs.lookup_op(INODE_ROOT, "Alpha").await.unwrap().ino;
    let genome: u64 = fs.lookup_op(alpha, "genome.dat").await.unwrap().ino;

    let fh: u64 = fs.open_op(genome, libc::O_RDONLY).await.unwrap();
    let origin: Vec<u8> = pattern(3, (8 * CHUNK) as usize);

    // Cross-chunk and sequential reads both reproduce the origin bytes.
    let data: Vec<u8> = fs.read_op(genome, fh, 512, 2048).await.unwrap();
    assert_eq!(data, origin[512..512 + 2048]);

    let mut assembled: Vec<u8> = Vec::new();
    let mut offset: u64 = 0;
    while offset < 8 * CHUNK {
        let part: Vec<u8> = fs.read_op(genome, fh, offset, CHUNK as u32).await.unwrap();
        assert!(!part.is_empty());
        offset += part.len() as u64;
        assembled.extend(part);
    }
    assert_eq!(assembled, origin);
    assert!(fs.engine().is_streaming(genome));

    // EOF boundaries: zero bytes, not an error.
    assert!(fs.read_op(genome, fh, 8 * CHUNK, 100).await.unwrap().is_empty());
    assert!(fs.read_op(genome, fh, 9 * CHUNK, 100).await.unwrap().is_empty());

    fs.release_op(genome, fh).await.unwrap();
    assert_eq!(fs.engine().cache_stats().cached_chunks, 0);
}

#[tokio::test]
async fn test_open_non_file_object_denied() {
    let (fs, _client, _tmp) = mount_fixture().await;
    let alpha: u64 = fs.lookup_op(INODE_ROOT, "Alpha").await.unwrap().ino;
    let pipeline: u64 = fs.lookup_op(alpha, "pipeline").await.unwrap().ino;
    assert!(matches!(
        fs.open_op(pipeline, libc::O_RDONLY).await,
        Err(FsError::PermissionDenied(_))
    ));
}

#[tokio::test]
async fn test_create_write_release_uploads() {
    let (fs, client, _tmp) = mount_fixture().await;
    let alpha: u64 = fs.lookup_op(INODE_ROOT, "Alpha").await.unwrap().ino;

    let (attr, fh) = fs.create_op(alpha, "results.csv").await.unwrap();
    assert_eq!(attr.size, 0);
    let ino: u64 = attr.ino;

    fs.write_op(ino, fh, 0, b"id,score\n").await.unwrap();
    fs.write_op(ino, fh, 9, b"1,0.99\n").await.unwrap();

    // Size is visible while the write is still staged.
    assert_eq!(fs.getattr_op(ino).await.unwrap().size, 16);

    fs.release_op(ino, fh).await.unwrap();

    let uploads = client.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    let (proj, folder, name, data) = &uploads[0];
    assert_eq!(proj, "project-1");
    assert_eq!(folder, "/");
    assert_eq!(name, "results.csv");
    assert_eq!(data, b"id,score\n1,0.99\n");
    drop(uploads);

    // The stub row now points at the uploaded object; reading it back
    // round-trips through the (mock) platform.
    let fh2: u64 = fs.open_op(ino, libc::O_RDONLY).await.unwrap();
    let data: Vec<u8> = fs.read_op(ino, fh2, 0, 100).await.unwrap();
    assert_eq!(data, b"id,score\n1,0.99\n");
    fs.release_op(ino, fh2).await.unwrap();
}

#[tokio::test]
async fn test_write_append_only_gaps_rejected() {
    let (fs, _client, _tmp) = mount_fixture().await;
    let alpha: u64 = fs.lookup_op(INODE_ROOT, "Alpha").await.unwrap().ino;
    let (attr, fh) = fs.create_op(alpha, "gap.bin").await.unwrap();

    fs.write_op(attr.ino, fh, 0, b"abc").await.unwrap();
    assert!(matches!(
        fs.write_op(attr.ino, fh, 100, b"hole").await,
        Err(FsError::InvalidArgument(_))
    ));
    fs.release_op(attr.ino, fh).await.unwrap();
}

#[tokio::test]
async fn test_read_only_project_rejects_mutations() {
    let (fs, _client, _tmp) = mount_fixture().await;
    let beta: u64 = fs.lookup_op(INODE_ROOT, "Beta").await.unwrap().ino;
    fs.readdir_op(beta).await.unwrap();

    assert!(matches!(
        fs.create_op(beta, "nope.txt").await,
        Err(FsError::PermissionDenied(_))
    ));
    assert!(matches!(
        fs.mkdir_op(beta, "nope").await,
        Err(FsError::PermissionDenied(_))
    ));
    assert!(matches!(
        fs.unlink_op(beta, "locked.txt").await,
        Err(FsError::PermissionDenied(_))
    ));
    assert!(matches!(
        fs.rename_op(beta, "locked.txt", beta, "renamed.txt").await,
        Err(FsError::PermissionDenied(_))
    ));

    // Reading stays allowed.
    let locked: u64 = fs.lookup_op(beta, "locked.txt").await.unwrap().ino;
    let fh: u64 = fs.open_op(locked, libc::O_RDONLY).await.unwrap();
    assert_eq!(
        fs.read_op(locked, fh, 0, 100).await.unwrap(),
        pattern(7, 100)
    );
    fs.release_op(locked, fh).await.unwrap();
}

#[tokio::test]
async fn test_skeleton_dirs_are_virtual_and_read_only() {
    let (fs, _client, _tmp) = mount_fixture().await;
    let docs: u64 = fs.lookup_op(INODE_ROOT, "docs").await.unwrap().ino;

    // Manifest-attached file is visible under the skeleton intermediate.
    let readme: u64 = fs.lookup_op(docs, "readme.txt").await.unwrap().ino;
    let fh: u64 = fs.open_op(readme, libc::O_RDONLY).await.unwrap();
    assert_eq!(
        fs.read_op(readme, fh, 0, 16).await.unwrap(),
        pattern(11, 16)
    );
    fs.release_op(readme, fh).await.unwrap();

    assert!(matches!(
        fs.create_op(docs, "new.txt").await,
        Err(FsError::PermissionDenied(_))
    ));
}

#[tokio::test]
async fn test_upload_failure_poisons_inode() {
    let (fs, client, _tmp) = mount_fixture().await;
    let alpha: u64 = fs.lookup_op(INODE_ROOT, "Alpha").await.unwrap().ino;

    client.fail_uploads.store(true, Ordering::SeqCst);
    let (attr, fh) = fs.create_op(alpha, "doomed.txt").await.unwrap();
    fs.write_op(attr.ino, fh, 0, b"bytes").await.unwrap();
    assert!(matches!(
        fs.release_op(attr.ino, fh).await,
        Err(FsError::Io(_))
    ));

    // The inode stays poisoned until unmount.
    assert!(matches!(
        fs.open_op(attr.ino, libc::O_RDONLY).await,
        Err(FsError::Io(_))
    ));
}

#[tokio::test]
async fn test_mkdir_rename_rmdir_flow() {
    let (fs, _client, _tmp) = mount_fixture().await;
    let alpha: u64 = fs.lookup_op(INODE_ROOT, "Alpha").await.unwrap().ino;

    let created = fs.mkdir_op(alpha, "work").await.unwrap();
    let (attr, fh) = fs.create_op(created.ino, "tmp.txt").await.unwrap();
    fs.release_op(attr.ino, fh).await.unwrap();

    assert!(matches!(
        fs.rmdir_op(alpha, "work").await,
        Err(FsError::NotEmpty(_))
    ));

    fs.rename_op(created.ino, "tmp.txt", created.ino, "kept.txt")
        .await
        .unwrap();
    assert_eq!(inode_of(&fs, created.ino, "kept.txt").await, attr.ino);

    fs.unlink_op(created.ino, "kept.txt").await.unwrap();
    fs.rmdir_op(alpha, "work").await.unwrap();
    assert!(matches!(
        fs.lookup_op(alpha, "work").await,
        Err(FsError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_setattr_truncate_staged_file() {
    let (fs, _client, _tmp) = mount_fixture().await;
    let alpha: u64 = fs.lookup_op(INODE_ROOT, "Alpha").await.unwrap().ino;

    let (attr, fh) = fs.create_op(alpha, "trunc.txt").await.unwrap();
    fs.write_op(attr.ino, fh, 0, b"0123456789").await.unwrap();

    let after = fs.setattr_op(attr.ino, Some(4)).await.unwrap();
    assert_eq!(after.size, 4);
    assert_eq!(fs.read_op(attr.ino, fh, 0, 100).await.unwrap(), b"0123");
    fs.release_op(attr.ino, fh).await.unwrap();
}
