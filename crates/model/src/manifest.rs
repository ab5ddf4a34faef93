//! Manifest records and loading.
//!
//! Times on the wire are integer milliseconds since the Unix epoch.
//! Optional fields are filled at load time by describing the platform.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use skymount_client::{ObjectDescribe, PlatformClient, ProjectDescribe};
use skymount_common::{clean_abs_path, is_posix_filename};

use crate::error::ManifestError;

/// A file attached at an absolute path in the mounted namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub proj_id: String,
    pub file_id: String,
    /// Absolute, slash-prefixed directory the file appears in.
    pub parent: String,

    // These may not be provided by the user; they are filled in by
    // describing the platform before insertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ctime: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
}

impl ManifestFile {
    fn needs_describe(&self) -> bool {
        self.fname.is_none() || self.size.is_none() || self.ctime.is_none() || self.mtime.is_none()
    }
}

/// A project folder mounted as a directory at an absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDir {
    pub proj_id: String,
    /// Source folder inside the project, e.g. `/` or `/data`.
    pub folder: String,
    /// Absolute mount path in the local namespace.
    pub dirname: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ctime: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
}

impl ManifestDir {
    fn needs_describe(&self) -> bool {
        self.ctime.is_none() || self.mtime.is_none()
    }
}

/// The namespace description handed to the metadata store at mount time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub files: Vec<ManifestFile>,
    #[serde(default)]
    pub directories: Vec<ManifestDir>,
}

fn valid_project_id(id: &str) -> bool {
    id.starts_with("project-") || id.starts_with("container-")
}

fn validate_dir_name(p: &str) -> Result<(), ManifestError> {
    if p.is_empty() {
        return Err(ManifestError::Invalid("directory path is empty".into()));
    }
    if !p.starts_with('/') {
        return Err(ManifestError::Invalid(format!(
            "directory path must start with a slash: {}",
            p
        )));
    }
    Ok(())
}

impl Manifest {
    /// Read a manifest from a JSON file, validate it, and normalize paths.
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let data: String = fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Parse a manifest from a JSON string, validate it, and normalize paths.
    pub fn from_json(data: &str) -> Result<Self, ManifestError> {
        let mut manifest: Manifest = serde_json::from_str(data)?;
        manifest.validate()?;
        manifest.clean();
        Ok(manifest)
    }

    /// Check ids and paths. Runs before any network call.
    pub fn validate(&self) -> Result<(), ManifestError> {
        for fl in &self.files {
            if !valid_project_id(&fl.proj_id) {
                return Err(ManifestError::Invalid(format!(
                    "project has invalid ID {}",
                    fl.proj_id
                )));
            }
            if !fl.file_id.starts_with("file-") {
                return Err(ManifestError::Invalid(format!(
                    "file has invalid ID {}",
                    fl.file_id
                )));
            }
            validate_dir_name(&fl.parent)?;
        }

        for d in &self.directories {
            if !valid_project_id(&d.proj_id) {
                return Err(ManifestError::Invalid(format!(
                    "project has invalid ID {}",
                    d.proj_id
                )));
            }
            validate_dir_name(&d.dirname)?;
        }

        Ok(())
    }

    /// Replace every path with its canonical form.
    pub fn clean(&mut self) {
        for fl in &mut self.files {
            fl.parent = clean_abs_path(&fl.parent);
        }
        for d in &mut self.directories {
            d.dirname = clean_abs_path(&d.dirname);
        }
    }

    /// Fill in fields the user omitted by describing the platform.
    ///
    /// Files missing any of {fname, size, ctime, mtime} are described in
    /// one bulk call; projects whose directory entries lack times are
    /// described individually.
    pub async fn fill_missing(&mut self, client: &dyn PlatformClient) -> Result<(), ManifestError> {
        let mut ids: HashSet<String> = HashSet::new();
        for fl in &self.files {
            if fl.needs_describe() {
                ids.insert(fl.file_id.clone());
            }
        }
        let id_list: Vec<String> = ids.into_iter().collect();
        let described: HashMap<String, ObjectDescribe> =
            client.describe_objects(&id_list).await?;

        for fl in &mut self.files {
            if let Some(desc) = described.get(&fl.file_id) {
                if fl.fname.is_none() {
                    fl.fname = Some(desc.name.clone());
                }
                fl.size = Some(desc.size);
                fl.ctime = Some(desc.ctime);
                fl.mtime = Some(desc.mtime);
            } else if fl.needs_describe() {
                // A partial miss in the bulk describe; the row will be
                // rejected when the metadata store inserts it.
                warn!(file_id = %fl.file_id, "platform did not describe file");
            }
        }

        let mut project_ids: HashSet<String> = HashSet::new();
        for d in &self.directories {
            if d.needs_describe() {
                project_ids.insert(d.proj_id.clone());
            }
        }
        let mut projects: HashMap<String, ProjectDescribe> = HashMap::new();
        for pid in project_ids {
            let desc: ProjectDescribe = client.describe_project(&pid).await?;
            projects.insert(desc.id.clone(), desc);
        }
        for d in &mut self.directories {
            if let Some(desc) = projects.get(&d.proj_id) {
                d.ctime = Some(desc.ctime);
                d.mtime = Some(desc.mtime);
            }
        }

        Ok(())
    }

    /// Build a manifest that mounts each project's root at `/<Name>`.
    pub async fn from_project_ids(
        client: &dyn PlatformClient,
        project_ids: &[String],
    ) -> Result<Self, ManifestError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut directories: Vec<ManifestDir> = Vec::new();

        for pid in project_ids {
            if !seen.insert(pid.clone()) {
                continue;
            }
            let desc: ProjectDescribe = client.describe_project(pid).await?;
            if !is_posix_filename(&desc.name) {
                return Err(ManifestError::Invalid(format!(
                    "project {} has a non POSIX compliant name ({})",
                    desc.id, desc.name
                )));
            }
            directories.push(ManifestDir {
                proj_id: desc.id,
                folder: "/".to_string(),
                dirname: clean_abs_path(&format!("/{}", desc.name)),
                ctime: Some(desc.ctime),
                mtime: Some(desc.mtime),
            });
        }

        let manifest = Manifest {
            files: Vec::new(),
            directories,
        };
        manifest.validate()?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(proj: &str, id: &str, parent: &str) -> ManifestFile {
        ManifestFile {
            proj_id: proj.into(),
            file_id: id.into(),
            parent: parent.into(),
            fname: None,
            size: None,
            ctime: None,
            mtime: None,
        }
    }

    #[test]
    fn test_validate_accepts_containers() {
        let m = Manifest {
            files: vec![file("container-1", "file-1", "/a")],
            directories: vec![],
        };
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_project_id() {
        let m = Manifest {
            files: vec![file("foo-123", "file-1", "/a")],
            directories: vec![],
        };
        assert!(matches!(m.validate(), Err(ManifestError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_bad_file_id() {
        let m = Manifest {
            files: vec![file("project-1", "dataobj-1", "/a")],
            directories: vec![],
        };
        assert!(matches!(m.validate(), Err(ManifestError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_relative_parent() {
        let m = Manifest {
            files: vec![file("project-1", "file-1", "a/b")],
            directories: vec![],
        };
        assert!(matches!(m.validate(), Err(ManifestError::Invalid(_))));
    }

    #[test]
    fn test_clean_normalizes_paths() {
        let mut m = Manifest {
            files: vec![file("project-1", "file-1", "/a/./b/")],
            directories: vec![ManifestDir {
                proj_id: "project-1".into(),
                folder: "/".into(),
                dirname: "/x/y/../z".into(),
                ctime: None,
                mtime: None,
            }],
        };
        m.clean();
        assert_eq!(m.files[0].parent, "/a/b");
        assert_eq!(m.directories[0].dirname, "/x/z");
    }

    #[test]
    fn test_json_round_trip_modulo_clean() {
        let mut original = Manifest {
            files: vec![ManifestFile {
                proj_id: "project-1".into(),
                file_id: "file-1".into(),
                parent: "/a//b/.".into(),
                fname: Some("data.bin".into()),
                size: Some(42),
                ctime: Some(1_600_000_000_000),
                mtime: Some(1_600_000_000_001),
            }],
            directories: vec![ManifestDir {
                proj_id: "project-1".into(),
                folder: "/".into(),
                dirname: "/mnt/".into(),
                ctime: Some(1),
                mtime: Some(2),
            }],
        };

        let text: String = serde_json::to_string(&original).unwrap();
        let reparsed: Manifest = Manifest::from_json(&text).unwrap();

        original.clean();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn test_parse_spec_field_names() {
        let text = r#"{
            "files": [
                { "proj_id": "project-X", "file_id": "file-Y",
                  "parent": "/abs/path", "fname": "name.ext", "size": 123 }
            ],
            "directories": [
                { "proj_id": "project-X", "folder": "/source/folder",
                  "dirname": "/mount/path" }
            ]
        }"#;
        let m: Manifest = Manifest::from_json(text).unwrap();
        assert_eq!(m.files[0].fname.as_deref(), Some("name.ext"));
        assert_eq!(m.files[0].size, Some(123));
        assert_eq!(m.files[0].mtime, None);
        assert_eq!(m.directories[0].folder, "/source/folder");
    }

    #[test]
    fn test_empty_manifest_parses() {
        let m: Manifest = Manifest::from_json("{}").unwrap();
        assert!(m.files.is_empty());
        assert!(m.directories.is_empty());
    }

    mod describe {
        use super::*;
        use std::collections::HashMap;
        use std::path::Path;

        use skymount_client::{
            AccessLevel, ClientError, DownloadUrl, FolderListing, ObjectState,
        };

        struct StubClient {
            objects: HashMap<String, ObjectDescribe>,
            project: ProjectDescribe,
        }

        #[async_trait::async_trait]
        impl PlatformClient for StubClient {
            async fn describe_project(
                &self,
                project_id: &str,
            ) -> Result<ProjectDescribe, ClientError> {
                if project_id == self.project.id {
                    Ok(self.project.clone())
                } else {
                    Err(ClientError::NotFound {
                        id: project_id.to_string(),
                    })
                }
            }

            async fn describe_objects(
                &self,
                object_ids: &[String],
            ) -> Result<HashMap<String, ObjectDescribe>, ClientError> {
                Ok(object_ids
                    .iter()
                    .filter_map(|id| self.objects.get(id).map(|d| (id.clone(), d.clone())))
                    .collect())
            }

            async fn list_folder(
                &self,
                _project_id: &str,
                _folder: &str,
            ) -> Result<FolderListing, ClientError> {
                Ok(FolderListing::default())
            }

            async fn get_download_url(
                &self,
                _file_id: &str,
                _project_id: &str,
            ) -> Result<DownloadUrl, ClientError> {
                unimplemented!("not used by manifest loading")
            }

            async fn fetch_url_range(
                &self,
                _url: &DownloadUrl,
                _start: u64,
                _len: u64,
            ) -> Result<Vec<u8>, ClientError> {
                unimplemented!("not used by manifest loading")
            }

            async fn upload_file(
                &self,
                _local_path: &Path,
                _project_id: &str,
                _remote_folder: &str,
                _name: &str,
            ) -> Result<String, ClientError> {
                unimplemented!("not used by manifest loading")
            }
        }

        fn stub() -> StubClient {
            let mut objects: HashMap<String, ObjectDescribe> = HashMap::new();
            objects.insert(
                "file-1".to_string(),
                ObjectDescribe {
                    name: "alpha.bam".to_string(),
                    size: 1000,
                    ctime: 100,
                    mtime: 200,
                    state: ObjectState::Closed,
                },
            );
            StubClient {
                objects,
                project: ProjectDescribe {
                    id: "project-1".to_string(),
                    name: "Genomics".to_string(),
                    ctime: 300,
                    mtime: 400,
                    access_level: AccessLevel::ReadWrite,
                },
            }
        }

        #[tokio::test]
        async fn test_fill_missing_describes_files_and_projects() {
            let mut m = Manifest {
                files: vec![file("project-1", "file-1", "/a")],
                directories: vec![ManifestDir {
                    proj_id: "project-1".into(),
                    folder: "/".into(),
                    dirname: "/Genomics".into(),
                    ctime: None,
                    mtime: None,
                }],
            };
            m.fill_missing(&stub()).await.unwrap();

            assert_eq!(m.files[0].fname.as_deref(), Some("alpha.bam"));
            assert_eq!(m.files[0].size, Some(1000));
            assert_eq!(m.files[0].ctime, Some(100));
            assert_eq!(m.files[0].mtime, Some(200));
            assert_eq!(m.directories[0].ctime, Some(300));
            assert_eq!(m.directories[0].mtime, Some(400));
        }

        #[tokio::test]
        async fn test_fill_missing_keeps_user_supplied_name() {
            let mut m = Manifest {
                files: vec![ManifestFile {
                    fname: Some("renamed.bam".into()),
                    ..file("project-1", "file-1", "/a")
                }],
                directories: vec![],
            };
            m.fill_missing(&stub()).await.unwrap();
            // User-provided names win; sizes and times come from the platform.
            assert_eq!(m.files[0].fname.as_deref(), Some("renamed.bam"));
            assert_eq!(m.files[0].size, Some(1000));
        }

        #[tokio::test]
        async fn test_fill_missing_tolerates_partial_miss() {
            let mut m = Manifest {
                files: vec![file("project-1", "file-unknown", "/a")],
                directories: vec![],
            };
            m.fill_missing(&stub()).await.unwrap();
            assert_eq!(m.files[0].fname, None);
        }

        #[tokio::test]
        async fn test_from_project_ids_mounts_at_project_name() {
            let m = Manifest::from_project_ids(&stub(), &["project-1".to_string()])
                .await
                .unwrap();
            assert!(m.files.is_empty());
            assert_eq!(m.directories.len(), 1);
            assert_eq!(m.directories[0].dirname, "/Genomics");
            assert_eq!(m.directories[0].folder, "/");
            assert_eq!(m.directories[0].ctime, Some(300));
        }
    }
}
